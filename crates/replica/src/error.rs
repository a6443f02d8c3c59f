use thiserror::Error;

/// Errors the core or its HTTP binding can surface. Everything else in §7's taxonomy
/// (duplicate delivery, missing prerequisites, missing quorum) is a normal return value, not
/// an error variant, mirroring the teacher's split between client-facing `global-error` detail
/// and internal `formatted-error` detail.
#[derive(Debug, Error)]
pub enum ReplicaError {
	#[error("queue substrate failure: {0}")]
	Queue(#[from] cabkv_queue::QueueError),
	#[error("strong operation timed out waiting for commit")]
	AwaitTimeout,
	/// A broken invariant (§7): the background loop that detects this logs it at `error!` and
	/// aborts the process (see [`crate::tasks::spawn_loops`]'s rollback loop) rather than
	/// returning it to a caller that could keep serving requests over a corrupted store.
	#[error("broken invariant: {0}")]
	Invariant(String),
}
