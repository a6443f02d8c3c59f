//! The application state machine (§4.5): a deterministic keyed map, side-effect-free beyond
//! its own contents. `apply` executes a `Request`'s op; `undo` reverses the effect of a
//! previously-applied `Request`, restoring exactly the value `apply` overwrote.

use std::collections::HashMap;

use cabkv_wire::{Oid, Op, Request};
use serde_json::Value;
use thiserror::Error;

/// A broken invariant (§7): the caller asked to undo a request the store never applied. This
/// can only happen if the log manager's `TO_BE_ROLLEDBACK` bookkeeping has diverged from the
/// store's undo log, which is a programming bug, not a recoverable runtime condition.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("undo called for unapplied request {id}")]
	UndoMissingEntry { id: Oid },
}

/// One entry in the undo log: the value a `PUT` overwrote (or `None` if the key was absent),
/// keyed by the request id so rollback can find it regardless of execution order.
#[derive(Debug, Clone)]
struct UndoEntry {
	key: String,
	prior_value: Option<Value>,
}

#[derive(Debug, Default)]
pub struct Store {
	data: HashMap<String, Value>,
	undo_log: HashMap<Oid, UndoEntry>,
}

impl Store {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.data.get(key)
	}

	/// Apply `request`'s op. `GET` has no side effect; `PUT` records the key's prior value
	/// under `request.id` so a later [`Store::undo`] can restore it precisely.
	#[tracing::instrument(skip_all, fields(id = %request.id))]
	pub fn apply(&mut self, request: &Request) -> Option<Value> {
		match &request.op {
			Op::Get { key } => self.data.get(key).cloned(),
			Op::Put { key, value } => {
				let prior = self.data.insert(key.clone(), value.clone());
				self.undo_log.insert(
					request.id,
					UndoEntry {
						key: key.clone(),
						prior_value: prior,
					},
				);
				Some(value.clone())
			}
		}
	}

	/// Undo the effect of a previously-applied request. No-op for `GET` (it was never
	/// recorded). Returns [`StoreError::UndoMissingEntry`] if called for a `PUT` id that was
	/// never applied — that is a broken invariant (§7), for the caller to escalate.
	#[tracing::instrument(skip_all, fields(id = %request.id))]
	pub fn undo(&mut self, request: &Request) -> Result<(), StoreError> {
		if !request.op.is_mutating() {
			return Ok(());
		}
		let entry = self
			.undo_log
			.remove(&request.id)
			.ok_or(StoreError::UndoMissingEntry { id: request.id })?;
		match entry.prior_value {
			Some(v) => {
				self.data.insert(entry.key, v);
			}
			None => {
				self.data.remove(&entry.key);
			}
		}
		Ok(())
	}
}
