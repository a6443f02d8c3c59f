//! The replica façade: one [`tokio::sync::Mutex`] around [`ReplicaState`] (§5's single
//! exclusion discipline), plus the queue handles mutations enqueue onto once the lock is
//! released.

use std::sync::Arc;

use cabkv_config::Config;
use cabkv_queue::{DispatchQueue, QueueError, QueueName};
use cabkv_wire::{CabMessage, Decision, Oid, Op, Proposal, ReplicaId, Request};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use crate::error::ReplicaError;
use crate::state::{Effect, ReplicaState};

pub struct Replica {
	pub id: ReplicaId,
	pub quorum: usize,
	pub config: Arc<Config>,
	state: Mutex<ReplicaState>,
	queue: Arc<dyn DispatchQueue>,
}

/// A read-only snapshot of replica state, for `GET /debug/state`.
#[derive(Debug, Serialize)]
pub struct DebugSnapshot {
	pub committed_len: usize,
	pub tentative_len: usize,
	pub executed_len: usize,
	pub to_be_rolledback_len: usize,
	pub committed_ids: Vec<Oid>,
}

impl Replica {
	pub fn new(config: Arc<Config>, queue: Arc<dyn DispatchQueue>) -> Self {
		Self {
			id: config.node_id,
			quorum: config.quorum(),
			config,
			state: Mutex::new(ReplicaState::default()),
			queue,
		}
	}

	async fn dispatch(&self, effects: Vec<Effect>) -> Result<(), ReplicaError> {
		for effect in effects {
			match effect {
				Effect::SendOperation(r) => {
					self.push(QueueName::OperationOut, &r).await?;
				}
				Effect::SendCab(m) => {
					self.push(QueueName::CabOut, &m).await?;
				}
				Effect::SendPropose(p) => {
					self.push(QueueName::ProposeOut, &p).await?;
				}
				Effect::SendDecide(d) => {
					self.push(QueueName::DecideOut, &d).await?;
				}
			}
		}
		Ok(())
	}

	async fn push<T: Serialize>(&self, queue: QueueName, payload: &T) -> Result<(), QueueError> {
		let bytes = serde_json::to_vec(payload).expect("wire types always serialize");
		self.queue.push(queue, bytes).await
	}

	/// `invoke(op, strong)` (§4.1). If `strong`, the returned receiver resolves once the
	/// operation is promoted into `COMMITTED`, or the caller times out waiting on it.
	pub async fn invoke(
		&self,
		op: Op,
		strong: bool,
	) -> Result<(u64, Option<oneshot::Receiver<()>>), ReplicaError> {
		let (event_no, rx, effects) = {
			let mut state = self.state.lock().await;
			state.invoke(self.id, op, strong)
		};
		self.dispatch(effects).await?;
		Ok((event_no, rx))
	}

	/// `POST /gossip` (§6): peer operation delivery. Returns `false` for an idempotent repeat.
	pub async fn rb_deliver(&self, r: Request) -> Result<bool, ReplicaError> {
		let (progressed, effects) = {
			let mut state = self.state.lock().await;
			state.rb_deliver(self.id, r)
		};
		self.dispatch(effects).await?;
		Ok(progressed)
	}

	/// `POST /gossip-cab` (§6): peer CAB-message delivery.
	pub async fn rb_deliver_msg(&self, msg: CabMessage) -> bool {
		let mut state = self.state.lock().await;
		state.rb_deliver_msg(msg)
	}

	/// `POST /propose-cab` (§6). May itself enqueue a proposal if this replica joins the round.
	pub async fn receive_proposal(&self, p: Proposal) -> Result<bool, ReplicaError> {
		let (progressed, effects) = {
			let mut state = self.state.lock().await;
			state.receive_proposal(self.id, p)
		};
		self.dispatch(effects).await?;
		Ok(progressed)
	}

	/// `POST /decide-cab` (§6).
	pub async fn receive_decision(&self, d: Decision) -> bool {
		let mut state = self.state.lock().await;
		state.receive_decision(d)
	}

	/// One tick of the CAB propose/decide/apply loops (§5). Intended to be called
	/// periodically by [`crate::tasks::spawn_loops`].
	pub async fn tick_cab(&self) -> Result<(), ReplicaError> {
		let effects = {
			let mut state = self.state.lock().await;
			let mut effects = Vec::new();
			state.tick_cab(self.id, self.quorum, &mut effects);
			effects
		};
		self.dispatch(effects).await
	}

	/// One tick of the ordered-message drainer (§4.4 `CAB-deliver`).
	pub async fn tick_ordered_drain(&self) {
		let mut state = self.state.lock().await;
		state.tick_ordered_drain();
	}

	/// One tick of the rollback loop: undo one entry, against the store, under the lock (the
	/// store is part of the replica's serialized state, per §5). A rollback that fails to find
	/// its undo-log entry is a broken invariant (§7, §10.1), not a recoverable outcome.
	pub async fn tick_rollback(&self) -> Result<bool, ReplicaError> {
		let mut state = self.state.lock().await;
		match state.tick_rollback() {
			Some(r) => {
				state
					.store
					.undo(&r)
					.map_err(|err| ReplicaError::Invariant(err.to_string()))?;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// One tick of the execute loop: apply one entry against the store.
	pub async fn tick_execute(&self) -> bool {
		let mut state = self.state.lock().await;
		match state.tick_execute() {
			Some(r) => {
				state.store.apply(&r);
				true
			}
			None => false,
		}
	}

	pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
		let state = self.state.lock().await;
		state.store.get(key).cloned()
	}

	pub async fn debug_snapshot(&self) -> DebugSnapshot {
		let state = self.state.lock().await;
		let log = state.log();
		DebugSnapshot {
			committed_len: log.committed().len(),
			tentative_len: log.tentative().len(),
			executed_len: log.executed_len(),
			to_be_rolledback_len: log.to_be_rolledback().len(),
			committed_ids: log.committed_ids().iter().copied().collect(),
		}
	}
}
