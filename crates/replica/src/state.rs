//! `ReplicaState`: every piece of per-replica mutable state in §3, gathered so a single lock
//! (held by [`crate::replica::Replica`]) is sufficient for the serialization discipline in §5.

use std::collections::HashSet;

use cabkv_store::Store;
use cabkv_wire::{CabMessage, Decision, Oid, Op, Predicate, Proposal, ReplicaId, Request};

use crate::cab_state::CabState;
use crate::causal::CausalTracker;
use crate::log_manager::LogManager;
use crate::pending::PendingResponses;

/// Something a state mutation wants the caller to enqueue for outbound dispatch, once the
/// lock is released (§5: handlers must not suspend while holding the replica lock).
#[derive(Debug)]
pub enum Effect {
	SendOperation(Request),
	SendCab(CabMessage),
	SendPropose(Proposal),
	SendDecide(Decision),
}

#[derive(Debug, Default)]
pub struct ReplicaState {
	curr_event_no: u64,
	delivered: HashSet<Oid>,
	causal: CausalTracker,
	log: LogManager,
	cab: CabState,
	pub pending: PendingResponses,
	pub store: Store,
}

impl ReplicaState {
	pub fn log(&self) -> &LogManager {
		&self.log
	}

	pub fn cab(&self) -> &CabState {
		&self.cab
	}

	fn check_dep(log: &LogManager, causal_ctx: &std::collections::BTreeSet<Oid>, m: Oid) -> bool {
		match log.find(m) {
			Some(r) => r.causal_ctx.is_subset(causal_ctx),
			None => false,
		}
	}

	/// Promote every tentative weak op whose causal prefix is already committed, to a
	/// fixpoint: promoting one op can make another op's prefix committed in turn.
	fn commit_ready_weak_ops(&mut self) {
		loop {
			let ready = self
				.log
				.tentative()
				.iter()
				.find(|r| !r.strong_op && r.causal_ctx.is_subset(self.log.committed_ids()))
				.cloned();
			let Some(r) = ready else { break };
			let promoted = self.log.commit(r);
			self.pending.notify_all(&promoted);
			cabkv_metrics::COMMITS_TOTAL.inc_by(promoted.len() as u64);
		}
	}

	/// `invoke(op, strong)` (§4.1).
	pub fn invoke(
		&mut self,
		self_id: ReplicaId,
		op: Op,
		strong: bool,
	) -> (u64, Option<tokio::sync::oneshot::Receiver<()>>, Vec<Effect>) {
		let mut effects = Vec::new();
		self.curr_event_no += 1;
		let id = Oid::new(self_id, self.curr_event_no);
		let ts = cabkv_wire::now_secs();

		let causal_ctx = if strong {
			// r.causal_ctx = CAUSAL_CTX \ { x.id | x in TENTATIVE, r < x } (§4.1): exclude the
			// ids of tentative ops that sort *after* r, anchoring r's dependencies to its
			// forward-compatible past.
			let sorts_after_r: HashSet<Oid> = self
				.log
				.tentative()
				.iter()
				.filter(|x| (ts, id) < (x.ts, x.id))
				.map(|x| x.id)
				.collect();
			self.causal
				.ctx()
				.iter()
				.filter(|o| !sorts_after_r.contains(o))
				.copied()
				.collect()
		} else {
			Default::default()
		};

		let r = Request {
			ts,
			id,
			op,
			strong_op: strong,
			causal_ctx,
		};
		self.causal.absorb(id);
		effects.push(Effect::SendOperation(r.clone()));

		let rx = if strong {
			if self.cab.mark_cab_cast(id) {
				effects.push(Effect::SendCab(CabMessage {
					m: id,
					q: Predicate::CheckDep,
				}));
			}
			self.cab.rb_deliver_msg(id);
			Some(self.pending.register(id))
		} else {
			None
		};

		self.log.insert_into_tentative(vec![r]);
		self.commit_ready_weak_ops();
		self.log.recompute_execution();
		self.collect_execution_metrics();

		(self.curr_event_no, rx, effects)
	}

	/// `RB-deliver(r)` (§4.2). Returns `true` if this delivery made progress (was not a
	/// duplicate / loopback no-op).
	pub fn rb_deliver(&mut self, self_id: ReplicaId, r: Request) -> (bool, Vec<Effect>) {
		let mut effects = Vec::new();
		if r.id.origin == self_id {
			return (false, effects);
		}
		if !self.delivered.insert(r.id) {
			return (false, effects);
		}

		if !r.strong_op || self.causal.is_ready(&r) {
			let ready = self.causal.absorb_and_drain(r);
			self.log.insert_into_tentative(ready);
		} else {
			self.causal.buffer(r);
		}

		self.commit_ready_weak_ops();
		self.log.recompute_execution();
		self.collect_execution_metrics();
		(true, effects)
	}

	/// `RB-deliver-msg(msg)` (§4.4).
	pub fn rb_deliver_msg(&mut self, msg: CabMessage) -> bool {
		self.cab.rb_deliver_msg(msg.m)
	}

	/// Incorporate a peer's proposal, joining the round by proposing in turn if needed (see
	/// [`CabState::receive_proposal`]).
	pub fn receive_proposal(&mut self, self_id: ReplicaId, p: Proposal) -> (bool, Vec<Effect>) {
		let (progressed, own) = self.cab.receive_proposal(p, self_id);
		let mut effects = Vec::new();
		if let Some(p) = own {
			cabkv_metrics::PROPOSALS_TOTAL.with_label_values(&["joined"]).inc();
			effects.push(Effect::SendPropose(p));
		}
		(progressed, effects)
	}

	pub fn receive_decision(&mut self, d: Decision) -> bool {
		self.cab.receive_decision(d)
	}

	/// Propose/decide/apply tick (§4.4, §5 proposer/decider/applier loops).
	pub fn tick_cab(&mut self, self_id: ReplicaId, quorum: usize, effects: &mut Vec<Effect>) {
		if let Some(p) = self.cab.try_propose(self_id) {
			cabkv_metrics::PROPOSALS_TOTAL.with_label_values(&["started"]).inc();
			effects.push(Effect::SendPropose(p));
		}

		let log = &self.log;
		let causal_ctx = self.causal.ctx().clone();
		if let Some(d) = self
			.cab
			.try_decide(self_id, quorum, |m| Self::check_dep(log, &causal_ctx, m))
		{
			cabkv_metrics::QUORUM_ATTEMPTS_TOTAL
				.with_label_values(&["decide", "reached"])
				.inc();
			effects.push(Effect::SendDecide(d));
		}

		if let Some(applied) = self.cab.try_apply(quorum) {
			if !applied.is_empty() {
				cabkv_metrics::ROUNDS_COMPLETED_TOTAL.inc();
			}
		}
	}

	/// `CAB-deliver(m)` (§4.4): the ordered-message drainer loop body.
	pub fn tick_ordered_drain(&mut self) {
		let Some(m) = self.cab.ordered_front() else {
			return;
		};
		let ctx = self.causal.ctx().clone();
		if !self.cab.received().contains(&m) || !Self::check_dep(&self.log, &ctx, m) {
			return;
		}
		let Some(r) = self.log.find(m).cloned() else {
			return;
		};
		self.cab.pop_ordered_front();
		let promoted = self.log.commit(r);
		self.pending.notify_all(&promoted);
		cabkv_metrics::COMMITS_TOTAL.inc_by(promoted.len() as u64);
		self.log.recompute_execution();
		self.collect_execution_metrics();
	}

	/// Rollback loop (§5): drains one entry from `TO_BE_ROLLEDBACK` per tick.
	pub fn tick_rollback(&mut self) -> Option<Request> {
		let r = self.log.pop_rollback()?;
		cabkv_metrics::ROLLBACKS_TOTAL.inc();
		Some(r)
	}

	/// Execute loop (§5): only pops while `TO_BE_ROLLEDBACK` is empty.
	pub fn tick_execute(&mut self) -> Option<Request> {
		self.log.pop_execute()
	}

	fn collect_execution_metrics(&self) {
		cabkv_metrics::TENTATIVE_LEN.set(self.log.tentative().len() as i64);
		cabkv_metrics::COMMITTED_LEN.set(self.log.committed().len() as i64);
	}
}
