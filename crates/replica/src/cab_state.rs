//! CAB protocol state: dissemination bookkeeping and the propose/decide/apply round machine
//! (§4.4). Round numbers are a bare, cluster-shared `k` (§9 Open Question 2) rather than being
//! scoped per proposer.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use cabkv_wire::{Decision, Oid, Proposal, ReplicaId};

#[derive(Debug, Default)]
pub struct CabState {
	delivered_cab: HashSet<Oid>,
	received: HashSet<Oid>,
	ordered_messages: VecDeque<Oid>,
	unordered_messages: BTreeSet<Oid>,
	consensus_k: u64,
	proposals: BTreeMap<u64, BTreeMap<ReplicaId, Proposal>>,
	decisions: BTreeMap<u64, BTreeMap<ReplicaId, Decision>>,
	deciding: bool,
	applying: bool,
	active_round: Option<u64>,
}

impl CabState {
	pub fn received(&self) -> &HashSet<Oid> {
		&self.received
	}

	pub fn ordered_front(&self) -> Option<Oid> {
		self.ordered_messages.front().copied()
	}

	pub fn pop_ordered_front(&mut self) -> Option<Oid> {
		self.ordered_messages.pop_front()
	}

	/// `CAB-cast(m, q)` at origin (§4.4): idempotent against re-cast of the same id.
	pub fn mark_cab_cast(&mut self, m: Oid) -> bool {
		self.delivered_cab.insert(m)
	}

	/// `RB-deliver-msg(msg)` (§4.4): absorb a CAB message, idempotent on `RECEIVED`.
	pub fn rb_deliver_msg(&mut self, m: Oid) -> bool {
		if !self.received.insert(m) {
			return false;
		}
		if !self.ordered_messages.contains(&m) {
			self.unordered_messages.insert(m);
		}
		true
	}

	/// Propose phase (§4.4 step 1): only when this replica holds no active round.
	pub fn try_propose(&mut self, server: ReplicaId) -> Option<Proposal> {
		if self.active_round.is_some() || self.unordered_messages.is_empty() {
			return None;
		}
		let k = self.consensus_k + 1;
		let proposal = Proposal {
			server,
			k,
			unordered: self.unordered_messages.clone(),
		};
		self.proposals
			.entry(k)
			.or_default()
			.insert(server, proposal.clone());
		self.consensus_k = k;
		self.active_round = Some(k);
		self.deciding = true;
		Some(proposal)
	}

	/// Incorporate a peer's proposal. At-most-once per `(server, k)` (§8 invariant 4).
	///
	/// A proposal only ever accumulates entries from replicas that call `try_propose`
	/// themselves, so with a single initiator the round's proposal set would never grow past
	/// one entry and quorum would be unreachable. A replica that observes someone else's
	/// proposal for a round it hasn't joined therefore reacts by submitting its own proposal
	/// into the same `k` (its current `UNORDERED_MESSAGES`, possibly empty) — this is what lets
	/// independently-started rounds converge into one shared round that a quorum can agree on.
	/// Returns `(recorded, self_proposal)`: `self_proposal` is `Some` when this replica joined
	/// by proposing and the caller must broadcast it.
	pub fn receive_proposal(&mut self, p: Proposal, self_id: ReplicaId) -> (bool, Option<Proposal>) {
		let slot = self.proposals.entry(p.k).or_default();
		if slot.contains_key(&p.server) {
			return (false, None);
		}
		slot.insert(p.server, p.clone());
		self.consensus_k = self.consensus_k.max(p.k);

		let can_join = self.active_round.is_none() || self.active_round == Some(p.k);
		let mut own_proposal = None;
		if can_join {
			self.active_round = Some(p.k);
			self.deciding = true;
			let slot = self.proposals.get_mut(&p.k).expect("just inserted above");
			if !slot.contains_key(&self_id) {
				let proposal = Proposal {
					server: self_id,
					k: p.k,
					unordered: self.unordered_messages.clone(),
				};
				slot.insert(self_id, proposal.clone());
				own_proposal = Some(proposal);
			}
		}
		(true, own_proposal)
	}

	/// Decide phase (§4.4 step 2). `check_dep` is supplied by the caller since it needs access
	/// to the causal tracker and log manager, which `CabState` does not own.
	pub fn try_decide(
		&mut self,
		server: ReplicaId,
		quorum: usize,
		check_dep: impl Fn(Oid) -> bool,
	) -> Option<Decision> {
		let k = self.active_round?;
		if !self.deciding || self.applying {
			return None;
		}
		let proposals = self.proposals.get(&k)?;
		if proposals.len() < quorum {
			return None;
		}
		let mut intersection: Option<BTreeSet<Oid>> = None;
		for p in proposals.values() {
			intersection = Some(match intersection {
				None => p.unordered.clone(),
				Some(acc) => acc.intersection(&p.unordered).copied().collect(),
			});
		}
		let decided: BTreeSet<Oid> = intersection
			.unwrap_or_default()
			.into_iter()
			.filter(|&m| self.received.contains(&m) && check_dep(m))
			.collect();

		let decision = Decision {
			server,
			k,
			decided: decided.clone(),
		};
		self.decisions
			.entry(k)
			.or_default()
			.insert(server, decision.clone());
		self.applying = true;
		Some(decision)
	}

	/// Incorporate a peer's decision, joining the round if this replica hasn't seen it yet.
	pub fn receive_decision(&mut self, d: Decision) -> bool {
		let slot = self.decisions.entry(d.k).or_default();
		if slot.contains_key(&d.server) {
			return false;
		}
		slot.insert(d.server, d.clone());
		self.consensus_k = self.consensus_k.max(d.k);
		if self.active_round.is_none() {
			self.active_round = Some(d.k);
			self.deciding = true;
			self.applying = true;
		}
		true
	}

	/// Apply phase (§4.4 step 3): closes the round and moves delivered ids from
	/// `UNORDERED_MESSAGES` to the tail of `ORDERED_MESSAGES`, sorted for deterministic replay.
	pub fn try_apply(&mut self, quorum: usize) -> Option<Vec<Oid>> {
		let k = self.active_round?;
		if !self.applying {
			return None;
		}
		let decisions = self.decisions.get(&k)?;
		if decisions.len() < quorum {
			return None;
		}
		let mut intersection: Option<BTreeSet<Oid>> = None;
		for d in decisions.values() {
			intersection = Some(match intersection {
				None => d.decided.clone(),
				Some(acc) => acc.intersection(&d.decided).copied().collect(),
			});
		}
		let mut final_set: Vec<Oid> = intersection
			.unwrap_or_default()
			.into_iter()
			.filter(|m| self.unordered_messages.contains(m))
			.collect();
		final_set.sort();

		for m in &final_set {
			self.unordered_messages.remove(m);
			self.ordered_messages.push_back(*m);
		}
		self.deciding = false;
		self.applying = false;
		self.active_round = None;
		Some(final_set)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn full_round_reaches_quorum_across_two_proposers() {
		let mut a = CabState::default();
		let mut b = CabState::default();
		let m = Oid::new(0, 1);
		a.rb_deliver_msg(m);
		b.rb_deliver_msg(m);

		let pa = a.try_propose(0).unwrap();
		let pb = b.try_propose(1).unwrap();
		assert_eq!(pa.k, pb.k); // both started from consensus_k=0

		a.receive_proposal(pb.clone(), 0);
		b.receive_proposal(pa.clone(), 1);

		let da = a.try_decide(0, 2, |_| true).unwrap();
		let db = b.try_decide(1, 2, |_| true).unwrap();
		assert!(da.decided.contains(&m));
		assert!(db.decided.contains(&m));

		a.receive_decision(db);
		b.receive_decision(da);

		let applied_a = a.try_apply(2).unwrap();
		let applied_b = b.try_apply(2).unwrap();
		assert_eq!(applied_a, vec![m]);
		assert_eq!(applied_b, vec![m]);
	}

	#[test]
	fn duplicate_proposal_delivery_is_idempotent() {
		let mut a = CabState::default();
		let m = Oid::new(0, 1);
		a.rb_deliver_msg(m);
		let p = a.try_propose(0).unwrap();
		assert!(!a.receive_proposal(p, 0).0); // already recorded as self-proposal
	}

	#[test]
	fn reactive_join_lets_a_single_initiator_reach_quorum() {
		// Only `a` ever calls try_propose; `b` and `c` must join reactively from observing it,
		// or the round's proposal set would never grow past one entry.
		let mut a = CabState::default();
		let mut b = CabState::default();
		let mut c = CabState::default();
		let m = Oid::new(0, 1);
		a.rb_deliver_msg(m);

		let pa = a.try_propose(0).unwrap();
		let (_, pb) = b.receive_proposal(pa.clone(), 1);
		let (_, pc) = c.receive_proposal(pa.clone(), 2);
		let pb = pb.expect("b must join by proposing");
		let pc = pc.expect("c must join by proposing");

		a.receive_proposal(pb.clone(), 0);
		a.receive_proposal(pc.clone(), 0);
		b.receive_proposal(pc, 1);
		c.receive_proposal(pb, 2);

		let quorum = 2;
		assert!(a.try_decide(0, quorum, |_| true).is_some());
		assert!(b.try_decide(1, quorum, |_| true).is_some());
		assert!(c.try_decide(2, quorum, |_| true).is_some());
	}
}
