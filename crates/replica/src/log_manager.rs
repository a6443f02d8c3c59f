//! `COMMITTED`/`TENTATIVE` and their derived execution state (§3, §4.3).

use std::collections::{BTreeSet, VecDeque};

use cabkv_wire::{Oid, Request};

/// Holds the speculative order and the execution state derived from it. Every public method
/// leaves the struct in a state satisfying the invariants of §3 (`EXECUTED` prefix of
/// `COMMITTED ++ TENTATIVE`, `TO_BE_ROLLEDBACK` drained before execution resumes).
#[derive(Debug, Default)]
pub struct LogManager {
	committed: Vec<Request>,
	committed_ids: BTreeSet<Oid>,
	tentative: Vec<Request>,
	executed: Vec<Request>,
	to_be_executed: VecDeque<Request>,
	to_be_rolledback: Vec<Request>,
}

impl LogManager {
	pub fn committed(&self) -> &[Request] {
		&self.committed
	}

	pub fn tentative(&self) -> &[Request] {
		&self.tentative
	}

	pub fn executed_len(&self) -> usize {
		self.executed.len()
	}

	pub fn committed_ids(&self) -> &BTreeSet<Oid> {
		&self.committed_ids
	}

	pub fn to_be_rolledback(&self) -> &[Request] {
		&self.to_be_rolledback
	}

	pub fn to_be_executed(&self) -> &VecDeque<Request> {
		&self.to_be_executed
	}

	/// Find a request by id in either `TENTATIVE` or `COMMITTED`, the way `check_dep` needs to.
	pub fn find(&self, id: Oid) -> Option<&Request> {
		self.tentative
			.iter()
			.find(|r| r.id == id)
			.or_else(|| self.committed.iter().find(|r| r.id == id))
	}

	/// `insert_into_tentative(S)` (§4.3): fold each `r ∈ S` into its sorted position. `S` is
	/// sorted first so that multi-element inserts are deterministic regardless of arrival
	/// order; duplicate ids cannot occur per the §3 invariants, so `partition_point` on `Ord`
	/// alone reproduces the spec's `prev ++ [r] ++ next` split.
	pub fn insert_into_tentative(&mut self, mut ready: Vec<Request>) {
		ready.sort();
		for r in ready {
			let pos = self.tentative.partition_point(|x| *x < r);
			self.tentative.insert(pos, r);
		}
	}

	/// `commit(r)` (§4.4): promote `r`, together with every tentative op dominated by `r`'s
	/// causal context, from `TENTATIVE` to the tail of `COMMITTED`. Returns the ids promoted, in
	/// commit order, so the caller can fire commit notifications and bump metrics.
	pub fn commit(&mut self, r: Request) -> Vec<Oid> {
		let mut to_remove: BTreeSet<Oid> = BTreeSet::new();
		to_remove.insert(r.id);
		let dominated: Vec<Request> = self
			.tentative
			.iter()
			.filter(|x| x.id != r.id && x.causal_ctx.is_subset(&r.causal_ctx))
			.cloned()
			.collect();
		for d in &dominated {
			to_remove.insert(d.id);
		}
		self.tentative.retain(|x| !to_remove.contains(&x.id));

		let mut promoted_ids = Vec::with_capacity(dominated.len() + 1);
		for d in dominated {
			promoted_ids.push(d.id);
			self.committed_ids.insert(d.id);
			self.committed.push(d);
		}
		promoted_ids.push(r.id);
		self.committed_ids.insert(r.id);
		self.committed.push(r);
		promoted_ids
	}

	/// Recompute `EXECUTED`/`TO_BE_EXECUTED`/`TO_BE_ROLLEDBACK` from `COMMITTED ++ TENTATIVE`
	/// (§4.3). Must be called after every mutation of `COMMITTED` or `TENTATIVE`.
	pub fn recompute_execution(&mut self) {
		let new_order: Vec<Request> = self
			.committed
			.iter()
			.chain(self.tentative.iter())
			.cloned()
			.collect();

		let lcp = self
			.executed
			.iter()
			.zip(new_order.iter())
			.take_while(|(a, b)| a.id == b.id)
			.count();

		let out_of_order: Vec<Request> = self.executed.split_off(lcp);
		self.to_be_executed = new_order[lcp..].iter().cloned().collect();
		self.to_be_rolledback = out_of_order.into_iter().rev().collect();
	}

	pub fn pop_rollback(&mut self) -> Option<Request> {
		self.to_be_rolledback.pop()
	}

	/// Execute loop only runs while `TO_BE_ROLLEDBACK` is empty (§5).
	pub fn pop_execute(&mut self) -> Option<Request> {
		if !self.to_be_rolledback.is_empty() {
			return None;
		}
		let r = self.to_be_executed.pop_front()?;
		self.executed.push(r.clone());
		Some(r)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cabkv_wire::Op;

	fn req(origin: u32, seq: u64, ts: u64, ctx: &[(u32, u64)]) -> Request {
		Request {
			ts,
			id: Oid::new(origin, seq),
			op: Op::Get { key: "x".into() },
			strong_op: false,
			causal_ctx: ctx.iter().map(|&(o, s)| Oid::new(o, s)).collect(),
		}
	}

	#[test]
	fn insert_keeps_sorted_order() {
		let mut lm = LogManager::default();
		lm.insert_into_tentative(vec![req(0, 1, 20, &[]), req(0, 2, 10, &[])]);
		let ids: Vec<Oid> = lm.tentative().iter().map(|r| r.id).collect();
		assert_eq!(ids, vec![Oid::new(0, 2), Oid::new(0, 1)]);
	}

	#[test]
	fn commit_promotes_dominated_set() {
		let mut lm = LogManager::default();
		let a = req(0, 1, 10, &[]);
		let b = req(0, 2, 11, &[(0, 1)]);
		lm.insert_into_tentative(vec![a.clone(), b.clone()]);
		let promoted = lm.commit(b.clone());
		assert_eq!(promoted, vec![a.id, b.id]);
		assert!(lm.tentative().is_empty());
		assert_eq!(lm.committed().len(), 2);
	}

	#[test]
	fn recompute_rolls_back_out_of_order_suffix() {
		let mut lm = LogManager::default();
		let a = req(0, 1, 10, &[]);
		let b = req(0, 2, 20, &[]);
		lm.insert_into_tentative(vec![a.clone(), b.clone()]);
		lm.recompute_execution();
		assert!(lm.pop_execute().is_some()); // a
		assert!(lm.pop_execute().is_some()); // b
		assert_eq!(lm.executed_len(), 2);

		// A third op sorts ahead of both — everything after the new lcp must roll back.
		let c = req(0, 3, 5, &[]);
		lm.insert_into_tentative(vec![c]);
		lm.recompute_execution();
		assert_eq!(lm.to_be_rolledback().len(), 2);
		assert_eq!(lm.executed_len(), 0);
	}
}
