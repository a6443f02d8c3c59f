//! `CAUSAL_CTX` and `MISSING_CONTEXT_OPS` (§3, §4.2).

use cabkv_wire::{Oid, Request};
use std::collections::BTreeSet;

/// Tracks absorbed operation ids and buffers requests whose causal prerequisites are not yet
/// locally present.
#[derive(Debug, Default)]
pub struct CausalTracker {
	ctx: BTreeSet<Oid>,
	missing: Vec<Request>,
}

impl CausalTracker {
	pub fn ctx(&self) -> &BTreeSet<Oid> {
		&self.ctx
	}

	pub fn is_ready(&self, r: &Request) -> bool {
		r.causal_ctx.is_subset(&self.ctx)
	}

	pub fn absorb(&mut self, id: Oid) {
		self.ctx.insert(id);
	}

	/// RB-deliver for a causally-ready request (§4.2 step 2): absorb `r`, then run a fixpoint
	/// drain of `MISSING_CONTEXT_OPS` — repeatedly releasing any buffered request whose
	/// prerequisites are now satisfied, including ones only satisfied by requests released
	/// earlier in the same drain (§9 Open Question 4 resolution: fixpoint, not single-shot).
	pub fn absorb_and_drain(&mut self, r: Request) -> Vec<Request> {
		self.ctx.insert(r.id);
		let mut ready = vec![r];

		loop {
			let mut progressed = false;
			let mut still_missing = Vec::with_capacity(self.missing.len());
			for x in self.missing.drain(..) {
				if x.causal_ctx.is_subset(&self.ctx) {
					self.ctx.insert(x.id);
					ready.push(x);
					progressed = true;
				} else {
					still_missing.push(x);
				}
			}
			self.missing = still_missing;
			if !progressed {
				break;
			}
		}
		ready
	}

	pub fn buffer(&mut self, r: Request) {
		self.missing.push(r);
	}

	pub fn missing_len(&self) -> usize {
		self.missing.len()
	}
}
