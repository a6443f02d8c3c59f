use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::oid::Oid;
use crate::op::Op;

/// A user operation as it travels through intake, RB, and the tentative/committed log.
///
/// `Ord`/`PartialOrd` implement the spec's `<` relation: compare `ts` first, then `id` as a
/// tiebreak. This is the order `TENTATIVE` is kept sorted by (§3, §4.3) — it is deliberately
/// *not* derived in field order, since `causal_ctx` must never participate in comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub ts: u64,
	pub id: Oid,
	pub op: Op,
	pub strong_op: bool,
	pub causal_ctx: BTreeSet<Oid>,
}

impl Request {
	pub fn new(id: Oid, op: Op, strong_op: bool, causal_ctx: BTreeSet<Oid>) -> Self {
		Self {
			ts: now_secs(),
			id,
			op,
			strong_op,
			causal_ctx,
		}
	}
}

pub fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock before unix epoch")
		.as_secs()
}

// `Op::Put`'s value is a `serde_json::Value`, which doesn't derive `Eq` (JSON numbers may be
// floats). Requests are only ever compared on `(ts, id)` (see `Ord` below), so the reflexivity
// `Eq` promises holds in practice; assert it manually instead of over-deriving.
impl Eq for Request {}

impl PartialOrd for Request {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Request {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.ts, self.id).cmp(&(other.ts, other.id))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn req(ts: u64, origin: u32, seq: u64) -> Request {
		Request {
			ts,
			id: Oid::new(origin, seq),
			op: Op::Get { key: "x".into() },
			strong_op: false,
			causal_ctx: BTreeSet::new(),
		}
	}

	#[test]
	fn orders_by_ts_then_id() {
		let a = req(10, 0, 1);
		let b = req(10, 0, 2);
		let c = req(5, 1, 9);
		assert!(a < b);
		assert!(c < a);
		assert!(c < b);
	}

	#[test]
	fn equal_ts_and_id_are_equal_order() {
		let a = req(10, 0, 1);
		let mut b = a.clone();
		b.op = Op::Put {
			key: "y".into(),
			value: serde_json::Value::from(1),
		};
		assert_eq!(a.cmp(&b), Ordering::Equal);
	}
}
