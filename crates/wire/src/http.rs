use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cab::Predicate;
use crate::oid::{Oid, ReplicaId};
use crate::op::Op;

/// Body of `POST /invoke` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeBody {
	pub op: Op,
	pub strong_op: bool,
}

/// Response of `POST /invoke`.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeResponse {
	pub event_no: u64,
	pub node_id: ReplicaId,
}

/// Body of `POST /gossip-cab` (§6). `POST /gossip` reuses [`crate::Request`] directly, since
/// its body is exactly a `Request`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GossipCabBody {
	pub m: Oid,
	pub q: Predicate,
}

/// Body of `POST /propose-cab` (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProposeCabBody {
	pub server: ReplicaId,
	pub k: u64,
	pub unordered: BTreeSet<Oid>,
}

/// Body of `POST /decide-cab` (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecideCabBody {
	pub server: ReplicaId,
	pub k: u64,
	pub decided: BTreeSet<Oid>,
}

/// Generic `{"msg": "..."}` response used by every idempotent delivery endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MsgResponse {
	pub msg: String,
}

impl MsgResponse {
	pub fn new(msg: impl Into<String>) -> Self {
		Self { msg: msg.into() }
	}
}
