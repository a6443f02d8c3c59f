use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::oid::{Oid, ReplicaId};

/// Closed table of CAB predicates, tagged on the wire by `q`. The spec's `"check_dep"` is the
/// only member today; adding a new predicate means adding a variant here and a matching arm
/// wherever predicates are evaluated, not a dynamic lookup (§9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
	CheckDep,
}

/// A CAB payload: the operation identifier being ordered, tagged with the predicate that must
/// hold before it may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CabMessage {
	pub m: Oid,
	pub q: Predicate,
}

/// Round-`k` proposal: a replica's snapshot of `UNORDERED_MESSAGES` at propose time.
///
/// `k` is a bare, shared round index, not scoped to its proposer (§9 Open Question 2): any
/// replica may become a proposer whenever it has unordered messages and no round of its own
/// active, using its local `CONSENSUS_K + 1` as `k`. Proposals from different proposers can
/// legitimately land in the same round bucket — that is how quorum is reached without a leader.
/// To keep independently-chosen `k`s from drifting apart over time, every replica adopts
/// `max(local CONSENSUS_K, k)` whenever it observes a proposal or decision for round `k`
/// (resolution (a): coordinate round numbers, rather than tagging by `(proposer, k)`, which
/// would make quorum unreachable since each proposer would then own a disjoint round space).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
	pub server: ReplicaId,
	pub k: u64,
	pub unordered: BTreeSet<Oid>,
}

/// Round-`k` decision: a replica's predicate-filtered intersection of the proposals it has
/// collected for that round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
	pub server: ReplicaId,
	pub k: u64,
	pub decided: BTreeSet<Oid>,
}
