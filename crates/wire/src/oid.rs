use std::fmt;

use serde::de::{Error as DeError, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Index of a replica within the fixed `0..N` cluster.
pub type ReplicaId = u32;

/// Unique, totally ordered fingerprint of an operation: the node that created it plus a
/// per-node monotonic sequence number.
///
/// `Oid` orders lexicographically on `(origin, seq)`. This is *not* the tentative-list order
/// (see [`crate::request::Request`]'s `Ord` impl, which additionally weighs `ts`) — it is only
/// used where the spec calls for a deterministic tie-break independent of wall-clock time, e.g.
/// sorting a CAB decision's delivered set before replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid {
	pub origin: ReplicaId,
	pub seq: u64,
}

impl Oid {
	pub fn new(origin: ReplicaId, seq: u64) -> Self {
		Self { origin, seq }
	}
}

impl fmt::Display for Oid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.origin, self.seq)
	}
}

// The HTTP wire contract (§6) represents an id as a bare `[node, seq]` pair, not a named
// object — match that on the nose rather than giving it our internal field names.
impl Serialize for Oid {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut tup = serializer.serialize_tuple(2)?;
		tup.serialize_element(&self.origin)?;
		tup.serialize_element(&self.seq)?;
		tup.end()
	}
}

impl<'de> Deserialize<'de> for Oid {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct OidVisitor;

		impl<'de> Visitor<'de> for OidVisitor {
			type Value = Oid;

			fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str("a [origin, seq] pair")
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Oid, A::Error> {
				let origin = seq
					.next_element()?
					.ok_or_else(|| DeError::invalid_length(0, &self))?;
				let seq_no = seq
					.next_element()?
					.ok_or_else(|| DeError::invalid_length(1, &self))?;
				Ok(Oid::new(origin, seq_no))
			}
		}

		deserializer.deserialize_tuple(2, OidVisitor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrips_as_array() {
		let oid = Oid::new(2, 7);
		let json = serde_json::to_string(&oid).unwrap();
		assert_eq!(json, "[2,7]");
		let back: Oid = serde_json::from_str(&json).unwrap();
		assert_eq!(back, oid);
	}
}
