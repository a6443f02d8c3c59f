use std::fmt;

use serde::de::{Error as DeError, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The application-level operation carried by a [`crate::request::Request`].
///
/// Wire-compatible with the `[kind, key, value?]` triple from the HTTP layer (§6): a `GET`
/// serializes as `["GET", key]`, a `PUT` as `["PUT", key, value]`. Rust callers still pattern
/// match on the variants directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
	Get { key: String },
	Put { key: String, value: Value },
}

impl Op {
	pub fn key(&self) -> &str {
		match self {
			Op::Get { key } => key,
			Op::Put { key, .. } => key,
		}
	}

	pub fn is_mutating(&self) -> bool {
		matches!(self, Op::Put { .. })
	}
}

impl Serialize for Op {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Op::Get { key } => {
				let mut seq = serializer.serialize_seq(Some(2))?;
				seq.serialize_element("GET")?;
				seq.serialize_element(key)?;
				seq.end()
			}
			Op::Put { key, value } => {
				let mut seq = serializer.serialize_seq(Some(3))?;
				seq.serialize_element("PUT")?;
				seq.serialize_element(key)?;
				seq.serialize_element(value)?;
				seq.end()
			}
		}
	}
}

impl<'de> Deserialize<'de> for Op {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct OpVisitor;

		impl<'de> Visitor<'de> for OpVisitor {
			type Value = Op;

			fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(r#"a ["GET", key] or ["PUT", key, value] triple"#)
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Op, A::Error> {
				let kind: String = seq
					.next_element()?
					.ok_or_else(|| DeError::invalid_length(0, &self))?;
				let key: String = seq
					.next_element()?
					.ok_or_else(|| DeError::invalid_length(1, &self))?;
				match kind.as_str() {
					"GET" => Ok(Op::Get { key }),
					"PUT" => {
						let value: Value = seq
							.next_element()?
							.ok_or_else(|| DeError::invalid_length(2, &self))?;
						Ok(Op::Put { key, value })
					}
					other => Err(DeError::custom(format!("unknown op kind {other:?}"))),
				}
			}
		}

		deserializer.deserialize_seq(OpVisitor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn get_roundtrips() {
		let op = Op::Get { key: "x".into() };
		let json = serde_json::to_string(&op).unwrap();
		assert_eq!(json, r#"["GET","x"]"#);
		assert_eq!(serde_json::from_str::<Op>(&json).unwrap(), op);
	}

	#[test]
	fn put_roundtrips() {
		let op = Op::Put {
			key: "x".into(),
			value: Value::from(1),
		};
		let json = serde_json::to_string(&op).unwrap();
		assert_eq!(json, r#"["PUT","x",1]"#);
		assert_eq!(serde_json::from_str::<Op>(&json).unwrap(), op);
	}
}
