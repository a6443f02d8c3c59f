//! Wire types shared between the replica core and its HTTP transport: operation identifiers,
//! requests, and CAB messages, plus the request/response bodies of the five HTTP endpoints.

mod cab;
mod http;
mod oid;
mod op;
mod request;

pub use cab::{CabMessage, Decision, Predicate, Proposal};
pub use http::{
	DecideCabBody, GossipCabBody, InvokeBody, InvokeResponse, MsgResponse, ProposeCabBody,
};
pub use oid::{Oid, ReplicaId};
pub use op::Op;
pub use request::{now_secs, Request};
