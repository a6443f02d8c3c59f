//! HTTP binding for the replica (§6): the `axum` router and its handlers, split out as a
//! library so the endpoints can be exercised directly in tests without a bound socket.

pub mod error;
pub mod handlers;
pub mod router;
