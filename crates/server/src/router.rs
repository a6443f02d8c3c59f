use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use cabkv_replica::Replica;

use crate::handlers;

/// Mounts the eight endpoints of §6 onto a fresh [`Router`], in the teacher's
/// `create_router`-style "build, then mount" shape.
pub fn build(replica: Arc<Replica>) -> Router {
	Router::new()
		.route("/invoke", post(handlers::invoke))
		.route("/gossip", post(handlers::gossip))
		.route("/gossip-cab", post(handlers::gossip_cab))
		.route("/propose-cab", post(handlers::propose_cab))
		.route("/decide-cab", post(handlers::decide_cab))
		.route("/health", get(handlers::health))
		.route("/metrics", get(handlers::metrics))
		.route("/debug/state", get(handlers::debug_state))
		.with_state(replica)
}
