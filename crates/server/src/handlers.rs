use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use cabkv_replica::{Replica, ReplicaError};
use cabkv_wire::{
	CabMessage, DecideCabBody, GossipCabBody, InvokeBody, InvokeResponse, MsgResponse,
	ProposeCabBody, Request,
};
use serde_json::json;

use crate::error::ApiError;

fn record(endpoint: &'static str, result: &'static str, start: Instant) {
	cabkv_metrics::REQUESTS_TOTAL
		.with_label_values(&[endpoint, result])
		.inc();
	cabkv_metrics::REQUEST_DURATION
		.with_label_values(&[endpoint])
		.observe(start.elapsed().as_secs_f64());
}

/// `POST /invoke` (§6): client intake. Strong ops wait for the commit notification, bounded by
/// `config.strong_op_timeout` (§9 Open Question 3).
pub async fn invoke(
	State(replica): State<Arc<Replica>>,
	Json(body): Json<InvokeBody>,
) -> Result<Json<InvokeResponse>, ApiError> {
	let start = Instant::now();
	let (event_no, rx) = replica.invoke(body.op, body.strong_op).await?;

	if let Some(rx) = rx {
		let timeout = replica.config.strong_op_timeout();
		match tokio::time::timeout(timeout, rx).await {
			Ok(_) => record("invoke", "committed", start),
			Err(_) => {
				record("invoke", "timeout", start);
				return Err(ApiError(ReplicaError::AwaitTimeout));
			}
		}
	} else {
		record("invoke", "accepted", start);
	}

	Ok(Json(InvokeResponse {
		event_no,
		node_id: replica.id,
	}))
}

/// `POST /gossip` (§6): peer operation delivery, idempotent on repeat.
pub async fn gossip(
	State(replica): State<Arc<Replica>>,
	Json(r): Json<Request>,
) -> Result<Json<MsgResponse>, ApiError> {
	let start = Instant::now();
	let progressed = replica.rb_deliver(r).await?;
	record("gossip", "ok", start);
	Ok(Json(MsgResponse::new(if progressed {
		"Added to buffer"
	} else {
		"Already delivered"
	})))
}

/// `POST /gossip-cab` (§6): peer CAB-message delivery, idempotent on repeat.
pub async fn gossip_cab(
	State(replica): State<Arc<Replica>>,
	Json(body): Json<GossipCabBody>,
) -> Json<MsgResponse> {
	let start = Instant::now();
	let progressed = replica
		.rb_deliver_msg(CabMessage {
			m: body.m,
			q: body.q,
		})
		.await;
	record("gossip_cab", "ok", start);
	Json(MsgResponse::new(if progressed {
		"Added to buffer"
	} else {
		"Already delivered"
	}))
}

/// `POST /propose-cab` (§6). Joining the round may itself enqueue this replica's own proposal.
pub async fn propose_cab(
	State(replica): State<Arc<Replica>>,
	Json(body): Json<ProposeCabBody>,
) -> Result<Json<MsgResponse>, ApiError> {
	let start = Instant::now();
	let progressed = replica
		.receive_proposal(cabkv_wire::Proposal {
			server: body.server,
			k: body.k,
			unordered: body.unordered,
		})
		.await?;
	record("propose_cab", "ok", start);
	Ok(Json(MsgResponse::new(if progressed {
		"Added to buffer"
	} else {
		"Already delivered"
	})))
}

/// `POST /decide-cab` (§6).
pub async fn decide_cab(
	State(replica): State<Arc<Replica>>,
	Json(body): Json<DecideCabBody>,
) -> Json<MsgResponse> {
	let start = Instant::now();
	let progressed = replica
		.receive_decision(cabkv_wire::Decision {
			server: body.server,
			k: body.k,
			decided: body.decided,
		})
		.await;
	record("decide_cab", "ok", start);
	Json(MsgResponse::new(if progressed {
		"Added to buffer"
	} else {
		"Already delivered"
	}))
}

/// `GET /health` (§10.5): liveness only, no external dependency checked.
pub async fn health() -> impl IntoResponse {
	Json(json!({ "status": "ok" }))
}

/// `GET /metrics` (§10.4): Prometheus text exposition.
pub async fn metrics() -> Result<String, ApiError> {
	cabkv_metrics::gather().map_err(|err| {
		tracing::error!(%err, "metrics gather failed");
		ApiError(ReplicaError::Invariant(format!("metrics gather failed: {err}")))
	})
}

/// `GET /debug/state` (ambient): read-only snapshot for tests and operators.
pub async fn debug_state(State(replica): State<Arc<Replica>>) -> impl IntoResponse {
	Json(replica.debug_snapshot().await)
}
