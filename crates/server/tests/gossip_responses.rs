//! Exercises the router directly (§6) to pin the literal `msg` text of the idempotent
//! delivery endpoints: first delivery reports `"Added to buffer"`, a repeat reports
//! `"Already delivered"` (spec.md S5; SPEC_FULL.md §6 line 155).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request as HttpRequest, StatusCode};
use cabkv_config::{Config, LogFormat};
use cabkv_queue::{DispatchQueue, InMemoryQueue};
use cabkv_replica::Replica;
use tower::ServiceExt;

fn config() -> Arc<Config> {
	Arc::new(Config {
		node_id: 0,
		node_urls: vec!["127.0.0.1:9000".into(), "127.0.0.1:9001".into()],
		redis_host: "unused".into(),
		redis_port: 0,
		http_bind: None,
		tick_interval_ms: 1,
		strong_op_timeout_ms: 1_000,
		fanout: 1,
		quorum_override: None,
		log_format: LogFormat::Logfmt,
	})
}

async fn post(app: &axum::Router, path: &str, body: serde_json::Value) -> serde_json::Value {
	let resp = app
		.clone()
		.oneshot(
			HttpRequest::builder()
				.method("POST")
				.uri(path)
				.header("content-type", "application/json")
				.body(Body::from(serde_json::to_vec(&body).unwrap()))
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(resp.status(), StatusCode::OK);
	let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn gossip_reports_spec_literal_messages() {
	let queue: Arc<dyn DispatchQueue> = Arc::new(InMemoryQueue::new());
	let replica = Arc::new(Replica::new(config(), queue));
	let app = cabkv_server::router::build(replica);

	let body = serde_json::json!({
		"ts": 1,
		"id": [1, 1],
		"op": ["PUT", "x", 7],
		"strong_op": false,
		"causal_ctx": [],
	});

	let first = post(&app, "/gossip", body.clone()).await;
	assert_eq!(first["msg"], "Added to buffer");

	let second = post(&app, "/gossip", body).await;
	assert_eq!(second["msg"], "Already delivered");
}

#[tokio::test]
async fn gossip_cab_reports_spec_literal_messages() {
	let queue: Arc<dyn DispatchQueue> = Arc::new(InMemoryQueue::new());
	let replica = Arc::new(Replica::new(config(), queue));
	let app = cabkv_server::router::build(replica);

	let body = serde_json::json!({ "m": [1, 1], "q": "check_dep" });

	let first = post(&app, "/gossip-cab", body.clone()).await;
	assert_eq!(first["msg"], "Added to buffer");

	let second = post(&app, "/gossip-cab", body).await;
	assert_eq!(second["msg"], "Already delivered");
}

#[tokio::test]
async fn propose_and_decide_cab_report_spec_literal_messages() {
	let queue: Arc<dyn DispatchQueue> = Arc::new(InMemoryQueue::new());
	let replica = Arc::new(Replica::new(config(), queue));
	let app = cabkv_server::router::build(replica);

	let propose_body = serde_json::json!({ "server": 1, "k": 1, "unordered": [] });
	let first = post(&app, "/propose-cab", propose_body.clone()).await;
	assert_eq!(first["msg"], "Added to buffer");
	let second = post(&app, "/propose-cab", propose_body).await;
	assert_eq!(second["msg"], "Already delivered");

	let decide_body = serde_json::json!({ "server": 1, "k": 1, "decided": [] });
	let first = post(&app, "/decide-cab", decide_body.clone()).await;
	assert_eq!(first["msg"], "Added to buffer");
	let second = post(&app, "/decide-cab", decide_body).await;
	assert_eq!(second["msg"], "Already delivered");
}
