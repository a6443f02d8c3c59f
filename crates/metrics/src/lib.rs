//! Metrics surface for the replica, mirroring the teacher crate's `lazy_static` + `prometheus`
//! registry convention (one module, one set of `register_*_with_registry!` statics).

pub use prometheus;

use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

pub const BUCKETS: &[f64] = &[
	0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

lazy_static::lazy_static! {
	pub static ref REGISTRY: Registry = Registry::new();

	// MARK: HTTP requests
	pub static ref REQUESTS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec_with_registry!(
		"cabkv_requests_total",
		"Total number of HTTP requests handled, by endpoint and result.",
		&["endpoint", "result"],
		REGISTRY
	).unwrap();

	pub static ref REQUEST_DURATION: HistogramVec = prometheus::register_histogram_vec_with_registry!(
		"cabkv_request_duration_seconds",
		"Duration of HTTP request handling in seconds.",
		&["endpoint"],
		BUCKETS.to_vec(),
		REGISTRY
	).unwrap();

	// MARK: Consensus (CAB)
	pub static ref PROPOSALS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec_with_registry!(
		"cabkv_proposals_total",
		"Total number of CAB proposals started, by status.",
		&["status"],
		REGISTRY
	).unwrap();

	pub static ref QUORUM_ATTEMPTS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec_with_registry!(
		"cabkv_quorum_attempts_total",
		"Total number of quorum checks, by phase and result.",
		&["phase", "result"],
		REGISTRY
	).unwrap();

	pub static ref ROUNDS_COMPLETED_TOTAL: IntCounter = prometheus::register_int_counter_with_registry!(
		"cabkv_rounds_completed_total",
		"Total number of CAB rounds that completed an apply phase.",
		REGISTRY
	).unwrap();

	// MARK: Log manager
	pub static ref COMMITS_TOTAL: IntCounter = prometheus::register_int_counter_with_registry!(
		"cabkv_commits_total",
		"Total number of operations promoted from TENTATIVE to COMMITTED.",
		REGISTRY
	).unwrap();

	pub static ref ROLLBACKS_TOTAL: IntCounter = prometheus::register_int_counter_with_registry!(
		"cabkv_rollbacks_total",
		"Total number of speculative operations rolled back.",
		REGISTRY
	).unwrap();

	pub static ref TENTATIVE_LEN: IntGauge = prometheus::register_int_gauge_with_registry!(
		"cabkv_tentative_len",
		"Current length of the TENTATIVE list.",
		REGISTRY
	).unwrap();

	pub static ref COMMITTED_LEN: IntGauge = prometheus::register_int_gauge_with_registry!(
		"cabkv_committed_len",
		"Current length of the COMMITTED list.",
		REGISTRY
	).unwrap();
}

/// Render the registry in Prometheus text exposition format, for `GET /metrics`.
pub fn gather() -> Result<String, prometheus::Error> {
	let metric_families = REGISTRY.gather();
	let mut buf = Vec::new();
	TextEncoder::new().encode(&metric_families, &mut buf)?;
	String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
