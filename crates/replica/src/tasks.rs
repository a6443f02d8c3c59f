//! The cooperative task loops of §5: rollback, execute, the three CAB phases, the
//! ordered-message drainer, and the two outbound dispatch workers.

use std::sync::Arc;
use std::time::Duration;

use cabkv_config::Config;
use cabkv_queue::{DispatchQueue, QueueName};
use cabkv_wire::{CabMessage, Decision, Proposal, Request};
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;

use crate::replica::Replica;

const MAX_ATTEMPTS: u32 = 3;

/// Spawn every background loop. Returns the handles so callers (tests, or a graceful-shutdown
/// path in `main`) can abort them; dropping the handles leaves the tasks running detached.
pub fn spawn_loops(
	replica: Arc<Replica>,
	queue: Arc<dyn DispatchQueue>,
	config: Arc<Config>,
) -> Vec<JoinHandle<()>> {
	let tick = config.tick_interval();
	let mut handles = Vec::new();

	handles.push(tokio::spawn(poll_loop(tick, {
		let replica = replica.clone();
		move || {
			let replica = replica.clone();
			async move {
				if let Err(err) = replica.tick_rollback().await {
					tracing::error!(%err, "broken invariant in rollback loop, aborting process");
					std::process::abort();
				}
			}
		}
	})));

	handles.push(tokio::spawn(poll_loop(tick, {
		let replica = replica.clone();
		move || {
			let replica = replica.clone();
			async move {
				replica.tick_execute().await;
			}
		}
	})));

	handles.push(tokio::spawn(poll_loop(tick, {
		let replica = replica.clone();
		move || {
			let replica = replica.clone();
			async move {
				if let Err(err) = replica.tick_cab().await {
					tracing::warn!(%err, "cab round tick failed");
				}
			}
		}
	})));

	handles.push(tokio::spawn(poll_loop(tick, {
		let replica = replica.clone();
		move || {
			let replica = replica.clone();
			async move {
				replica.tick_ordered_drain().await;
			}
		}
	})));

	handles.push(tokio::spawn(gossip_dispatcher(
		queue.clone(),
		config.clone(),
		tick,
	)));
	handles.push(tokio::spawn(consensus_dispatcher(queue, config, tick)));

	handles
}

/// Poll loop shared by the five "wake up, try to make progress" loops: cheap enough to run on
/// a fixed tick rather than being woken by a condvar, matching the teacher's worker style.
async fn poll_loop<F, Fut>(tick: Duration, mut body: F)
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = ()>,
{
	loop {
		body().await;
		tokio::time::sleep(tick).await;
	}
}

/// Dispatcher for `operation-out`/`cab-out`: fan out to `config.fanout` randomly chosen peers.
async fn gossip_dispatcher(queue: Arc<dyn DispatchQueue>, config: Arc<Config>, tick: Duration) {
	let client = reqwest::Client::new();
	loop {
		let mut dispatched = false;
		if let Some(payload) = pop(&queue, QueueName::OperationOut).await {
			dispatched = true;
			if let Ok(r) = serde_json::from_slice::<Request>(&payload) {
				fanout_post(&client, &config, "/gossip", &r, config.fanout).await;
			}
		}
		if let Some(payload) = pop(&queue, QueueName::CabOut).await {
			dispatched = true;
			if let Ok(m) = serde_json::from_slice::<CabMessage>(&payload) {
				fanout_post(&client, &config, "/gossip-cab", &m, config.fanout).await;
			}
		}
		if !dispatched {
			tokio::time::sleep(tick).await;
		}
	}
}

/// Dispatcher for `propose-out`/`decide-out`: broadcast to *all* other replicas, since quorum
/// requires every peer to eventually see each proposal/decision.
async fn consensus_dispatcher(queue: Arc<dyn DispatchQueue>, config: Arc<Config>, tick: Duration) {
	let client = reqwest::Client::new();
	let all_peers = config.node_count();
	loop {
		let mut dispatched = false;
		if let Some(payload) = pop(&queue, QueueName::ProposeOut).await {
			dispatched = true;
			if let Ok(p) = serde_json::from_slice::<Proposal>(&payload) {
				fanout_post(&client, &config, "/propose-cab", &p, all_peers).await;
			}
		}
		if let Some(payload) = pop(&queue, QueueName::DecideOut).await {
			dispatched = true;
			if let Ok(d) = serde_json::from_slice::<Decision>(&payload) {
				fanout_post(&client, &config, "/decide-cab", &d, all_peers).await;
			}
		}
		if !dispatched {
			tokio::time::sleep(tick).await;
		}
	}
}

async fn pop(queue: &Arc<dyn DispatchQueue>, name: QueueName) -> Option<Vec<u8>> {
	match queue.pop(name).await {
		Ok(item) => item,
		Err(err) => {
			tracing::warn!(%err, ?name, "queue pop failed");
			None
		}
	}
}

/// Post `body` to `fanout` peers (or every peer, if `fanout >= node_count - 1`), chosen at
/// random, retrying each individually up to `MAX_ATTEMPTS` times with no backoff (§5).
async fn fanout_post<T: serde::Serialize>(
	client: &reqwest::Client,
	config: &Config,
	path: &str,
	body: &T,
	fanout: usize,
) {
	let mut peers: Vec<u32> = config.peer_ids().collect();
	peers.shuffle(&mut rand::thread_rng());
	peers.truncate(fanout.max(1));

	for peer in peers {
		let url = format!("http://{}{}", config.peer_url(peer), path);
		post_with_retries(client, &url, body).await;
	}
}

async fn post_with_retries<T: serde::Serialize>(client: &reqwest::Client, url: &str, body: &T) {
	for attempt in 1..=MAX_ATTEMPTS {
		match client.post(url).json(body).send().await {
			Ok(resp) if resp.status().is_success() => return,
			Ok(resp) => {
				tracing::debug!(url, status = %resp.status(), attempt, "peer post rejected");
			}
			Err(err) => {
				tracing::debug!(url, %err, attempt, "peer post failed");
			}
		}
	}
	tracing::warn!(url, "peer post abandoned after retries");
}
