//! In-process multi-replica scenarios (§10.6), driving the core end-to-end with
//! [`InMemoryQueue`] and direct function calls standing in for HTTP and Redis.

use std::collections::BTreeSet;
use std::sync::Arc;

use cabkv_config::{Config, LogFormat};
use cabkv_queue::{DispatchQueue, InMemoryQueue, QueueName};
use cabkv_replica::Replica;
use cabkv_wire::{CabMessage, Oid, Op, Predicate, Request};
use serde_json::Value;

fn config_for(node_id: u32, count: usize) -> Arc<Config> {
	Arc::new(Config {
		node_id,
		node_urls: (0..count).map(|i| format!("127.0.0.1:{}", 9000 + i)).collect(),
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

/// A cluster of in-process replicas, each with its own outbound [`InMemoryQueue`] that the
/// test drains and re-delivers to peers by hand — the same shape a real HTTP dispatcher
/// would produce, minus the network.
struct Cluster {
	replicas: Vec<Arc<Replica>>,
	queues: Vec<Arc<InMemoryQueue>>,
}

impl Cluster {
	fn new(n: usize) -> Self {
		let mut replicas = Vec::new();
		let mut queues = Vec::new();
		for i in 0..n {
			let q = Arc::new(InMemoryQueue::new());
			let replica = Arc::new(Replica::new(
				config_for(i as u32, n),
				q.clone() as Arc<dyn DispatchQueue>,
			));
			replicas.push(replica);
			queues.push(q);
		}
		Self { replicas, queues }
	}

	async fn drain<T: serde::de::DeserializeOwned>(&self, from: usize, q: QueueName) -> Vec<T> {
		let mut out = Vec::new();
		while let Some(bytes) = self.queues[from].pop(q).await.unwrap() {
			out.push(serde_json::from_slice(&bytes).unwrap());
		}
		out
	}

	/// Deliver everything `from` has queued for operation/CAB-message gossip to every peer.
	async fn broadcast_gossip(&self, from: usize) {
		for r in self.drain::<Request>(from, QueueName::OperationOut).await {
			for (i, replica) in self.replicas.iter().enumerate() {
				if i != from {
					replica.rb_deliver(r.clone()).await.unwrap();
				}
			}
		}
		for m in self.drain::<CabMessage>(from, QueueName::CabOut).await {
			for (i, replica) in self.replicas.iter().enumerate() {
				if i != from {
					replica.rb_deliver_msg(m).await;
				}
			}
		}
	}

	/// Deliver everything `from` has queued for CAB propose/decide to every peer.
	async fn broadcast_consensus(&self, from: usize) {
		for p in self
			.drain::<cabkv_wire::Proposal>(from, QueueName::ProposeOut)
			.await
		{
			for (i, replica) in self.replicas.iter().enumerate() {
				if i != from {
					replica.receive_proposal(p.clone()).await.unwrap();
				}
			}
		}
		for d in self.drain::<cabkv_wire::Decision>(from, QueueName::DecideOut).await {
			for (i, replica) in self.replicas.iter().enumerate() {
				if i != from {
					replica.receive_decision(d.clone()).await;
				}
			}
		}
	}

	/// Run enough propose/decide/apply ticks, with full gossip between each, to carry one CAB
	/// round to completion across every replica.
	async fn run_cab_rounds(&self, rounds: usize) {
		for _ in 0..rounds {
			for i in 0..self.replicas.len() {
				self.replicas[i].tick_cab().await.unwrap();
				self.broadcast_consensus(i).await;
			}
		}
	}

	/// Drain the ordered-message/rollback/execute loops until everyone is quiescent.
	async fn settle(&self) {
		for _ in 0..8 {
			for r in &self.replicas {
				r.tick_ordered_drain().await;
				while r.tick_rollback().await.unwrap() {}
				while r.tick_execute().await {}
			}
		}
	}
}

fn put(key: &str, v: i64) -> Op {
	Op::Put {
		key: key.into(),
		value: Value::from(v),
	}
}

/// S1: a single weak PUT gossiped to all replicas converges on every store.
#[tokio::test]
async fn weak_put_converges_across_replicas() {
	let cluster = Cluster::new(2);
	cluster.replicas[0].invoke(put("x", 1), false).await.unwrap();
	cluster.broadcast_gossip(0).await;
	cluster.settle().await;

	assert_eq!(cluster.replicas[0].get("x").await, Some(Value::from(1)));
	assert_eq!(cluster.replicas[1].get("x").await, Some(Value::from(1)));
}

/// S2: a causally dependent request delivered before its prerequisite is buffered in
/// `MISSING_CONTEXT_OPS`, then released by the fixpoint drain once the prerequisite arrives.
#[tokio::test]
async fn causal_chain_reorders_via_missing_context_drain() {
	let cluster = Cluster::new(2);
	let a = Request {
		ts: 10,
		id: Oid::new(0, 1),
		op: put("x", 1),
		strong_op: true,
		causal_ctx: BTreeSet::new(),
	};
	let b = Request {
		ts: 11,
		id: Oid::new(0, 2),
		op: put("x", 2),
		strong_op: true,
		causal_ctx: [a.id].into_iter().collect(),
	};

	// b arrives at replica 1 before a: it must be buffered, not inserted into TENTATIVE yet.
	assert!(cluster.replicas[1].rb_deliver(b.clone()).await.unwrap());
	let snapshot = cluster.replicas[1].debug_snapshot().await;
	assert_eq!(snapshot.tentative_len, 0);

	// a arrives: the drain must release b in the same delivery.
	assert!(cluster.replicas[1].rb_deliver(a.clone()).await.unwrap());
	let snapshot = cluster.replicas[1].debug_snapshot().await;
	assert_eq!(snapshot.tentative_len, 2);
}

/// S3: a strong op reaches a CAB quorum across three replicas and commits identically on all.
#[tokio::test]
async fn strong_op_commits_via_cab_quorum() {
	let cluster = Cluster::new(3);
	cluster.replicas[0].invoke(put("x", 42), true).await.unwrap();
	cluster.broadcast_gossip(0).await; // propagate the op and its CAB-cast message first

	cluster.run_cab_rounds(6).await;
	cluster.settle().await;

	for replica in &cluster.replicas {
		let snapshot = replica.debug_snapshot().await;
		assert_eq!(snapshot.committed_len, 1, "every replica should commit the strong op");
	}
	assert_eq!(cluster.replicas[1].get("x").await, Some(Value::from(42)));
	assert_eq!(cluster.replicas[2].get("x").await, Some(Value::from(42)));
}

/// S4: a strong op sits in `TENTATIVE` awaiting its CAB round and is executed speculatively.
/// A later-arriving op that sorts ahead of it in `TENTATIVE` forces a rollback of the
/// speculatively-executed suffix, which is re-applied in the corrected order. (A weak op with
/// an empty causal context is, by contrast, always ready the instant it is delivered — it
/// commits straight into `COMMITTED` and never sits through a reorder; this scenario needs
/// strong ops specifically to observe the rollback machinery.)
#[tokio::test]
async fn speculative_execution_rolls_back_out_of_order_suffix() {
	let cluster = Cluster::new(2);
	let op_a = Request {
		ts: 100,
		id: Oid::new(0, 1),
		op: put("x", 1),
		strong_op: true,
		causal_ctx: BTreeSet::new(),
	};
	cluster.replicas[1].rb_deliver(op_a).await.unwrap();
	cluster.settle().await;
	assert_eq!(cluster.replicas[1].get("x").await, Some(Value::from(1)));
	let snapshot = cluster.replicas[1].debug_snapshot().await;
	assert_eq!(snapshot.executed_len, 1);
	assert_eq!(snapshot.committed_len, 0); // still tentative, no CAB round run

	// Sorts ahead of op_a in TENTATIVE (earlier ts), on a different key so the final values
	// alone can't hide a stale double-apply.
	let op_b = Request {
		ts: 5,
		id: Oid::new(2, 1),
		op: put("y", 2),
		strong_op: true,
		causal_ctx: BTreeSet::new(),
	};
	cluster.replicas[1].rb_deliver(op_b).await.unwrap();
	cluster.settle().await;

	let snapshot = cluster.replicas[1].debug_snapshot().await;
	assert_eq!(snapshot.to_be_rolledback_len, 0, "rollback must drain before execute resumes");
	assert_eq!(snapshot.executed_len, 2, "both ops re-executed in the reordered sequence");
	assert_eq!(cluster.replicas[1].get("x").await, Some(Value::from(1)));
	assert_eq!(cluster.replicas[1].get("y").await, Some(Value::from(2)));
}

/// S5: delivering the same operation gossip twice is idempotent.
#[tokio::test]
async fn duplicate_gossip_delivery_is_idempotent() {
	let cluster = Cluster::new(2);
	let r = Request {
		ts: 1,
		id: Oid::new(0, 1),
		op: put("x", 1),
		strong_op: false,
		causal_ctx: BTreeSet::new(),
	};
	assert!(cluster.replicas[1].rb_deliver(r.clone()).await.unwrap());
	assert!(!cluster.replicas[1].rb_deliver(r).await.unwrap());

	// A weak op with an empty causal context is ready the instant it is delivered, so it
	// commits immediately rather than lingering in TENTATIVE; the repeat delivery must not
	// double it up in COMMITTED.
	let snapshot = cluster.replicas[1].debug_snapshot().await;
	assert_eq!(snapshot.tentative_len, 0);
	assert_eq!(snapshot.committed_len, 1);
}

/// S6: a CAB round whose only message never satisfies `check_dep` still advances to an empty
/// decision rather than stalling, and the engine keeps making progress afterwards.
#[tokio::test]
async fn empty_cab_decision_still_advances_the_round() {
	let cluster = Cluster::new(3);
	// CAB-cast a message whose operation is never actually RB-delivered: check_dep can never
	// hold for it, so the predicate filter must exclude it from every decision.
	let phantom = Oid::new(0, 99);
	for replica in &cluster.replicas {
		replica
			.rb_deliver_msg(CabMessage {
				m: phantom,
				q: Predicate::CheckDep,
			})
			.await;
	}

	cluster.run_cab_rounds(6).await;
	cluster.settle().await;

	for replica in &cluster.replicas {
		let snapshot = replica.debug_snapshot().await;
		assert!(!snapshot.committed_ids.contains(&phantom));
	}

	// The round closed cleanly: a fresh strong op still reaches quorum afterwards.
	cluster.replicas[0].invoke(put("y", 7), true).await.unwrap();
	cluster.broadcast_gossip(0).await;
	cluster.run_cab_rounds(6).await;
	cluster.settle().await;
	assert_eq!(cluster.replicas[2].get("y").await, Some(Value::from(7)));
}
