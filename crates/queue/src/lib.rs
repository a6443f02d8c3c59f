//! The queue substrate the core dispatches through (§6 "Queue substrate contract"): four
//! named, append/pop FIFO queues. The core only ever sees the [`DispatchQueue`] trait; this
//! crate supplies a Redis-backed implementation (the production binding, in the spirit of
//! `redis-util`'s connection-manager pattern) and an in-memory one for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

/// The four dissemination queues named in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
	OperationOut,
	CabOut,
	ProposeOut,
	DecideOut,
}

impl QueueName {
	fn redis_key(self) -> &'static str {
		match self {
			QueueName::OperationOut => "cabkv:queue:operation-out",
			QueueName::CabOut => "cabkv:queue:cab-out",
			QueueName::ProposeOut => "cabkv:queue:propose-out",
			QueueName::DecideOut => "cabkv:queue:decide-out",
		}
	}
}

#[derive(Debug, Error)]
pub enum QueueError {
	#[error("redis error: {0}")]
	Redis(#[from] redis::RedisError),
}

/// `push`/`pop` with `push-left/pop-right` FIFO semantics (§6): `push` enqueues at the head,
/// `pop` dequeues from the tail, so items drain in the order they were pushed.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
	async fn push(&self, queue: QueueName, payload: Vec<u8>) -> Result<(), QueueError>;
	async fn pop(&self, queue: QueueName) -> Result<Option<Vec<u8>>, QueueError>;
}

/// Redis-backed binding: one list key per queue, `LPUSH` to push, `RPOP` to pop.
pub struct RedisQueue {
	conn: redis::aio::ConnectionManager,
}

impl RedisQueue {
	pub async fn connect(host: &str, port: u16) -> Result<Self, QueueError> {
		let client = redis::Client::open(format!("redis://{host}:{port}"))?;
		let conn = client.get_connection_manager().await?;
		tracing::info!(host, port, "connected to redis queue substrate");
		Ok(Self { conn })
	}
}

#[async_trait]
impl DispatchQueue for RedisQueue {
	async fn push(&self, queue: QueueName, payload: Vec<u8>) -> Result<(), QueueError> {
		let mut conn = self.conn.clone();
		let _: () = conn.lpush(queue.redis_key(), payload).await?;
		Ok(())
	}

	async fn pop(&self, queue: QueueName) -> Result<Option<Vec<u8>>, QueueError> {
		let mut conn = self.conn.clone();
		let item: Option<Vec<u8>> = conn.rpop(queue.redis_key(), None).await?;
		Ok(item)
	}
}

/// In-memory binding used by tests and the doc examples, so the dissemination pipeline can be
/// exercised without a live Redis.
#[derive(Default)]
pub struct InMemoryQueue {
	queues: Mutex<HashMap<QueueName, VecDeque<Vec<u8>>>>,
}

impl InMemoryQueue {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl DispatchQueue for InMemoryQueue {
	async fn push(&self, queue: QueueName, payload: Vec<u8>) -> Result<(), QueueError> {
		self.queues
			.lock()
			.unwrap()
			.entry(queue)
			.or_default()
			.push_front(payload);
		Ok(())
	}

	async fn pop(&self, queue: QueueName) -> Result<Option<Vec<u8>>, QueueError> {
		Ok(self
			.queues
			.lock()
			.unwrap()
			.entry(queue)
			.or_default()
			.pop_back())
	}
}
