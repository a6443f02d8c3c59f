use std::sync::Arc;

use cabkv_config::{Config, LogFormat};
use cabkv_queue::{DispatchQueue, RedisQueue};
use cabkv_replica::{tasks, Replica};
use cabkv_server::router;

fn init_tracing(format: LogFormat) {
	use tracing_subscriber::prelude::*;
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	match format {
		LogFormat::Logfmt => registry.with(tracing_logfmt::layer()).init(),
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Config::from_env()?;
	init_tracing(config.log_format);
	let config = Arc::new(config);

	tracing::info!(node_id = config.node_id, node_count = config.node_count(), "starting replica");

	let queue: Arc<dyn DispatchQueue> =
		Arc::new(RedisQueue::connect(&config.redis_host, config.redis_port).await?);

	let replica = Arc::new(Replica::new(config.clone(), queue.clone()));
	let _loops = tasks::spawn_loops(replica.clone(), queue, config.clone());

	let app = router::build(replica);
	let addr = config.http_bind_addr()?;
	tracing::info!(%addr, "listening");
	let listener = tokio::net::TcpListener::bind(addr).await?;
	axum::serve(listener, app).await?;
	Ok(())
}
