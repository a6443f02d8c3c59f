//! Typed process configuration, assembled from the environment the way `rivet-config` builds
//! its `Config` from `NODE_URLS`/`REDIS_HOST`/etc: one `config::Config` pass over
//! [`config::Environment`], deserialized into a plain struct so every other crate depends on a
//! typed value instead of calling `std::env::var` itself.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to load configuration: {0}")]
	Load(#[from] config::ConfigError),
	#[error("NODE_ID {node_id} is out of range for {count} NODE_URLS entries")]
	NodeIdOutOfRange { node_id: u32, count: usize },
	#[error("invalid HTTP bind address {addr:?} for node {node_id}: {source}")]
	InvalidBindAddr {
		node_id: u32,
		addr: String,
		#[source]
		source: std::net::AddrParseError,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	Pretty,
	Json,
	Logfmt,
}

impl Default for LogFormat {
	fn default() -> Self {
		LogFormat::Logfmt
	}
}

/// Process-wide configuration for a single replica.
///
/// `node_urls[node_id]` is this replica's own address; every other entry is a peer. The HTTP
/// bind address defaults to that same entry's port if `HTTP_BIND` isn't set explicitly, so a
/// single `NODE_URLS` list suffices for both "who am I" and "where do I listen".
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub node_id: u32,
	#[serde(deserialize_with = "deserialize_comma_list")]
	pub node_urls: Vec<String>,
	pub redis_host: String,
	#[serde(default = "default_redis_port")]
	pub redis_port: u16,
	#[serde(default)]
	pub http_bind: Option<String>,
	#[serde(default = "default_tick_interval_ms")]
	pub tick_interval_ms: u64,
	#[serde(default = "default_strong_op_timeout_ms")]
	pub strong_op_timeout_ms: u64,
	#[serde(default = "default_fanout")]
	pub fanout: usize,
	#[serde(default)]
	pub quorum_override: Option<usize>,
	#[serde(default)]
	pub log_format: LogFormat,
}

fn default_redis_port() -> u16 {
	6379
}

fn default_tick_interval_ms() -> u64 {
	20
}

fn default_strong_op_timeout_ms() -> u64 {
	5_000
}

fn default_fanout() -> usize {
	1
}

fn deserialize_comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	struct CommaListVisitor;

	impl<'de> serde::de::Visitor<'de> for CommaListVisitor {
		type Value = Vec<String>;

		fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			f.write_str("a comma-separated string or a sequence of strings")
		}

		fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
			Ok(v.split(',').map(|s| s.trim().to_string()).collect())
		}

		fn visit_seq<A: serde::de::SeqAccess<'de>>(
			self,
			mut seq: A,
		) -> Result<Self::Value, A::Error> {
			let mut out = Vec::new();
			while let Some(s) = seq.next_element::<String>()? {
				out.push(s);
			}
			Ok(out)
		}
	}

	deserializer.deserialize_any(CommaListVisitor)
}

impl Config {
	/// Load configuration from the process environment (`NODE_ID`, `NODE_URLS`, `REDIS_HOST`,
	/// `REDIS_PORT`, and the optional tunables above).
	pub fn from_env() -> Result<Self, ConfigError> {
		let raw = config::Config::builder()
			.add_source(config::Environment::default().try_parsing(true))
			.build()?;
		let cfg: Config = raw.try_deserialize()?;
		cfg.validate()?;
		Ok(cfg)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.node_id as usize >= self.node_urls.len() {
			return Err(ConfigError::NodeIdOutOfRange {
				node_id: self.node_id,
				count: self.node_urls.len(),
			});
		}
		Ok(())
	}

	pub fn node_count(&self) -> usize {
		self.node_urls.len()
	}

	/// Explicit majority quorum, `⌊N/2⌋ + 1` unless overridden (§9 Open Question 1).
	pub fn quorum(&self) -> usize {
		self.quorum_override
			.unwrap_or_else(|| self.node_count() / 2 + 1)
	}

	pub fn own_url(&self) -> &str {
		&self.node_urls[self.node_id as usize]
	}

	pub fn peer_ids(&self) -> impl Iterator<Item = u32> + '_ {
		(0..self.node_count() as u32).filter(move |&id| id != self.node_id)
	}

	pub fn peer_url(&self, peer_id: u32) -> &str {
		&self.node_urls[peer_id as usize]
	}

	pub fn http_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
		let addr = self
			.http_bind
			.clone()
			.unwrap_or_else(|| self.own_url().to_string());
		addr.parse().map_err(|source| ConfigError::InvalidBindAddr {
			node_id: self.node_id,
			addr,
			source,
		})
	}

	pub fn tick_interval(&self) -> Duration {
		Duration::from_millis(self.tick_interval_ms)
	}

	pub fn strong_op_timeout(&self) -> Duration {
		Duration::from_millis(self.strong_op_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_config() -> Config {
		Config {
			node_id: 1,
			node_urls: vec![
				"127.0.0.1:9000".into(),
				"127.0.0.1:9001".into(),
				"127.0.0.1:9002".into(),
			],
			redis_host: "localhost".into(),
			redis_port: 6379,
			http_bind: None,
			tick_interval_ms: 20,
			strong_op_timeout_ms: 5_000,
			fanout: 1,
			quorum_override: None,
			log_format: LogFormat::Logfmt,
		}
	}

	#[test]
	fn quorum_is_majority_for_odd_and_even_clusters() {
		let mut cfg = sample_config();
		assert_eq!(cfg.quorum(), 2); // N=3 -> 2
		cfg.node_urls.push("127.0.0.1:9003".into());
		assert_eq!(cfg.quorum(), 3); // N=4 -> 3, not 2
	}

	#[test]
	fn quorum_override_wins() {
		let mut cfg = sample_config();
		cfg.quorum_override = Some(1);
		assert_eq!(cfg.quorum(), 1);
	}

	#[test]
	fn peer_ids_excludes_self() {
		let cfg = sample_config();
		assert_eq!(cfg.peer_ids().collect::<Vec<_>>(), vec![0, 2]);
	}

	#[test]
	fn http_bind_defaults_to_own_url() {
		let cfg = sample_config();
		assert_eq!(cfg.http_bind_addr().unwrap().port(), 9001);
	}
}
