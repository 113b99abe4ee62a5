//! Session manager configuration
//!
//! Settings can be built programmatically, parsed from TOML, and overridden
//! from `CLUSTER_SESSIONS_*` environment variables.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::SessionConfig;
//!
//! let config = SessionConfig::from_toml_str(
//!     r#"
//!     max_inactive_interval_secs = 600
//!
//!     [redis]
//!     host = "sessions.internal"
//!     database = 2
//!
//!     [manual_dirty_tracking]
//!     enabled = true
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.max_inactive_interval_secs, 600);
//! assert_eq!(config.redis.connection_url(), "redis://sessions.internal:6379/2");
//! assert_eq!(config.manual_dirty_tracking.key, "__changed__");
//! ```

use crate::error::{Result, SessionError};
use crate::serialization::SerializationFormat;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default session inactivity timeout: 30 minutes
pub const DEFAULT_MAX_INACTIVE_INTERVAL_SECS: i64 = 30 * 60;

/// Default attribute key used as the manual dirty marker
pub const DEFAULT_MANUAL_DIRTY_TRACKING_KEY: &str = "__changed__";

/// Default bound on id reservation retries
pub const DEFAULT_MAX_RESERVE_ATTEMPTS: u32 = 16;

/// Prefix of environment variables read by [`SessionConfig::apply_env_overrides`]
pub const ENV_PREFIX: &str = "CLUSTER_SESSIONS_";

/// Side-band dirty signal settings
///
/// When enabled, setting an attribute named `key` marks the session dirty
/// without storing anything under that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualDirtyTracking {
	pub enabled: bool,
	pub key: String,
}

impl ManualDirtyTracking {
	pub fn enabled_with_key(key: impl Into<String>) -> Self {
		Self {
			enabled: true,
			key: key.into(),
		}
	}

	/// Whether `key` is the marker channel rather than real session data
	pub fn is_marker(&self, key: &str) -> bool {
		self.enabled && self.key == key
	}
}

impl Default for ManualDirtyTracking {
	fn default() -> Self {
		Self {
			enabled: false,
			key: DEFAULT_MANUAL_DIRTY_TRACKING_KEY.to_string(),
		}
	}
}

/// Connection pool knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
	/// Maximum number of pooled connections
	pub max_size: usize,
	/// How long a caller waits for a free connection before failing
	pub wait_timeout_ms: u64,
	/// How long recycling (health-checking) a returned connection may take
	pub recycle_timeout_ms: u64,
}

impl PoolSettings {
	pub fn wait_timeout(&self) -> Duration {
		Duration::from_millis(self.wait_timeout_ms)
	}

	pub fn recycle_timeout(&self) -> Duration {
		Duration::from_millis(self.recycle_timeout_ms)
	}
}

impl Default for PoolSettings {
	fn default() -> Self {
		Self {
			max_size: 16,
			wait_timeout_ms: 5_000,
			recycle_timeout_ms: 5_000,
		}
	}
}

/// Key-value backend connection settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
	pub host: String,
	pub port: u16,
	pub database: i64,
	pub password: Option<String>,
	pub connection_timeout_ms: u64,
	pub pool: PoolSettings,
}

impl RedisSettings {
	/// Connection URL including credentials and database index
	///
	/// The password is percent-encoded, so any character is allowed in it.
	///
	/// # Examples
	///
	/// ```
	/// use cluster_sessions_core::config::RedisSettings;
	///
	/// let settings = RedisSettings {
	///     password: Some("s3cret".to_string()),
	///     ..RedisSettings::default()
	/// };
	/// assert_eq!(settings.connection_url(), "redis://:s3cret@localhost:6379/0");
	/// ```
	pub fn connection_url(&self) -> String {
		match self.password.as_deref() {
			Some(password) if !password.is_empty() => format!(
				"redis://:{}@{}:{}/{}",
				utf8_percent_encode(password, NON_ALPHANUMERIC),
				self.host,
				self.port,
				self.database
			),
			_ => format!("redis://{}:{}/{}", self.host, self.port, self.database),
		}
	}

	pub fn connection_timeout(&self) -> Duration {
		Duration::from_millis(self.connection_timeout_ms)
	}
}

impl Default for RedisSettings {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: 6379,
			database: 0,
			password: None,
			connection_timeout_ms: 2_000,
			pool: PoolSettings::default(),
		}
	}
}

impl fmt::Debug for RedisSettings {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RedisSettings")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("database", &self.database)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.field("connection_timeout_ms", &self.connection_timeout_ms)
			.field("pool", &self.pool)
			.finish()
	}
}

/// Configuration for [`SessionManager`](crate::SessionManager)
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	pub redis: RedisSettings,
	/// Inactivity timeout in seconds; also the store TTL. `<= 0` disables expiry.
	pub max_inactive_interval_secs: i64,
	pub manual_dirty_tracking: ManualDirtyTracking,
	pub serializer: SerializationFormat,
	/// Upper bound on candidate ids tried when reserving a new session id
	pub max_reserve_attempts: u32,
	/// Appended to generated ids as `.<route>`
	pub node_route: Option<String>,
	/// Persist every dirtying mutation immediately instead of at request end
	pub write_through: bool,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			redis: RedisSettings::default(),
			max_inactive_interval_secs: DEFAULT_MAX_INACTIVE_INTERVAL_SECS,
			manual_dirty_tracking: ManualDirtyTracking::default(),
			serializer: SerializationFormat::default(),
			max_reserve_attempts: DEFAULT_MAX_RESERVE_ATTEMPTS,
			node_route: None,
			write_through: false,
		}
	}
}

impl SessionConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parse a TOML document; missing keys keep their defaults
	pub fn from_toml_str(source: &str) -> Result<Self> {
		let config: Self =
			toml::from_str(source).map_err(|e| SessionError::InvalidConfig(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	/// Read and parse a TOML file
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|e| {
			SessionError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
		})?;
		Self::from_toml_str(&source)
	}

	/// Apply `CLUSTER_SESSIONS_*` environment variables on top of this config
	pub fn apply_env_overrides(self) -> Result<Self> {
		self.apply_overrides_from(|name| std::env::var(name).ok())
	}

	/// Apply overrides from an arbitrary variable lookup
	///
	/// Recognized names (without the `CLUSTER_SESSIONS_` prefix):
	/// `REDIS_HOST`, `REDIS_PORT`, `REDIS_DATABASE`, `REDIS_PASSWORD`,
	/// `REDIS_TIMEOUT_MS`, `POOL_MAX_SIZE`, `POOL_WAIT_TIMEOUT_MS`,
	/// `MAX_INACTIVE_INTERVAL`, `MANUAL_DIRTY_TRACKING`,
	/// `MANUAL_DIRTY_TRACKING_KEY`, `SERIALIZER`, `NODE_ROUTE`, `WRITE_THROUGH`.
	pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

		if let Some(host) = var("REDIS_HOST") {
			self.redis.host = host;
		}
		if let Some(port) = var("REDIS_PORT") {
			self.redis.port = parse_var("REDIS_PORT", &port)?;
		}
		if let Some(database) = var("REDIS_DATABASE") {
			self.redis.database = parse_var("REDIS_DATABASE", &database)?;
		}
		if let Some(password) = var("REDIS_PASSWORD") {
			self.redis.password = Some(password).filter(|p| !p.is_empty());
		}
		if let Some(timeout) = var("REDIS_TIMEOUT_MS") {
			self.redis.connection_timeout_ms = parse_var("REDIS_TIMEOUT_MS", &timeout)?;
		}
		if let Some(size) = var("POOL_MAX_SIZE") {
			self.redis.pool.max_size = parse_var("POOL_MAX_SIZE", &size)?;
		}
		if let Some(wait) = var("POOL_WAIT_TIMEOUT_MS") {
			self.redis.pool.wait_timeout_ms = parse_var("POOL_WAIT_TIMEOUT_MS", &wait)?;
		}
		if let Some(interval) = var("MAX_INACTIVE_INTERVAL") {
			self.max_inactive_interval_secs = parse_var("MAX_INACTIVE_INTERVAL", &interval)?;
		}
		if let Some(enabled) = var("MANUAL_DIRTY_TRACKING") {
			self.manual_dirty_tracking.enabled = parse_var("MANUAL_DIRTY_TRACKING", &enabled)?;
		}
		if let Some(key) = var("MANUAL_DIRTY_TRACKING_KEY") {
			self.manual_dirty_tracking.key = key;
		}
		if let Some(format) = var("SERIALIZER") {
			self.serializer = format
				.parse()
				.map_err(|e: crate::error::SerializationError| {
					SessionError::InvalidConfig(e.to_string())
				})?;
		}
		if let Some(route) = var("NODE_ROUTE") {
			self.node_route = Some(route).filter(|r| !r.is_empty());
		}
		if let Some(write_through) = var("WRITE_THROUGH") {
			self.write_through = parse_var("WRITE_THROUGH", &write_through)?;
		}

		self.validate()?;
		Ok(self)
	}

	/// Set the inactivity timeout (and store TTL)
	pub fn with_max_inactive_interval(mut self, seconds: i64) -> Self {
		self.max_inactive_interval_secs = seconds;
		self
	}

	pub fn with_manual_dirty_tracking(mut self, key: impl Into<String>) -> Self {
		self.manual_dirty_tracking = ManualDirtyTracking::enabled_with_key(key);
		self
	}

	pub fn with_serializer(mut self, format: SerializationFormat) -> Self {
		self.serializer = format;
		self
	}

	pub fn with_max_reserve_attempts(mut self, attempts: u32) -> Self {
		self.max_reserve_attempts = attempts;
		self
	}

	pub fn with_node_route(mut self, route: impl Into<String>) -> Self {
		self.node_route = Some(route.into());
		self
	}

	pub fn with_write_through(mut self, enabled: bool) -> Self {
		self.write_through = enabled;
		self
	}

	pub fn with_redis(mut self, redis: RedisSettings) -> Self {
		self.redis = redis;
		self
	}

	/// Store TTL derived from the inactivity timeout; `None` means no expiry
	pub fn ttl(&self) -> Option<Duration> {
		ttl_from_interval(self.max_inactive_interval_secs)
	}

	/// Reject settings the manager cannot run with
	pub fn validate(&self) -> Result<()> {
		if self.redis.host.trim().is_empty() {
			return Err(SessionError::InvalidConfig(
				"redis.host must not be empty".to_string(),
			));
		}
		if self.redis.pool.max_size == 0 {
			return Err(SessionError::InvalidConfig(
				"redis.pool.max_size must be at least 1".to_string(),
			));
		}
		if self.max_reserve_attempts == 0 {
			return Err(SessionError::InvalidConfig(
				"max_reserve_attempts must be at least 1".to_string(),
			));
		}
		if self.manual_dirty_tracking.enabled && self.manual_dirty_tracking.key.is_empty() {
			return Err(SessionError::InvalidConfig(
				"manual_dirty_tracking.key must not be empty when enabled".to_string(),
			));
		}
		Ok(())
	}
}

/// Convert an inactivity interval in seconds into a store TTL
pub(crate) fn ttl_from_interval(seconds: i64) -> Option<Duration> {
	u64::try_from(seconds)
		.ok()
		.filter(|s| *s > 0)
		.map(Duration::from_secs)
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
	T: std::str::FromStr,
	T::Err: fmt::Display,
{
	raw.trim().parse().map_err(|e| {
		SessionError::InvalidConfig(format!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e))
	})
}
