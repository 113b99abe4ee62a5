//! Redis container fixtures

use cluster_sessions_core::RedisBackend;
use cluster_sessions_core::config::RedisSettings;
use rstest::*;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

pub use testcontainers::{ContainerAsync, GenericImage};

/// Image tag used when `CLUSTER_SESSIONS_TEST_REDIS_TAG` is not set
pub const DEFAULT_REDIS_TAG: &str = "7-alpine";

const REDIS_PORT: u16 = 6379;
const START_ATTEMPTS: u32 = 3;
const START_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Fixture providing a throwaway Redis server
///
/// Returns the container (keep it alive for the duration of the test) and
/// [`RedisSettings`] pointing at its mapped port. Starting is retried a few
/// times since Docker occasionally fails to bring a container up.
///
/// # Examples
///
/// ```no_run
/// use cluster_sessions_core::SessionManager;
/// use cluster_sessions_core::SessionConfig;
/// use cluster_sessions_core::config::RedisSettings;
/// use cluster_sessions_test::fixtures::{ContainerAsync, GenericImage, redis_container};
/// use rstest::*;
///
/// #[rstest]
/// #[tokio::test]
/// async fn test_with_redis(
///     #[future] redis_container: (ContainerAsync<GenericImage>, RedisSettings),
/// ) {
///     let (_container, settings) = redis_container.await;
///     let manager = SessionManager::from_config(SessionConfig::default().with_redis(settings));
///     assert!(manager.is_ok());
/// }
/// ```
#[fixture]
pub async fn redis_container() -> (ContainerAsync<GenericImage>, RedisSettings) {
	let tag = std::env::var("CLUSTER_SESSIONS_TEST_REDIS_TAG")
		.unwrap_or_else(|_| DEFAULT_REDIS_TAG.to_string());

	let mut attempt = 1;
	loop {
		match start_redis(&tag).await {
			Ok(started) => return started,
			Err(e) if attempt < START_ATTEMPTS => {
				tracing::warn!(attempt, tag = %tag, error = %e, "Redis container failed to start; retrying");
				attempt += 1;
				tokio::time::sleep(START_RETRY_DELAY).await;
			}
			Err(e) => panic!("Redis {tag} did not start after {START_ATTEMPTS} attempts: {e}"),
		}
	}
}

async fn start_redis(
	tag: &str,
) -> Result<(ContainerAsync<GenericImage>, RedisSettings), testcontainers::TestcontainersError> {
	let container = GenericImage::new("redis", tag)
		.with_exposed_port(REDIS_PORT.tcp())
		.with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
		.start()
		.await?;

	let settings = RedisSettings {
		host: container.get_host().await?.to_string(),
		port: container.get_host_port_ipv4(REDIS_PORT).await?,
		..RedisSettings::default()
	};
	tracing::debug!(host = %settings.host, port = settings.port, "Redis container ready");

	Ok((container, settings))
}

/// Fixture providing a [`RedisBackend`] connected to a fresh container
///
/// The pool is built with a short wait bound so pool-exhaustion tests finish
/// quickly.
#[fixture]
pub async fn redis_backend(
	#[future] redis_container: (ContainerAsync<GenericImage>, RedisSettings),
) -> (ContainerAsync<GenericImage>, RedisBackend) {
	let (container, mut settings) = redis_container.await;
	settings.pool.wait_timeout_ms = 500;

	let backend = RedisBackend::from_settings(&settings)
		.unwrap_or_else(|e| panic!("Failed to build Redis backend: {}", e));

	(container, backend)
}
