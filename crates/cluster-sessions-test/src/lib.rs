//! # Cluster Sessions Test
//!
//! Testing utilities for cluster-sessions.
//!
//! ## Features
//!
//! - **Fixtures**: rstest fixtures for backends, configs and managers
//! - **Recording Backend**: wraps any backend and counts commands per key
//! - **Scripted Ids**: deterministic id generator for collision scenarios
//! - **Logging**: one-time `tracing` subscriber for test output
//! - **Redis Container** (feature: `testcontainers`): throwaway Redis server

pub mod fixtures;
pub mod ids;
pub mod logging;
pub mod recording;

pub use fixtures::*;
pub use ids::ScriptedIdGenerator;
pub use logging::init_test_logging;
pub use recording::{Command, RecordingBackend};
