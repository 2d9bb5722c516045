//! # ops-support
//!
//! Plumbing shared by the ops services in this workspace.
//!
//! - [`health`] - the unauthenticated `/api/v1/health` namespace
//! - [`logging`] - `tracing` subscriber setup (text or JSON)
//! - [`shutdown`] - graceful shutdown on SIGINT/SIGTERM

pub mod health;
pub mod logging;
pub mod shutdown;

pub use health::{is_exempt, HealthBody, HealthStatus, ACTUATOR_PREFIX, HEALTH_PREFIX};
pub use logging::LogFormat;
