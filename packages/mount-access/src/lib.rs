//! # mount-access
//!
//! Grants tenant applications access to their mount directories and reports
//! whether that access is in place.
//!
//! ## HTTP surface
//!
//! ```text
//! POST /api/v1/app/mount/register   {"appName", "userId"}  -> mkdir + chown/chmod
//! POST /api/v1/app/mount/ready      {"appName", "userId"}  -> 200 ready / 401 not_ready
//! GET  /api/v1/health[/ready|/live|/mount]                  -> no API key needed
//! ```
//!
//! Every other path requires `X-API-Key`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mount_access::{app, MountConfig, OwnershipPolicy};
//!
//! let config = MountConfig::new("/mnt/dump", OwnershipPolicy::Chown, "secret")?;
//! let router = app(config);
//! axum::serve(listener, router).await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod layout;
pub mod probe;
pub mod routes;
pub mod service;

use std::sync::Arc;

pub use config::{Args, ConfigError, MountConfig, OwnershipPolicy};
pub use error::{CommandError, ProvisionError};
pub use executor::{CommandExecutor, CommandOutput, ProcessExecutor};
pub use gate::ApiKeyGate;
pub use layout::{MountPaths, MountRequest};
pub use service::{MountService, Readiness};

/// Build the router backed by real OS processes.
pub fn app(config: MountConfig) -> axum::Router {
    let executor = match config.command_timeout {
        Some(timeout) => ProcessExecutor::with_timeout(timeout),
        None => ProcessExecutor::new(),
    };
    let service = MountService::new(Arc::new(config), Arc::new(executor));
    routes::router(Arc::new(service))
}
