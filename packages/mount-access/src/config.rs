//! Process configuration.
//!
//! Parsed once at startup from flags and environment variables, then shared
//! read-only with every component.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ops_support::LogFormat;

pub const DEFAULT_BASE_PATH: &str = "/mnt/dump";

/// How access to a mount is granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OwnershipPolicy {
    /// Hand the tree to the user with `chown -R user:user`.
    #[default]
    Chown,
    /// Make the tree world-writable with `chmod -R 777`. For filesystems
    /// without per-user ownership, such as NFS volumes.
    Chmod,
}

impl fmt::Display for OwnershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chown => f.write_str("chown"),
            Self::Chmod => f.write_str("chmod"),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,

    #[error("mount base path must not be empty")]
    EmptyBasePath,
}

/// Mount-access controller - grants tenant applications access to their mounts
#[derive(Parser, Debug, Clone)]
#[command(name = "mount-access-controller")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root directory holding every application mount
    #[arg(long, env = "MOUNT_BASE_PATH", default_value = DEFAULT_BASE_PATH)]
    pub mount_base_path: PathBuf,

    /// How to grant access: chown (local disk) or chmod (NFS)
    #[arg(
        long,
        env = "MOUNT_OWNERSHIP_OP",
        value_enum,
        ignore_case = true,
        default_value_t = OwnershipPolicy::Chown
    )]
    pub ownership_op: OwnershipPolicy,

    /// Shared secret expected in the X-API-Key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Address to listen on
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Kill provisioning commands that run longer than this many seconds
    #[arg(long, env = "COMMAND_TIMEOUT_SECS")]
    pub command_timeout_secs: Option<u64>,

    /// Serialize registrations for the same application
    #[arg(long, env = "SERIALIZE_PER_APP")]
    pub serialize_per_app: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn mount_config(&self) -> Result<MountConfig, ConfigError> {
        MountConfig::new(self.mount_base_path.clone(), self.ownership_op, &self.api_key)
            .map(|config| {
                config
                    .with_command_timeout(self.command_timeout_secs.map(Duration::from_secs))
                    .with_serialize_per_app(self.serialize_per_app)
            })
    }
}

/// Immutable configuration of the mount components.
#[derive(Clone)]
pub struct MountConfig {
    pub base_path: PathBuf,
    pub ownership: OwnershipPolicy,
    pub api_key: String,
    pub command_timeout: Option<Duration>,
    pub serialize_per_app: bool,
}

impl MountConfig {
    pub fn new(
        base_path: impl Into<PathBuf>,
        ownership: OwnershipPolicy,
        api_key: &str,
    ) -> Result<Self, ConfigError> {
        let base_path = base_path.into();
        if base_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBasePath);
        }
        if api_key.is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        Ok(Self {
            base_path,
            ownership,
            api_key: api_key.to_string(),
            command_timeout: None,
            serialize_per_app: false,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_serialize_per_app(mut self, enabled: bool) -> Self {
        self.serialize_per_app = enabled;
        self
    }
}

// Debug output never includes the api key.
impl fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountConfig")
            .field("base_path", &self.base_path)
            .field("ownership", &self.ownership)
            .field("command_timeout", &self.command_timeout)
            .field("serialize_per_app", &self.serialize_per_app)
            .finish_non_exhaustive()
    }
}
