//! Mount provisioning and readiness checks.
//!
//! Registration creates `{base}/{appName}/heap` and then grants access
//! according to the configured [`OwnershipPolicy`]:
//!
//! ```text
//! chown:  mkdir -p {base}/{app}/heap
//!         chown -R {user}:{user} {base}/{app}
//!         chown -R {user}:{user} {base}/{app}/heap
//!
//! chmod:  mkdir -p {base}/{app}/heap
//!         chmod -R 777 {base}/{app}
//!         chmod -R 777 {base}/{app}/heap
//! ```
//!
//! The first failing command aborts registration. Nothing is rolled back, so a
//! failed chown leaves the directories in place with their previous owner.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use nix::errno::Errno;
use tokio::sync::Mutex as AsyncMutex;
use nix::unistd::{access, AccessFlags};

use crate::config::{MountConfig, OwnershipPolicy};
use crate::error::ProvisionError;
use crate::executor::CommandExecutor;
use crate::layout::{validate_user_id, MountPaths};

/// Outcome of inspecting a mount.
///
/// Only [`Readiness::Ready`] counts as ready; the other variants say why not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The heap directory does not exist (or the app name cannot exist).
    NotProvisioned,
    /// Chown policy: the heap directory belongs to someone else.
    OwnerMismatch { owner: u32 },
    /// Chmod policy: this process cannot write to the heap directory.
    NotWritable,
    /// Inspecting the heap directory failed.
    InspectionFailed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Provisions and inspects application mounts below the configured base path.
pub struct MountService {
    config: Arc<MountConfig>,
    executor: Arc<dyn CommandExecutor>,
    app_locks: Option<AppLocks>,
}

impl MountService {
    pub fn new(config: Arc<MountConfig>, executor: Arc<dyn CommandExecutor>) -> Self {
        let app_locks = config.serialize_per_app.then(AppLocks::default);
        Self {
            config,
            executor,
            app_locks,
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Create the mount directories for `app_name` and grant `user_id` access.
    pub async fn register_mount(&self, app_name: &str, user_id: &str) -> Result<(), ProvisionError> {
        tracing::info!(
            app_name,
            user_id,
            op = %self.config.ownership,
            "registering mount"
        );

        validate_user_id(user_id)?;
        let paths = MountPaths::resolve(&self.config.base_path, app_name)?;

        let Some(locks) = &self.app_locks else {
            return self.provision(app_name, user_id, &paths).await;
        };

        let lock = locks.lock_for(app_name);
        let result = {
            let _guard = lock.lock().await;
            self.provision(app_name, user_id, &paths).await
        };
        drop(lock);
        locks.prune(app_name);
        result
    }

    async fn provision(
        &self,
        app_name: &str,
        user_id: &str,
        paths: &MountPaths,
    ) -> Result<(), ProvisionError> {
        self.run(&["mkdir", "-p", &path_arg(&paths.heap)]).await?;

        match self.config.ownership {
            OwnershipPolicy::Chmod => {
                tracing::info!(app_name, "using chmod mode for NFS compatibility");
                for path in [&paths.app, &paths.heap] {
                    self.run(&["chmod", "-R", "777", &path_arg(path)]).await?;
                }
            }
            OwnershipPolicy::Chown => {
                tracing::info!(app_name, "using chown mode");
                let owner = format!("{user_id}:{user_id}");
                for path in [&paths.app, &paths.heap] {
                    self.run(&["chown", "-R", &owner, &path_arg(path)]).await?;
                }
            }
        }

        tracing::info!(app_name, "successfully registered mount");
        Ok(())
    }

    /// Whether the mount for `app_name` is provisioned for `user_id`.
    ///
    /// Never fails; inspection errors read as "not ready".
    pub fn is_mount_ready(&self, app_name: &str, user_id: &str) -> bool {
        self.check_readiness(app_name, user_id).is_ready()
    }

    /// Inspect the heap directory of `app_name`.
    pub fn check_readiness(&self, app_name: &str, user_id: &str) -> Readiness {
        tracing::info!(
            app_name,
            user_id,
            op = %self.config.ownership,
            "checking mount readiness"
        );

        let paths = match MountPaths::resolve(&self.config.base_path, app_name) {
            Ok(paths) => paths,
            Err(err) => {
                tracing::warn!(app_name, error = %err, "rejecting readiness check");
                return Readiness::NotProvisioned;
            }
        };

        let metadata = match fs::metadata(&paths.heap) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(heap_path = %paths.heap.display(), "heap path does not exist");
                return Readiness::NotProvisioned;
            }
            Err(err) => {
                tracing::error!(
                    heap_path = %paths.heap.display(),
                    error = %err,
                    "error checking mount readiness"
                );
                return Readiness::InspectionFailed(err.to_string());
            }
        };

        let readiness = match self.config.ownership {
            OwnershipPolicy::Chmod => writable(&paths.heap),
            OwnershipPolicy::Chown => {
                let owner = metadata.uid();
                if owner.to_string() == user_id {
                    Readiness::Ready
                } else {
                    Readiness::OwnerMismatch { owner }
                }
            }
        };

        tracing::info!(
            app_name,
            user_id,
            op = %self.config.ownership,
            ready = readiness.is_ready(),
            ?readiness,
            "mount ready check"
        );
        readiness
    }

    async fn run(&self, argv: &[&str]) -> Result<(), ProvisionError> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.executor.run(&argv).await?;
        Ok(())
    }
}

fn writable(path: &Path) -> Readiness {
    match access(path, AccessFlags::W_OK) {
        Ok(()) => Readiness::Ready,
        Err(Errno::EACCES | Errno::EROFS | Errno::EPERM) => Readiness::NotWritable,
        Err(errno) => {
            tracing::error!(path = %path.display(), error = %errno, "access check failed");
            Readiness::InspectionFailed(errno.to_string())
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// One mutex per application name, created on first use.
///
/// An entry lives only while some registration for that app holds or waits
/// on it, so the map stays bounded by the number of in-flight apps.
#[derive(Default)]
struct AppLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AppLocks {
    fn lock_for(&self, app_name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(app_name.to_string()).or_default().clone()
    }

    /// Drop the entry for `app_name` once nobody else references it.
    fn prune(&self, app_name: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(app_name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(app_name);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
