//! Mount requests and the directory layout derived from them.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

/// Name of the subdirectory checked for readiness.
pub const HEAP_DIR: &str = "heap";

/// Body of both mount endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub user_id: String,
}

impl MountRequest {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
        }
    }

    /// Check both fields before anything touches the filesystem.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        validate_app_name(&self.app_name)?;
        validate_user_id(&self.user_id)
    }
}

/// `appName` must name exactly one directory below the base path.
pub fn validate_app_name(app_name: &str) -> Result<(), ProvisionError> {
    if app_name.is_empty() {
        return Err(invalid("appName is required"));
    }
    if app_name.contains('\0') {
        return Err(invalid("appName must not contain NUL"));
    }

    let mut components = Path::new(app_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !app_name.contains('/') => Ok(()),
        _ => Err(invalid("appName must be a single path component")),
    }
}

/// `userId` ends up as `user:user` on the chown command line.
pub fn validate_user_id(user_id: &str) -> Result<(), ProvisionError> {
    if user_id.is_empty() {
        return Err(invalid("userId is required"));
    }
    if user_id.starts_with('-') {
        return Err(invalid("userId must not start with '-'"));
    }
    if user_id
        .chars()
        .any(|c| c == ':' || c == '\0' || c.is_whitespace())
    {
        return Err(invalid("userId must not contain ':', NUL or whitespace"));
    }
    Ok(())
}

fn invalid(reason: &str) -> ProvisionError {
    ProvisionError::InvalidRequest(reason.to_string())
}

/// Directories making up one application's mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPaths {
    /// `{base}/{appName}`
    pub app: PathBuf,
    /// `{base}/{appName}/heap`
    pub heap: PathBuf,
}

impl MountPaths {
    /// Derive the paths for `app_name`, rejecting names that would escape `base`.
    pub fn resolve(base: &Path, app_name: &str) -> Result<Self, ProvisionError> {
        validate_app_name(app_name)?;
        let app = base.join(app_name);
        let heap = app.join(HEAP_DIR);
        Ok(Self { app, heap })
    }
}
