// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Transport-agnostic administrative operations.
//!
//! An HTTP (or any other) front end maps [`AdminError::status_code`] onto its
//! responses. Mutations take the module's identity lock, so they never
//! interleave with a swap of the same module.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::DirectorySource;
use crate::modules::{ModuleInstance, ModuleRegistry};
use crate::shutdown::ShutdownCoordinator;

/// Prefix of in-progress upload files. Leading dot keeps the watcher away.
const UPLOAD_PREFIX: &str = ".upload-";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AdminError {
    pub fn status_code(&self) -> u16 {
        match self {
            AdminError::NotFound(_) => 404,
            AdminError::BadRequest(_) => 400,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AdminError::NotFound(m) | AdminError::BadRequest(m) => m,
        }
    }
}

/// Module as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub id: u64,
    pub name: String,
    /// `Driver-Type` header, when the module declares one.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub module_type: Option<String>,
    pub version: String,
    pub state: String,
}

impl From<&ModuleInstance> for ModuleRecord {
    fn from(m: &ModuleInstance) -> Self {
        Self {
            id: m.id.id(),
            name: m.symbolic_name.clone(),
            module_type: m.driver_type().map(str::to_string),
            version: m.version.clone(),
            state: m.state.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAction {
    Start,
    Stop,
}

impl FromStr for ModuleAction {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ModuleAction::Start),
            "stop" => Ok(ModuleAction::Stop),
            other => Err(AdminError::BadRequest(format!("unsupported action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub file_name: String,
    /// Where the file was stored in the inbox.
    pub stored_path: PathBuf,
    pub size: u64,
    pub content_type: &'static str,
    /// Hex SHA-256 of the stored bytes.
    pub sha256: String,
}

/// Open backing file of an installed module.
#[derive(Debug)]
pub struct ArtifactDownload {
    pub module: String,
    pub path: PathBuf,
    pub file: tokio::fs::File,
    pub size: u64,
    pub content_type: &'static str,
    pub content_disposition: String,
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jar") => "application/java-archive",
        _ => "application/octet-stream",
    }
}

/// Reject anything that is not a plain file name.
fn validate_file_name(name: &str) -> Result<(), AdminError> {
    if name.trim().is_empty() {
        return Err(AdminError::BadRequest("file name is empty".into()));
    }
    if name.contains("..") {
        return Err(AdminError::BadRequest(format!(
            "file name contains invalid path sequence: {}",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(AdminError::BadRequest(format!("invalid file name: {}", name)));
    }
    Ok(())
}

pub struct AdminService {
    registry: Arc<ModuleRegistry>,
    source: DirectorySource,
    shutdown: Arc<ShutdownCoordinator>,
}

impl AdminService {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        source: DirectorySource,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            registry,
            source,
            shutdown,
        }
    }

    pub async fn list_modules(&self) -> Vec<ModuleRecord> {
        self.registry
            .list_instances()
            .await
            .iter()
            .map(ModuleRecord::from)
            .collect()
    }

    pub async fn get_module(&self, name: &str) -> Result<ModuleRecord, AdminError> {
        self.find(name).await.map(|m| ModuleRecord::from(&m))
    }

    pub async fn perform_action(&self, name: &str, action: &str) -> Result<ModuleRecord, AdminError> {
        let action: ModuleAction = action.parse()?;
        let _work = self.accepting()?;
        let _guard = self.registry.lock_identity(name).await;
        let instance = self.find(name).await?;

        let result = match action {
            ModuleAction::Start => self.registry.start(&instance).await,
            ModuleAction::Stop => self.registry.stop(&instance).await,
        };
        result.map_err(|e| {
            tracing::warn!(module = %instance.symbolic_name, ?action, error = %e, "admin action failed");
            AdminError::BadRequest(e.to_string())
        })?;
        tracing::info!(module = %instance.symbolic_name, ?action, "admin action applied");

        let current = self.registry.refresh(&instance).await.unwrap_or(instance);
        Ok(ModuleRecord::from(&current))
    }

    /// Stop, uninstall and delete the backing file of `name`.
    ///
    /// A backing file that is already gone is not an error.
    pub async fn uninstall_module(&self, name: &str) -> Result<(), AdminError> {
        let _work = self.accepting()?;
        let _guard = self.registry.lock_identity(name).await;
        let instance = self.find(name).await?;

        self.registry
            .stop(&instance)
            .await
            .map_err(|e| AdminError::BadRequest(e.to_string()))?;
        self.registry
            .uninstall(&instance)
            .await
            .map_err(|e| AdminError::BadRequest(e.to_string()))?;

        match tokio::fs::remove_file(&instance.location).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %instance.location.display(), "backing file already gone");
            }
            Err(e) => {
                tracing::warn!(path = %instance.location.display(), error = %e, "failed to delete backing file");
                return Err(AdminError::BadRequest(format!(
                    "module uninstalled but file could not be deleted: {}",
                    e
                )));
            }
        }
        tracing::info!(module = %instance.symbolic_name, "uninstalled by administrator");
        Ok(())
    }

    /// Store an uploaded artifact in the inbox.
    ///
    /// The bytes land in a hidden temp file first and are renamed into place,
    /// so a scan never sees a partial artifact.
    pub async fn accept_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, AdminError> {
        validate_file_name(file_name)?;
        let _work = self.accepting()?;

        let inbox = self.source.resolve().inbox;
        let target = inbox.join(file_name);
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len() as u64;

        let stored = target.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&inbox)?;
            let mut tmp = tempfile::Builder::new()
                .prefix(UPLOAD_PREFIX)
                .tempfile_in(&inbox)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&stored).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| AdminError::BadRequest(format!("upload task failed: {}", e)))?
        .map_err(|e| {
            tracing::warn!(file = %file_name, error = %e, "upload failed");
            AdminError::BadRequest(format!("could not store file {}: {}", file_name, e))
        })?;

        tracing::info!(file = %file_name, size, "upload stored in inbox");
        Ok(UploadReceipt {
            file_name: file_name.to_string(),
            content_type: content_type_for(&target),
            stored_path: target,
            size,
            sha256,
        })
    }

    /// Store several uploads. Stops at the first failure; earlier files stay.
    pub async fn accept_uploads(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<UploadReceipt>, AdminError> {
        let mut receipts = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            receipts.push(self.accept_upload(&name, bytes).await?);
        }
        Ok(receipts)
    }

    /// Open the backing artifact of module `name`.
    pub async fn download_artifact(&self, name: &str) -> Result<ArtifactDownload, AdminError> {
        let instance = self.find(name).await?;
        let not_found = || AdminError::NotFound(format!("file not found for module {}", name));

        let file = tokio::fs::File::open(&instance.location)
            .await
            .map_err(|_| not_found())?;
        let metadata = file.metadata().await.map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let file_name = instance
            .location
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&instance.symbolic_name)
            .to_string();

        Ok(ArtifactDownload {
            module: instance.symbolic_name.clone(),
            content_type: content_type_for(&instance.location),
            content_disposition: format!("attachment; filename=\"{}\"", file_name),
            size: metadata.len(),
            path: instance.location,
            file,
        })
    }

    async fn find(&self, name: &str) -> Result<ModuleInstance, AdminError> {
        self.registry
            .lookup(name)
            .await
            .ok_or_else(|| AdminError::NotFound(format!("module not found: {}", name)))
    }

    fn accepting(&self) -> Result<crate::shutdown::ShutdownGuard, AdminError> {
        self.shutdown
            .track()
            .ok_or_else(|| AdminError::BadRequest("host is shutting down".into()))
    }
}
