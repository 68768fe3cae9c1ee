// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hot-swap of a single module artifact.
//!
//! Runs the ordered replace sequence for one candidate:
//! await idle, stop, uninstall, move, install, delete superseded file, start.
//! No step is retried; a failure ends the sequence for this candidate only
//! and reports what happened to the candidate file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::artifact::ModuleArtifact;
use super::container::ModuleInstance;
use super::quiescence::{QuiescenceController, QuiescenceError};
use super::registry::{IdentityGuard, InstallError, LifecycleError, ModuleRegistry};
use crate::config::DeployDirs;
use crate::telemetry::{self, SpanExt, SwapSpan};

/// Installed instance being replaced, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existing {
    Present(ModuleInstance),
    Absent,
}

impl Existing {
    pub fn as_instance(&self) -> Option<&ModuleInstance> {
        match self {
            Existing::Present(instance) => Some(instance),
            Existing::Absent => None,
        }
    }
}

impl From<Option<ModuleInstance>> for Existing {
    fn from(value: Option<ModuleInstance>) -> Self {
        match value {
            Some(instance) => Existing::Present(instance),
            None => Existing::Absent,
        }
    }
}

/// What became of the candidate file after a failed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDisposition {
    /// Still in the inbox; the next scan retries it.
    Retained,
    /// Deleted so it is not re-processed.
    Removed,
    /// Installed but not started.
    Installed,
}

impl ArtifactDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactDisposition::Retained => "retained",
            ArtifactDisposition::Removed => "removed",
            ArtifactDisposition::Installed => "installed",
        }
    }
}

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Quiescence wait failed: {0}")]
    Quiescence(#[from] QuiescenceError),

    #[error("Stop of existing module failed: {0}")]
    Stop(#[source] LifecycleError),

    #[error("Uninstall of existing module failed: {0}")]
    Uninstall(#[source] LifecycleError),

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Install failed: {source}")]
    Install {
        #[source]
        source: InstallError,
        /// Whether the moved artifact was deleted.
        removed: bool,
    },

    #[error("Start of new module failed: {0}")]
    Start(#[source] LifecycleError),
}

impl SwapError {
    pub fn disposition(&self) -> ArtifactDisposition {
        match self {
            SwapError::Quiescence(_)
            | SwapError::Stop(_)
            | SwapError::Uninstall(_)
            | SwapError::Move { .. } => ArtifactDisposition::Retained,
            // Gone from the inbox even when deleting the moved copy failed.
            SwapError::Install { .. } => ArtifactDisposition::Removed,
            SwapError::Start(_) => ArtifactDisposition::Installed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// No previous instance existed.
    Installed { instance: ModuleInstance },
    /// A previous instance was replaced.
    Replaced {
        previous: ModuleInstance,
        instance: ModuleInstance,
        waited: Duration,
        removed_files: Vec<PathBuf>,
    },
}

impl SwapOutcome {
    pub fn instance(&self) -> &ModuleInstance {
        match self {
            SwapOutcome::Installed { instance } | SwapOutcome::Replaced { instance, .. } => instance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapOutcome::Installed { .. } => "installed",
            SwapOutcome::Replaced { .. } => "replaced",
        }
    }
}

/// Executes swaps against the registry.
pub struct SwapExecutor {
    registry: Arc<ModuleRegistry>,
    quiescence: QuiescenceController,
    cancel: CancellationToken,
}

impl SwapExecutor {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        quiescence: QuiescenceController,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            quiescence,
            cancel,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Lock the candidate's identity, look up the instance it replaces and swap.
    pub async fn deploy(
        &self,
        candidate: &ModuleArtifact,
        dirs: &DeployDirs,
    ) -> Result<SwapOutcome, SwapError> {
        let guard = self.registry.lock_identity(&candidate.symbolic_name).await;
        let existing = Existing::from(self.registry.find_by_name(&candidate.symbolic_name).await);
        self.swap(&guard, candidate, existing, dirs).await
    }

    /// Run the replace sequence. The caller holds the identity lock.
    pub async fn swap(
        &self,
        guard: &IdentityGuard,
        candidate: &ModuleArtifact,
        existing: Existing,
        dirs: &DeployDirs,
    ) -> Result<SwapOutcome, SwapError> {
        debug_assert!(guard.name().eq_ignore_ascii_case(&candidate.symbolic_name));

        let span = SwapSpan::new(&candidate.symbolic_name, &candidate.version, &candidate.path);
        let started = Instant::now();

        let result = self
            .run(candidate, existing, dirs)
            .instrument(span.clone())
            .await;

        span.record_result(&result);
        span.record("duration_ms", started.elapsed().as_millis() as u64);
        if let Ok(outcome) = &result {
            span.record("outcome", outcome.as_str());
        }
        telemetry::record_swap_duration(started.elapsed());
        result
    }

    async fn run(
        &self,
        candidate: &ModuleArtifact,
        existing: Existing,
        dirs: &DeployDirs,
    ) -> Result<SwapOutcome, SwapError> {
        let mut waited = Duration::ZERO;

        if let Existing::Present(previous) = &existing {
            let outcome = self.quiescence.await_idle(previous, &self.cancel).await?;
            waited = outcome.waited();
            telemetry::record_quiescence_wait(waited);

            self.registry.stop(previous).await.map_err(SwapError::Stop)?;
            tracing::info!(module = %previous.symbolic_name, version = %previous.version, "stopped previous version");

            self.registry.uninstall(previous).await.map_err(SwapError::Uninstall)?;
            tracing::info!(module = %previous.symbolic_name, "uninstalled previous version");
        }

        let destination = destination_path(candidate, dirs);
        move_artifact(&candidate.path, &destination)
            .await
            .map_err(|source| SwapError::Move {
                from: candidate.path.clone(),
                to: destination.clone(),
                source,
            })?;
        tracing::debug!(to = %destination.display(), "artifact moved");

        let instance = match self.registry.install(&destination).await {
            Ok(instance) => instance,
            Err(source) => {
                let removed = match tokio::fs::remove_file(&destination).await {
                    Ok(()) => {
                        telemetry::record_artifact_removed("install_failed");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(path = %destination.display(), error = %e, "failed to delete rejected artifact");
                        false
                    }
                };
                return Err(SwapError::Install { source, removed });
            }
        };
        tracing::info!(
            module = %instance.symbolic_name,
            version = %instance.version,
            id = %instance.id,
            "installed"
        );

        let removed_files = match &existing {
            Existing::Present(previous) => remove_superseded(previous, &instance).await,
            Existing::Absent => Vec::new(),
        };

        self.registry.start(&instance).await.map_err(SwapError::Start)?;
        tracing::info!(module = %instance.symbolic_name, version = %instance.version, "started");

        // Reflect the post-start state.
        let instance = self.registry.refresh(&instance).await.unwrap_or(instance);

        Ok(match existing {
            Existing::Present(previous) => SwapOutcome::Replaced {
                previous,
                instance,
                waited,
                removed_files,
            },
            Existing::Absent => SwapOutcome::Installed { instance },
        })
    }
}

fn destination_path(candidate: &ModuleArtifact, dirs: &DeployDirs) -> PathBuf {
    let dir = dirs.destination_for(candidate.category);
    match candidate.path.file_name() {
        Some(name) => dir.join(name),
        None => dir.join(format!("{}-{}.jar", candidate.symbolic_name, candidate.version)),
    }
}

/// Delete the previous backing file when the new install superseded it.
///
/// A version change at the same path was already overwritten by the move, so
/// only a differing location leaves a file behind. Never deletes the file now
/// backing `current`.
async fn remove_superseded(previous: &ModuleInstance, current: &ModuleInstance) -> Vec<PathBuf> {
    let old = &previous.location;
    if same_file(old, &current.location) || !old.exists() {
        if previous.version != current.version {
            tracing::debug!(path = %old.display(), "previous version overwritten in place");
        }
        return Vec::new();
    }

    match tokio::fs::remove_file(old).await {
        Ok(()) => {
            tracing::info!(path = %old.display(), "deleted superseded artifact");
            telemetry::record_artifact_removed("superseded");
            vec![old.clone()]
        }
        Err(e) => {
            tracing::warn!(path = %old.display(), error = %e, "failed to delete superseded artifact");
            Vec::new()
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move `from` to `to`, replacing any existing file.
///
/// Falls back to copy and delete when the two paths are on different devices.
pub(crate) async fn move_artifact(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
        #[cfg(windows)]
        Err(e) if replace_refused(&e) && to.is_file() && from.is_file() => {
            tracing::debug!(error = %e, "rename refused, replacing destination");
            tokio::fs::remove_file(to).await?;
            tokio::fs::rename(from, to).await
        }
        Err(e) => Err(e),
    }
}

/// Windows refuses to rename over a file that is open or read-only.
#[cfg(windows)]
fn replace_refused(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::artifact::ModuleCategory;

    #[test]
    fn test_existing_from_option() {
        assert_eq!(Existing::from(None), Existing::Absent);
        assert!(Existing::Absent.as_instance().is_none());
    }

    #[test]
    fn test_destination_by_category() {
        let dirs = DeployDirs::under(Path::new("/srv"));
        let mut candidate = ModuleArtifact {
            path: PathBuf::from("/srv/deploy/driverA-v1.jar"),
            symbolic_name: "driverA".into(),
            version: "1.0".into(),
            category: ModuleCategory::Custom,
        };
        assert_eq!(
            destination_path(&candidate, &dirs),
            PathBuf::from("/srv/modules/custom/driverA-v1.jar")
        );
        candidate.category = ModuleCategory::Service;
        assert_eq!(
            destination_path(&candidate, &dirs),
            PathBuf::from("/srv/modules/service/driverA-v1.jar")
        );
    }

    #[test]
    fn test_disposition_mapping() {
        let err = SwapError::Quiescence(QuiescenceError::Cancelled("a".into()));
        assert_eq!(err.disposition(), ArtifactDisposition::Retained);

        let err = SwapError::Move {
            from: "a".into(),
            to: "b".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.disposition(), ArtifactDisposition::Retained);

        let err = SwapError::Start(LifecycleError::StillActive("a".into()));
        assert_eq!(err.disposition(), ArtifactDisposition::Installed);
    }

    #[tokio::test]
    async fn test_move_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("in.jar");
        let to = dir.path().join("out").join("in.jar");
        std::fs::create_dir_all(to.parent().unwrap()).unwrap();
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old").unwrap();

        move_artifact(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_artifact(&dir.path().join("gone.jar"), &dir.path().join("x.jar"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_move_keeps_destination() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be renamed over a file.
        let from = dir.path().join("in.jar");
        std::fs::create_dir(&from).unwrap();
        let to = dir.path().join("out.jar");
        std::fs::write(&to, b"installed").unwrap();

        assert!(move_artifact(&from, &to).await.is_err());
        assert_eq!(std::fs::read(&to).unwrap(), b"installed");
        assert!(from.is_dir());
    }
}
