// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Inbox watcher.
//!
//! Periodically lists the inbox and drives one swap per candidate artifact.
//! Scans never overlap and never fail as a whole; every candidate gets its
//! own [`CandidateReport`].

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::artifact::{self, ClassificationError, ModuleArtifact};
use super::swap::{ArtifactDisposition, SwapExecutor, SwapOutcome};
use crate::config::{DeployDirs, DirectorySource, HostSettings};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{self, ScanSpan};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay before the first scan.
    pub initial_delay: Duration,
    /// Delay between the end of one scan and the start of the next.
    pub scan_interval: Duration,
    /// Extensions (without dot) treated as artifacts. Case-insensitive.
    pub artifact_extensions: Vec<String>,
    /// File names never processed.
    pub excluded_names: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            scan_interval: Duration::from_secs(10),
            artifact_extensions: vec!["jar".to_string()],
            excluded_names: vec!["README.md".to_string()],
        }
    }
}

impl WatcherConfig {
    pub fn from_settings(settings: &HostSettings) -> Self {
        Self {
            initial_delay: settings.initial_delay,
            scan_interval: settings.scan_interval,
            artifact_extensions: settings.artifact_extensions.clone(),
            excluded_names: settings.excluded_names.clone(),
        }
    }

    /// Whether a file named `name` is a deployment candidate.
    ///
    /// Hidden names (including in-progress uploads) are never candidates.
    pub fn is_candidate(&self, name: &str) -> bool {
        if name.starts_with('.') || self.excluded_names.iter().any(|n| n == name) {
            return false;
        }
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .artifact_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Installed {
        version: String,
    },
    Replaced {
        previous_version: String,
        version: String,
    },
    Failed {
        error: String,
        disposition: ArtifactDisposition,
    },
}

impl CandidateOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CandidateOutcome::Failed { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            CandidateOutcome::Installed { .. } => "installed",
            CandidateOutcome::Replaced { .. } => "replaced",
            CandidateOutcome::Failed { .. } => "failed",
        }
    }
}

impl From<&SwapOutcome> for CandidateOutcome {
    fn from(outcome: &SwapOutcome) -> Self {
        match outcome {
            SwapOutcome::Installed { instance } => CandidateOutcome::Installed {
                version: instance.version.clone(),
            },
            SwapOutcome::Replaced {
                previous, instance, ..
            } => CandidateOutcome::Replaced {
                previous_version: previous.version.clone(),
                version: instance.version.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    pub file: PathBuf,
    /// Known once classification succeeded.
    pub symbolic_name: Option<String>,
    pub outcome: CandidateOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    /// Another scan was running, or shutdown has begun.
    Skipped,
    /// The inbox could not be listed; retried next run.
    InboxUnavailable(String),
}

impl ScanStatus {
    fn label(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::Skipped => "skipped",
            ScanStatus::InboxUnavailable(_) => "inbox_unavailable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub status: ScanStatus,
    pub candidates: Vec<CandidateReport>,
    /// Entries left untouched by the filter.
    pub ignored: Vec<PathBuf>,
}

impl ScanReport {
    fn new(status: ScanStatus) -> Self {
        Self {
            started_at: Utc::now(),
            status,
            candidates: Vec::new(),
            ignored: Vec::new(),
        }
    }

    pub fn skipped() -> Self {
        Self::new(ScanStatus::Skipped)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CandidateReport> {
        self.candidates.iter().filter(|c| c.outcome.is_failure())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &CandidateReport> {
        self.candidates.iter().filter(|c| !c.outcome.is_failure())
    }
}

/// Resets the scan flag on drop.
struct ScanSlot<'a>(&'a AtomicBool);

impl Drop for ScanSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Scheduled driver of inbox deployments.
pub struct DeploymentWatcher {
    executor: Arc<SwapExecutor>,
    source: DirectorySource,
    config: WatcherConfig,
    shutdown: Arc<ShutdownCoordinator>,
    scanning: AtomicBool,
}

impl DeploymentWatcher {
    pub fn new(
        executor: Arc<SwapExecutor>,
        source: DirectorySource,
        config: WatcherConfig,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            executor,
            source,
            config,
            shutdown,
            scanning: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Directories as they resolve right now.
    pub fn current_dirs(&self) -> DeployDirs {
        self.source.resolve()
    }

    /// Run one pass over the inbox.
    pub async fn scan_once(&self) -> ScanReport {
        let Some(_work) = self.shutdown.track() else {
            telemetry::record_scan("skipped");
            return ScanReport::skipped();
        };
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("scan already in progress, skipping");
            telemetry::record_scan("skipped");
            return ScanReport::skipped();
        }
        let _slot = ScanSlot(&self.scanning);

        let dirs = self.source.resolve();
        let span = ScanSpan::new(&dirs.inbox);
        let report = self.scan_inbox(&dirs).instrument(span.clone()).await;

        span.record("candidates", report.candidates.len() as u64);
        span.record("failed", report.failed().count() as u64);
        telemetry::record_scan(report.status.label());
        report
    }

    async fn scan_inbox(&self, dirs: &DeployDirs) -> ScanReport {
        let mut report = ScanReport::new(ScanStatus::Completed);

        let entries = match list_entries(&dirs.inbox).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(inbox = %dirs.inbox.display(), error = %e, "cannot list inbox");
                report.status = ScanStatus::InboxUnavailable(e.to_string());
                return report;
            }
        };

        let cancel = self.shutdown.token();
        for (path, is_file) in entries {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if !is_file || !self.config.is_candidate(name) {
                report.ignored.push(path);
                continue;
            }
            if cancel.is_cancelled() {
                tracing::info!(file = %path.display(), "shutdown in progress, leaving candidate for later");
                break;
            }
            report.candidates.push(self.process(&path, dirs).await);
        }

        if !report.candidates.is_empty() {
            tracing::info!(
                candidates = report.candidates.len(),
                failed = report.failed().count(),
                "scan finished"
            );
        }
        report
    }

    async fn process(&self, path: &Path, dirs: &DeployDirs) -> CandidateReport {
        let candidate = match classify_blocking(path).await {
            Ok(candidate) => candidate,
            Err(e) => return self.reject(path, e).await,
        };

        tracing::info!(
            file = %path.display(),
            module = %candidate.symbolic_name,
            version = %candidate.version,
            category = %candidate.category,
            "deploying"
        );

        let outcome = match self.executor.deploy(&candidate, dirs).await {
            Ok(outcome) => CandidateOutcome::from(&outcome),
            Err(e) => {
                let disposition = e.disposition();
                tracing::error!(
                    module = %candidate.symbolic_name,
                    error = %e,
                    disposition = disposition.as_str(),
                    "deployment failed"
                );
                CandidateOutcome::Failed {
                    error: e.to_string(),
                    disposition,
                }
            }
        };
        telemetry::record_candidate(outcome.label(), candidate.category.as_str());

        CandidateReport {
            file: path.to_path_buf(),
            symbolic_name: Some(candidate.symbolic_name),
            outcome,
        }
    }

    async fn reject(&self, path: &Path, error: ClassificationError) -> CandidateReport {
        let disposition = if error.is_corrupt() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    telemetry::record_artifact_removed("corrupt");
                    ArtifactDisposition::Removed
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "failed to delete corrupt artifact");
                    ArtifactDisposition::Retained
                }
            }
        } else {
            ArtifactDisposition::Retained
        };

        tracing::warn!(
            file = %path.display(),
            error = %error,
            disposition = disposition.as_str(),
            "classification failed"
        );
        telemetry::record_candidate("failed", "unknown");

        CandidateReport {
            file: path.to_path_buf(),
            symbolic_name: None,
            outcome: CandidateOutcome::Failed {
                error: error.to_string(),
                disposition,
            },
        }
    }

    /// Reinstall and start artifacts already in the destination directories
    /// whose identity is not installed. Used once at startup.
    pub async fn recover(&self) -> Vec<CandidateReport> {
        let dirs = self.source.resolve();
        let registry = self.executor.registry();
        let mut reports = Vec::new();

        for (category, dir) in dirs.destinations() {
            let entries = match list_entries(dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "skipping recovery of missing directory");
                    continue;
                }
            };

            for (path, is_file) in entries {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if !is_file || !self.config.is_candidate(name) {
                    continue;
                }
                let artifact = match classify_blocking(&path).await {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "cannot recover artifact");
                        continue;
                    }
                };
                if artifact.category != category {
                    tracing::warn!(
                        file = %path.display(),
                        expected = %category,
                        actual = %artifact.category,
                        "artifact found in another category's directory"
                    );
                }

                let _guard = registry.lock_identity(&artifact.symbolic_name).await;
                if registry.lookup(&artifact.symbolic_name).await.is_some() {
                    continue;
                }
                let outcome = match registry.install(&path).await {
                    Ok(instance) => match registry.start(&instance).await {
                        Ok(()) => CandidateOutcome::Installed {
                            version: instance.version.clone(),
                        },
                        Err(e) => CandidateOutcome::Failed {
                            error: e.to_string(),
                            disposition: ArtifactDisposition::Installed,
                        },
                    },
                    Err(e) => CandidateOutcome::Failed {
                        error: e.to_string(),
                        disposition: ArtifactDisposition::Retained,
                    },
                };
                tracing::info!(module = %artifact.symbolic_name, outcome = outcome.label(), "recovered");
                reports.push(CandidateReport {
                    file: path,
                    symbolic_name: Some(artifact.symbolic_name),
                    outcome,
                });
            }
        }
        reports
    }

    /// Scan on schedule until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            initial_delay_secs = self.config.initial_delay.as_secs(),
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "deployment watcher started"
        );

        if !sleep_or_cancel(self.config.initial_delay, &cancel).await {
            return;
        }
        loop {
            self.scan_once().await;
            if !sleep_or_cancel(self.config.scan_interval, &cancel).await {
                break;
            }
        }
        tracing::info!("deployment watcher stopped");
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// Returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Directory entries sorted by name, with whether each is a regular file.
/// Symlinks are followed; dangling links count as non-files.
async fn list_entries(dir: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let is_file = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                false
            }
        };
        entries.push((path, is_file));
    }
    entries.sort();
    Ok(entries)
}

async fn classify_blocking(path: &Path) -> Result<ModuleArtifact, ClassificationError> {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || artifact::classify(&owned)).await {
        Ok(result) => result,
        Err(e) => Err(ClassificationError::Unreadable {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        }),
    }
}
