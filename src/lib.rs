// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Modhost: hot-swapping module host.
//!
//! Module artifacts dropped into an inbox directory are classified, routed to
//! a category directory, and installed into a module container. A running
//! module with the same identity is replaced only after its driver leaves
//! the `Running` state.
//!
//! # Layout
//!
//! - [`modules`]: classification, registry, quiescence, swap, watcher
//! - [`admin`]: transport-agnostic administrative operations
//! - [`config`]: defaults, TOML file, `MODHOST_*` environment overrides
//! - [`shutdown`]: drain and cancellation on exit

pub mod admin;
pub mod cli;
pub mod config;
pub mod modules;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use tokio::task::JoinHandle;

use admin::AdminService;
use config::{DirectorySource, HostSettings};
use modules::{
    CandidateReport, DeploymentWatcher, ModuleContainer, ModuleRegistry, QuiescenceConfig,
    QuiescenceController, SwapExecutor, TeardownReport, WatcherConfig,
};
use shutdown::{ShutdownCoordinator, ShutdownResult};

/// Result of [`Host::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostShutdown {
    pub drain: ShutdownResult,
    pub teardown: TeardownReport,
}

/// A wired module host.
pub struct Host {
    pub settings: HostSettings,
    pub registry: Arc<ModuleRegistry>,
    pub executor: Arc<SwapExecutor>,
    pub watcher: Arc<DeploymentWatcher>,
    pub admin: AdminService,
    pub shutdown: Arc<ShutdownCoordinator>,
}

impl Host {
    /// Build a host whose directories honour environment overrides at every
    /// scan.
    pub fn new(settings: HostSettings, container: Arc<dyn ModuleContainer>) -> Self {
        let source = DirectorySource::Environment(settings.dirs.clone());
        Self::with_directory_source(settings, container, source)
    }

    pub fn with_directory_source(
        settings: HostSettings,
        container: Arc<dyn ModuleContainer>,
        source: DirectorySource,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ModuleRegistry::new(container));

        let quiescence = QuiescenceController::new(
            registry.clone(),
            QuiescenceConfig {
                poll_interval: settings.poll_interval,
                max_wait: settings.quiescence_timeout,
            },
        );
        let executor = Arc::new(SwapExecutor::new(
            registry.clone(),
            quiescence,
            shutdown.token(),
        ));
        let watcher = Arc::new(DeploymentWatcher::new(
            executor.clone(),
            source.clone(),
            WatcherConfig::from_settings(&settings),
            shutdown.clone(),
        ));
        let admin = AdminService::new(registry.clone(), source, shutdown.clone());

        Self {
            settings,
            registry,
            executor,
            watcher,
            admin,
            shutdown,
        }
    }

    /// Start the scheduled watcher. It stops when shutdown begins.
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        self.watcher.clone().spawn(self.shutdown.token())
    }

    /// Reinstall artifacts already present in the destination directories.
    pub async fn recover(&self) -> Vec<CandidateReport> {
        self.watcher.recover().await
    }

    /// Cancel waits, drain in-flight work, then stop every started module.
    pub async fn shutdown(&self) -> HostShutdown {
        let drain = self.shutdown.initiate(self.settings.shutdown_timeout).await;
        let teardown = self.registry.stop_all().await;
        telemetry::record_teardown(teardown.stopped, teardown.failed.len());
        if !teardown.failed.is_empty() {
            tracing::warn!(failed = teardown.failed.len(), "some modules failed to stop");
        }
        HostShutdown { drain, teardown }
    }
}
