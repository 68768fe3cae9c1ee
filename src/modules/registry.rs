// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Module registry: the single gateway to container state.

use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::container::{ContainerError, DriverStatus, ModuleContainer, ModuleInstance};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Container rejected {location}: {source}")]
    Rejected {
        location: PathBuf,
        #[source]
        source: ContainerError,
    },
}

/// Lifecycle operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Start,
    Stop,
    Uninstall,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleOp::Start => "start",
            LifecycleOp::Stop => "stop",
            LifecycleOp::Uninstall => "uninstall",
        })
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to {operation} module {name}: {source}")]
    Container {
        operation: LifecycleOp,
        name: String,
        #[source]
        source: ContainerError,
    },

    #[error("Module {0} is still started; stop it before uninstalling")]
    StillActive(String),
}

/// Exclusive right to change the lifecycle of one module identity.
pub struct IdentityGuard {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl IdentityGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of stopping every started module at shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub stopped: usize,
    pub failed: Vec<(String, String)>,
}

/// Queryable view of installed modules; the only writer of container state.
pub struct ModuleRegistry {
    container: Arc<dyn ModuleContainer>,
    identity_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ModuleRegistry {
    pub fn new(container: Arc<dyn ModuleContainer>) -> Self {
        Self {
            container,
            identity_locks: DashMap::new(),
        }
    }

    /// Snapshot of installed instances, in container order.
    pub async fn list_instances(&self) -> Vec<ModuleInstance> {
        self.container.list_bundles().await
    }

    /// Replacement target for `name`: case-insensitive, resolved or active only.
    pub async fn find_by_name(&self, name: &str) -> Option<ModuleInstance> {
        self.list_instances()
            .await
            .into_iter()
            .find(|m| m.has_name(name) && m.state.is_replaceable())
    }

    /// Any installed instance named `name`, whatever its state.
    pub async fn lookup(&self, name: &str) -> Option<ModuleInstance> {
        self.list_instances().await.into_iter().find(|m| m.has_name(name))
    }

    /// Current container view of `instance`, if still installed.
    pub async fn refresh(&self, instance: &ModuleInstance) -> Option<ModuleInstance> {
        self.container.bundle(instance.id).await
    }

    pub async fn install(&self, location: &Path) -> Result<ModuleInstance, InstallError> {
        self.container
            .install_bundle(location)
            .await
            .map_err(|source| InstallError::Rejected {
                location: location.to_path_buf(),
                source,
            })
    }

    pub async fn start(&self, instance: &ModuleInstance) -> Result<(), LifecycleError> {
        self.container
            .start(instance.id)
            .await
            .map_err(|e| lifecycle_error(LifecycleOp::Start, instance, e))
    }

    pub async fn stop(&self, instance: &ModuleInstance) -> Result<(), LifecycleError> {
        self.container
            .stop(instance.id)
            .await
            .map_err(|e| lifecycle_error(LifecycleOp::Stop, instance, e))
    }

    /// Uninstall `instance`. Refuses while the container reports it started.
    pub async fn uninstall(&self, instance: &ModuleInstance) -> Result<(), LifecycleError> {
        if let Some(current) = self.refresh(instance).await {
            if current.state.is_started() {
                return Err(LifecycleError::StillActive(current.symbolic_name));
            }
        }

        self.container
            .uninstall(instance.id)
            .await
            .map_err(|e| lifecycle_error(LifecycleOp::Uninstall, instance, e))
    }

    pub async fn driver(&self, instance: &ModuleInstance) -> Option<DriverStatus> {
        self.container.driver(instance.id).await
    }

    /// Serialise lifecycle changes for one identity (case-insensitive).
    ///
    /// Read operations never take this lock.
    pub async fn lock_identity(&self, name: &str) -> IdentityGuard {
        let key = name.to_ascii_lowercase();
        let lock = self
            .identity_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        IdentityGuard {
            name: key,
            _guard: lock.lock_owned().await,
        }
    }

    /// Stop every started module, newest first. One failure does not prevent
    /// attempts on the rest.
    pub async fn stop_all(&self) -> TeardownReport {
        let mut started: Vec<ModuleInstance> = self
            .list_instances()
            .await
            .into_iter()
            .filter(|m| m.state.is_started())
            .collect();
        started.sort_by(|a, b| b.id.cmp(&a.id));

        let mut report = TeardownReport::default();
        for instance in started {
            let _guard = self.lock_identity(&instance.symbolic_name).await;
            match self.stop(&instance).await {
                Ok(()) => {
                    tracing::info!(module = %instance.symbolic_name, "stopped");
                    report.stopped += 1;
                }
                Err(e) => {
                    tracing::error!(module = %instance.symbolic_name, error = %e, "stop failed during teardown");
                    report.failed.push((instance.symbolic_name.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

fn lifecycle_error(op: LifecycleOp, instance: &ModuleInstance, source: ContainerError) -> LifecycleError {
    LifecycleError::Container {
        operation: op,
        name: instance.symbolic_name.clone(),
        source,
    }
}
