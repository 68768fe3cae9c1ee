// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process module container.
//!
//! Tracks bundle identity, location, and lifecycle state for artifacts on
//! local disk. Modules are not executed; drivers are attached by whoever
//! hosts the module's runtime via [`StandaloneContainer::attach_driver`].

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::container::{
    BundleId, ContainerError, DriverState, DriverStatus, LifecycleState, ModuleContainer,
    ModuleInstance,
};
use super::manifest::ArtifactManifest;

/// Operational state cell owned by a running module.
#[derive(Debug)]
pub struct DriverHandle {
    name: String,
    state: AtomicU8,
}

impl DriverHandle {
    pub fn new(name: impl Into<String>, state: DriverState) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: AtomicU8::new(encode(state)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DriverState {
        decode(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: DriverState) {
        self.state.store(encode(state), Ordering::SeqCst);
    }

    fn status(&self) -> DriverStatus {
        DriverStatus {
            name: self.name.clone(),
            state: self.state(),
        }
    }
}

fn encode(state: DriverState) -> u8 {
    match state {
        DriverState::Idle => 0,
        DriverState::Running => 1,
        DriverState::Stopped => 2,
    }
}

fn decode(raw: u8) -> DriverState {
    match raw {
        1 => DriverState::Running,
        2 => DriverState::Stopped,
        _ => DriverState::Idle,
    }
}

/// Container keeping bundle bookkeeping in memory.
pub struct StandaloneContainer {
    bundles: RwLock<BTreeMap<BundleId, ModuleInstance>>,
    drivers: DashMap<String, Arc<DriverHandle>>,
    next_id: AtomicU64,
}

impl StandaloneContainer {
    pub fn new() -> Self {
        Self {
            bundles: RwLock::new(BTreeMap::new()),
            drivers: DashMap::new(),
            // 0 is reserved for the container itself
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a driver to the module with the given symbolic name.
    pub fn attach_driver(&self, symbolic_name: &str, handle: Arc<DriverHandle>) {
        self.drivers.insert(symbolic_name.to_ascii_lowercase(), handle);
    }

    pub fn detach_driver(&self, symbolic_name: &str) -> Option<Arc<DriverHandle>> {
        self.drivers
            .remove(&symbolic_name.to_ascii_lowercase())
            .map(|(_, h)| h)
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.read().len()
    }

    fn transition(
        &self,
        id: BundleId,
        operation: &'static str,
        apply: impl FnOnce(LifecycleState) -> Option<LifecycleState>,
    ) -> Result<(), ContainerError> {
        let mut bundles = self.bundles.write();
        let bundle = bundles.get_mut(&id).ok_or(ContainerError::UnknownBundle(id))?;
        match apply(bundle.state) {
            Some(next) => {
                tracing::debug!(bundle = %id, from = %bundle.state, to = %next, "{}", operation);
                bundle.state = next;
                Ok(())
            }
            None => Err(ContainerError::InvalidTransition {
                id,
                operation,
                state: bundle.state,
            }),
        }
    }
}

impl Default for StandaloneContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleContainer for StandaloneContainer {
    async fn list_bundles(&self) -> Vec<ModuleInstance> {
        self.bundles.read().values().cloned().collect()
    }

    async fn bundle(&self, id: BundleId) -> Option<ModuleInstance> {
        self.bundles.read().get(&id).cloned()
    }

    async fn install_bundle(&self, location: &Path) -> Result<ModuleInstance, ContainerError> {
        // Re-installing the same location yields the existing bundle.
        if let Some(existing) = self
            .bundles
            .read()
            .values()
            .find(|b| b.location == location)
        {
            return Ok(existing.clone());
        }

        let headers = ArtifactManifest::read(location).map_err(|e| ContainerError::Malformed {
            location: location.to_path_buf(),
            reason: e.to_string(),
        })?;
        let symbolic_name = headers
            .symbolic_name()
            .ok_or_else(|| ContainerError::Malformed {
                location: location.to_path_buf(),
                reason: "missing Bundle-SymbolicName".to_string(),
            })?
            .to_string();
        let version = headers.version().to_string();

        let mut bundles = self.bundles.write();
        if let Some(existing) = bundles.values().find(|b| b.has_name(&symbolic_name)) {
            return Err(ContainerError::Duplicate {
                symbolic_name,
                existing: existing.location.clone(),
            });
        }

        let id = BundleId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let instance = ModuleInstance {
            id,
            symbolic_name,
            version,
            location: location.to_path_buf(),
            // No wiring to resolve in-process, so bundles resolve on install.
            state: LifecycleState::Resolved,
            headers,
        };
        bundles.insert(id, instance.clone());
        tracing::debug!(bundle = %id, name = %instance.symbolic_name, "installed");

        Ok(instance)
    }

    async fn start(&self, id: BundleId) -> Result<(), ContainerError> {
        self.transition(id, "start", |state| match state {
            LifecycleState::Installed | LifecycleState::Resolved | LifecycleState::Starting => {
                Some(LifecycleState::Active)
            }
            LifecycleState::Active => Some(LifecycleState::Active),
            LifecycleState::Uninstalled => None,
        })
    }

    async fn stop(&self, id: BundleId) -> Result<(), ContainerError> {
        self.transition(id, "stop", |state| match state {
            LifecycleState::Active | LifecycleState::Starting => Some(LifecycleState::Resolved),
            LifecycleState::Installed | LifecycleState::Resolved => Some(state),
            LifecycleState::Uninstalled => None,
        })
    }

    async fn uninstall(&self, id: BundleId) -> Result<(), ContainerError> {
        let removed = {
            let mut bundles = self.bundles.write();
            let bundle = bundles.get(&id).ok_or(ContainerError::UnknownBundle(id))?;
            if bundle.state.is_started() {
                return Err(ContainerError::InvalidTransition {
                    id,
                    operation: "uninstall",
                    state: bundle.state,
                });
            }
            bundles.remove(&id)
        };

        if let Some(bundle) = removed {
            self.detach_driver(&bundle.symbolic_name);
            tracing::debug!(bundle = %id, name = %bundle.symbolic_name, "uninstalled");
        }
        Ok(())
    }

    async fn driver(&self, id: BundleId) -> Option<DriverStatus> {
        let name = self.bundles.read().get(&id)?.symbolic_name.to_ascii_lowercase();
        self.drivers.get(&name).map(|h| h.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::manifest::MANIFEST_PATH;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn jar(dir: &TempDir, file: &str, name: &str, version: &str) -> PathBuf {
        let path = dir.path().join(file);
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file(MANIFEST_PATH, options).unwrap();
        write!(zip, "Bundle-SymbolicName: {}\nBundle-Version: {}\n", name, version).unwrap();
        zip.finish().unwrap();
        path
    }

    #[tokio::test]
    async fn test_install_resolves_and_start_activates() {
        let dir = TempDir::new().unwrap();
        let container = StandaloneContainer::new();

        let b = container.install_bundle(&jar(&dir, "a.jar", "driverA", "1.0")).await.unwrap();
        assert_eq!(b.state, LifecycleState::Resolved);
        assert_eq!(b.version, "1.0");

        container.start(b.id).await.unwrap();
        assert_eq!(container.bundle(b.id).await.unwrap().state, LifecycleState::Active);

        container.stop(b.id).await.unwrap();
        assert_eq!(container.bundle(b.id).await.unwrap().state, LifecycleState::Resolved);
    }

    #[tokio::test]
    async fn test_same_location_is_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let container = StandaloneContainer::new();
        let path = jar(&dir, "a.jar", "driverA", "1.0");

        let first = container.install_bundle(&path).await.unwrap();
        let second = container.install_bundle(&path).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(container.bundle_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let dir = TempDir::new().unwrap();
        let container = StandaloneContainer::new();
        container.install_bundle(&jar(&dir, "a1.jar", "driverA", "1.0")).await.unwrap();

        let err = container
            .install_bundle(&jar(&dir, "a2.jar", "DRIVERA", "2.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_uninstall_active_rejected() {
        let dir = TempDir::new().unwrap();
        let container = StandaloneContainer::new();
        let b = container.install_bundle(&jar(&dir, "a.jar", "driverA", "1.0")).await.unwrap();
        container.start(b.id).await.unwrap();

        assert!(container.uninstall(b.id).await.is_err());
        container.stop(b.id).await.unwrap();
        container.uninstall(b.id).await.unwrap();
        assert!(container.bundle(b.id).await.is_none());
    }

    #[tokio::test]
    async fn test_driver_lookup_follows_bundle() {
        let dir = TempDir::new().unwrap();
        let container = StandaloneContainer::new();
        let b = container.install_bundle(&jar(&dir, "a.jar", "driverA", "1.0")).await.unwrap();
        assert!(container.driver(b.id).await.is_none());

        let handle = DriverHandle::new("driverA", DriverState::Running);
        container.attach_driver("DriverA", handle.clone());
        assert_eq!(container.driver(b.id).await.unwrap().state, DriverState::Running);

        handle.set_state(DriverState::Idle);
        assert_eq!(container.driver(b.id).await.unwrap().state, DriverState::Idle);
    }

    #[tokio::test]
    async fn test_malformed_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jar");
        std::fs::write(&path, b"nope").unwrap();

        let err = StandaloneContainer::new().install_bundle(&path).await.unwrap_err();
        assert!(matches!(err, ContainerError::Malformed { .. }));
    }
}
