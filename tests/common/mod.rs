// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use modhost::config::DeployDirs;
use modhost::modules::{
    manifest::MANIFEST_PATH, BundleId, ContainerError, DriverHandle, DriverStatus,
    ModuleContainer, ModuleInstance, ModuleRegistry, QuiescenceConfig, QuiescenceController,
    StandaloneContainer, SwapExecutor,
};

/// Write a jar at `dir/file` whose manifest carries `headers`.
pub fn write_jar(dir: &Path, file: &str, headers: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file);
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip.start_file(MANIFEST_PATH, options).unwrap();
    writeln!(zip, "Manifest-Version: 1.0").unwrap();
    for (k, v) in headers {
        writeln!(zip, "{}: {}", k, v).unwrap();
    }
    zip.start_file("com/example/Driver.class", options).unwrap();
    zip.write_all(&[0xca, 0xfe, 0xba, 0xbe]).unwrap();
    zip.finish().unwrap();
    path
}

/// Write a module jar with the usual identity headers.
pub fn module_jar(
    dir: &Path,
    file: &str,
    name: &str,
    version: &str,
    driver_type: Option<&str>,
) -> PathBuf {
    let mut headers = vec![("Bundle-SymbolicName", name), ("Bundle-Version", version)];
    if let Some(t) = driver_type {
        headers.push(("Driver-Type", t));
    }
    write_jar(dir, file, &headers)
}

/// Inbox and category directories inside a temp dir.
pub struct TestDirs {
    _tmp: TempDir,
    pub dirs: DeployDirs,
}

impl TestDirs {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let dirs = DeployDirs::under(tmp.path()).ensure().unwrap();
        Self { _tmp: tmp, dirs }
    }
}

/// Sorted file names in `dir`.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Container that records lifecycle calls and can be told to fail them.
///
/// Calls are recorded as `"<op>:<symbolic name>"`; installs as
/// `"install:<file name>"`.
#[derive(Default)]
pub struct RecordingContainer {
    pub inner: StandaloneContainer,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make calls matching `key` (same format as recorded calls) fail.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.failing.lock().remove(key);
    }

    pub fn attach_driver(&self, name: &str, handle: Arc<DriverHandle>) {
        self.inner.attach_driver(name, handle);
    }

    fn record(&self, key: String) -> Result<(), ContainerError> {
        let fail = self.failing.lock().contains(&key);
        self.calls.lock().push(key.clone());
        if fail {
            Err(ContainerError::Other(format!("injected failure on {}", key)))
        } else {
            Ok(())
        }
    }

    async fn name_of(&self, id: BundleId) -> String {
        self.inner
            .bundle(id)
            .await
            .map(|b| b.symbolic_name)
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl ModuleContainer for RecordingContainer {
    async fn list_bundles(&self) -> Vec<ModuleInstance> {
        self.inner.list_bundles().await
    }

    async fn bundle(&self, id: BundleId) -> Option<ModuleInstance> {
        self.inner.bundle(id).await
    }

    async fn install_bundle(&self, location: &Path) -> Result<ModuleInstance, ContainerError> {
        let file = location
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("install:{}", file))?;
        self.inner.install_bundle(location).await
    }

    async fn start(&self, id: BundleId) -> Result<(), ContainerError> {
        self.record(format!("start:{}", self.name_of(id).await))?;
        self.inner.start(id).await
    }

    async fn stop(&self, id: BundleId) -> Result<(), ContainerError> {
        self.record(format!("stop:{}", self.name_of(id).await))?;
        self.inner.stop(id).await
    }

    async fn uninstall(&self, id: BundleId) -> Result<(), ContainerError> {
        self.record(format!("uninstall:{}", self.name_of(id).await))?;
        self.inner.uninstall(id).await
    }

    async fn driver(&self, id: BundleId) -> Option<DriverStatus> {
        self.inner.driver(id).await
    }
}

pub fn fast_quiescence() -> QuiescenceConfig {
    QuiescenceConfig {
        poll_interval: Duration::from_millis(10),
        max_wait: None,
    }
}

/// Registry and executor over a recording container.
pub struct SwapHarness {
    pub container: Arc<RecordingContainer>,
    pub registry: Arc<ModuleRegistry>,
    pub executor: Arc<SwapExecutor>,
    pub cancel: CancellationToken,
}

impl SwapHarness {
    pub fn new() -> Self {
        Self::with_quiescence(fast_quiescence())
    }

    pub fn with_quiescence(config: QuiescenceConfig) -> Self {
        let container = RecordingContainer::new();
        let registry = Arc::new(ModuleRegistry::new(container.clone()));
        let cancel = CancellationToken::new();
        let quiescence = QuiescenceController::new(registry.clone(), config);
        let executor = Arc::new(SwapExecutor::new(registry.clone(), quiescence, cancel.clone()));
        Self {
            container,
            registry,
            executor,
            cancel,
        }
    }
}
