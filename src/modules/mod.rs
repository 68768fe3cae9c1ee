// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Module lifecycle management.
//!
//! Classifies incoming artifacts, tracks installed instances, and hot-swaps
//! them from the inbox into the destination directories.

pub mod manifest;

mod artifact;
mod container;
mod quiescence;
mod registry;
mod standalone;
mod swap;
mod watcher;

pub use artifact::{classify, from_manifest, ClassificationError, ModuleArtifact, ModuleCategory};
pub use container::{
    BundleId, ContainerError, DriverState, DriverStatus, LifecycleState, ModuleContainer,
    ModuleInstance,
};
pub use manifest::{ArtifactManifest, ManifestError};
pub use quiescence::{QuiescenceConfig, QuiescenceController, QuiescenceError, QuiescenceOutcome};
pub use registry::{
    IdentityGuard, InstallError, LifecycleError, LifecycleOp, ModuleRegistry, TeardownReport,
};
pub use standalone::{DriverHandle, StandaloneContainer};
pub use swap::{ArtifactDisposition, Existing, SwapError, SwapExecutor, SwapOutcome};
pub use watcher::{
    CandidateOutcome, CandidateReport, DeploymentWatcher, ScanReport, ScanStatus, WatcherConfig,
};
