// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Contract consumed from the underlying module container.
//!
//! The host never manipulates modules directly; everything goes through a
//! [`ModuleContainer`] implementation, and only [`super::ModuleRegistry`]
//! calls into it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::manifest::{ArtifactManifest, DRIVER_TYPE};

/// Container-assigned identifier of an installed bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleId(u64);

impl BundleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an installed module, with the container's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Active,
}

impl LifecycleState {
    pub fn code(&self) -> u32 {
        match self {
            LifecycleState::Uninstalled => 1,
            LifecycleState::Installed => 2,
            LifecycleState::Resolved => 4,
            LifecycleState::Starting => 8,
            LifecycleState::Active => 32,
        }
    }

    /// Decode a numeric state. Both 8 and 16 render as `Starting`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(LifecycleState::Uninstalled),
            2 => Some(LifecycleState::Installed),
            4 => Some(LifecycleState::Resolved),
            8 | 16 => Some(LifecycleState::Starting),
            32 => Some(LifecycleState::Active),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Uninstalled => "UNINSTALLED",
            LifecycleState::Installed => "INSTALLED",
            LifecycleState::Resolved => "RESOLVED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Active => "ACTIVE",
        }
    }

    /// Only resolved or active instances can be targeted for replacement.
    pub fn is_replaceable(&self) -> bool {
        matches!(self, LifecycleState::Resolved | LifecycleState::Active)
    }

    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of an installed module as reported by the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstance {
    pub id: BundleId,
    pub symbolic_name: String,
    pub version: String,
    /// Absolute path of the backing artifact.
    pub location: PathBuf,
    pub state: LifecycleState,
    pub headers: ArtifactManifest,
}

impl ModuleInstance {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn driver_type(&self) -> Option<&str> {
        self.header(DRIVER_TYPE)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.symbolic_name.eq_ignore_ascii_case(name)
    }
}

/// Operational state reported by a module's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverState {
    Idle,
    Running,
    Stopped,
}

/// Read-only view of a module's driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverStatus {
    pub name: String,
    pub state: DriverState,
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Bundle {0} is not installed")]
    UnknownBundle(BundleId),

    #[error("Malformed bundle {location}: {reason}")]
    Malformed { location: PathBuf, reason: String },

    #[error("Bundle {symbolic_name} is already installed from {existing}")]
    Duplicate { symbolic_name: String, existing: PathBuf },

    #[error("Bundle {id} cannot {operation} while {state}")]
    InvalidTransition {
        id: BundleId,
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Container failure: {0}")]
    Other(String),
}

/// Capability required from the module container.
#[async_trait]
pub trait ModuleContainer: Send + Sync {
    /// All installed bundles, in container order.
    async fn list_bundles(&self) -> Vec<ModuleInstance>;

    async fn bundle(&self, id: BundleId) -> Option<ModuleInstance>;

    async fn install_bundle(&self, location: &Path) -> Result<ModuleInstance, ContainerError>;

    async fn start(&self, id: BundleId) -> Result<(), ContainerError>;

    async fn stop(&self, id: BundleId) -> Result<(), ContainerError>;

    async fn uninstall(&self, id: BundleId) -> Result<(), ContainerError>;

    /// Driver exposed by the bundle, if it has one.
    async fn driver(&self, id: BundleId) -> Option<DriverStatus>;
}
