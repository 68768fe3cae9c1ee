// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Artifact classification.
//!
//! Derives identity, version, and category of a candidate artifact from its
//! embedded manifest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::manifest::{ArtifactManifest, ManifestError, SYMBOLIC_NAME};

/// Category of a module; selects its destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleCategory {
    Core,
    Service,
    Custom,
}

impl ModuleCategory {
    /// Map a `Driver-Type` header value to a category.
    ///
    /// Absent or blank values default to `Core`. Unrecognised values fall
    /// through to `Service`.
    pub fn from_driver_type(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => ModuleCategory::Core,
            Some(v) if v.eq_ignore_ascii_case("core") => ModuleCategory::Core,
            Some(v) if v.eq_ignore_ascii_case("custom") => ModuleCategory::Custom,
            Some(v) => {
                if !v.eq_ignore_ascii_case("service") {
                    tracing::warn!(driver_type = %v, "unrecognised Driver-Type, routing to service modules");
                }
                ModuleCategory::Service
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleCategory::Core => "Core",
            ModuleCategory::Service => "Service",
            ModuleCategory::Custom => "Custom",
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate artifact as seen by one scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleArtifact {
    pub path: PathBuf,
    pub symbolic_name: String,
    pub version: String,
    pub category: ModuleCategory,
}

impl ModuleArtifact {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Cannot read artifact {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact {path} is not a valid archive: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Artifact {path} has no manifest")]
    MissingManifest { path: PathBuf },

    #[error("Artifact {path} manifest lacks required header {header}")]
    MissingHeader { path: PathBuf, header: &'static str },
}

impl ClassificationError {
    /// True when the artifact itself is malformed and will never classify.
    /// False for transient read failures worth retrying on the next scan.
    pub fn is_corrupt(&self) -> bool {
        !matches!(self, Self::Unreadable { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Unreadable { path, .. }
            | Self::InvalidArchive { path, .. }
            | Self::MissingManifest { path }
            | Self::MissingHeader { path, .. } => path,
        }
    }
}

/// Classify the artifact at `path`.
pub fn classify(path: &Path) -> Result<ModuleArtifact, ClassificationError> {
    let manifest = ArtifactManifest::read(path).map_err(|e| match e {
        ManifestError::Io(source) => ClassificationError::Unreadable {
            path: path.to_path_buf(),
            source,
        },
        ManifestError::InvalidArchive(reason) => ClassificationError::InvalidArchive {
            path: path.to_path_buf(),
            reason,
        },
        ManifestError::Encoding => ClassificationError::InvalidArchive {
            path: path.to_path_buf(),
            reason: "manifest is not valid UTF-8".to_string(),
        },
        ManifestError::Missing => ClassificationError::MissingManifest {
            path: path.to_path_buf(),
        },
    })?;

    from_manifest(path, &manifest)
}

/// Build an artifact description from an already-read manifest.
pub fn from_manifest(
    path: &Path,
    manifest: &ArtifactManifest,
) -> Result<ModuleArtifact, ClassificationError> {
    let symbolic_name = manifest
        .symbolic_name()
        .ok_or_else(|| ClassificationError::MissingHeader {
            path: path.to_path_buf(),
            header: SYMBOLIC_NAME,
        })?;

    Ok(ModuleArtifact {
        path: path.to_path_buf(),
        symbolic_name: symbolic_name.to_string(),
        version: manifest.version().to_string(),
        category: ModuleCategory::from_driver_type(manifest.driver_type()),
    })
}
