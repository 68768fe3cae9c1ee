// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Artifact manifest parsing for module archives.
//!
//! Module artifacts are zip archives (JAR layout) whose main manifest section
//! in `META-INF/MANIFEST.MF` carries the bundle identity and driver headers.

use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

/// Location of the manifest inside an artifact archive.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Required identity header.
pub const SYMBOLIC_NAME: &str = "Bundle-SymbolicName";

/// Optional version header.
pub const BUNDLE_VERSION: &str = "Bundle-Version";

/// Optional category header.
pub const DRIVER_TYPE: &str = "Driver-Type";

/// Version reported for artifacts without a `Bundle-Version` header.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Largest manifest read from an archive. Sizes declared in the archive are
/// attacker-controlled, so nothing is allocated or read past this bound.
pub const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Archive has no {MANIFEST_PATH}")]
    Missing,

    #[error("Manifest is not valid UTF-8")]
    Encoding,
}

impl From<ZipError> for ManifestError {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => ManifestError::Io(e),
            ZipError::FileNotFound => ManifestError::Missing,
            other => ManifestError::InvalidArchive(other.to_string()),
        }
    }
}

/// Main-section headers of an artifact manifest, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactManifest {
    headers: Vec<(String, String)>,
}

impl ArtifactManifest {
    /// Read the manifest of the archive at `path`.
    ///
    /// The archive and its entry reader are dropped before returning, on
    /// success and on every error path.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let entry = archive.by_name(MANIFEST_PATH)?;
        if entry.size() > MAX_MANIFEST_BYTES {
            return Err(ManifestError::InvalidArchive("manifest too large".to_string()));
        }

        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry
            .take(MAX_MANIFEST_BYTES + 1)
            .read_to_end(&mut raw)
            .map_err(|e| match e.kind() {
                // Checksum and decompression failures inside the entry.
                std::io::ErrorKind::InvalidData => ManifestError::InvalidArchive(e.to_string()),
                _ => ManifestError::Io(e),
            })?;
        if raw.len() as u64 > MAX_MANIFEST_BYTES {
            return Err(ManifestError::InvalidArchive("manifest too large".to_string()));
        }

        let text = String::from_utf8(raw).map_err(|_| ManifestError::Encoding)?;
        Ok(Self::parse(&text))
    }

    /// Parse manifest text. Only the main section (up to the first blank
    /// line) is kept; continuation lines start with a single space.
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push_str(rest);
                }
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                let value = value.strip_prefix(' ').unwrap_or(value);
                headers.push((key.to_string(), value.to_string()));
            }
        }

        for (_, value) in headers.iter_mut() {
            let trimmed = value.trim_end().len();
            value.truncate(trimmed);
        }

        Self { headers }
    }

    /// Look up a header by name, ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Bundle symbolic name with any `;` directives removed.
    pub fn symbolic_name(&self) -> Option<&str> {
        self.get(SYMBOLIC_NAME)
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Bundle version, or [`DEFAULT_VERSION`] when absent or blank.
    pub fn version(&self) -> &str {
        self.get(BUNDLE_VERSION)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION)
    }

    /// Raw `Driver-Type` value, if present and non-blank.
    pub fn driver_type(&self) -> Option<&str> {
        self.get(DRIVER_TYPE).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
