// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fuzz target for manifest text parsing.
//!
//! Arbitrary text must never panic the parser or the header accessors.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modhost::modules::{from_manifest, ArtifactManifest};
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let manifest = ArtifactManifest::parse(text);
        let _ = manifest.symbolic_name();
        let _ = manifest.version();
        let _ = from_manifest(Path::new("fuzz.jar"), &manifest);
    }
});
