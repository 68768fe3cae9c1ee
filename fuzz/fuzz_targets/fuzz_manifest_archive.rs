// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fuzz target for reading manifests out of untrusted archives.
//!
//! Arbitrary bytes written as an artifact must classify to Ok or Err, never
//! panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modhost::modules::classify;
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).is_err() {
        return;
    }
    let _ = classify(file.path());
});
