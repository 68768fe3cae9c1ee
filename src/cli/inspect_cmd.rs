// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Inspect CLI subcommand: show how an artifact would be classified.

use serde::Serialize;
use std::path::Path;

use crate::modules::{classify, ArtifactManifest, ModuleArtifact};

#[derive(Debug, Serialize)]
struct InspectReport<'a> {
    artifact: &'a ModuleArtifact,
    headers: &'a ArtifactManifest,
}

/// Run `inspect <path> [--json]`.
///
/// Returns exit code: 0 on success, 1 if the artifact cannot be classified.
pub fn run_inspect(path: &Path, json: bool) -> i32 {
    let artifact = match classify(path) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_corrupt() {
                eprintln!("The artifact is malformed and would be removed from the inbox.");
            }
            return 1;
        }
    };
    // classify succeeded, so the manifest is readable.
    let headers = ArtifactManifest::read(path).unwrap_or_default();

    if json {
        let report = InspectReport {
            artifact: &artifact,
            headers: &headers,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        print_artifact(&artifact, &headers);
    }
    0
}

pub fn print_artifact(artifact: &ModuleArtifact, headers: &ArtifactManifest) {
    println!("{:<16} {}", "FILE", artifact.path.display());
    println!("{:<16} {}", "NAME", artifact.symbolic_name);
    println!("{:<16} {}", "VERSION", artifact.version);
    println!("{:<16} {}", "CATEGORY", artifact.category);

    if headers.is_empty() {
        return;
    }
    println!();
    println!("{:<30} {}", "HEADER", "VALUE");
    println!("{}", "-".repeat(72));
    for (key, value) in headers.iter() {
        println!("{:<30} {}", truncate(key, 29), truncate(value, 41));
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
