// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use crate::config::{self, EffectiveConfig, HostSettings};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() -> i32 {
    match config::load() {
        Ok(settings) => {
            print_config(&settings.effective_config());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Print built-in defaults, ignoring file and environment.
pub fn run_defaults() {
    print_config(&HostSettings::default().effective_config());
}

/// Check for misconfigurations. Returns 0 if valid, 1 otherwise.
pub fn run_validate() -> i32 {
    let settings = match config::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return 1;
        }
    };
    let warnings = validate(&settings);
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(settings: &HostSettings) -> Vec<String> {
    let mut warnings = Vec::new();
    let dirs = &settings.dirs;

    let destinations = [
        (config::ENV_CORE_MODULES, &dirs.core),
        (config::ENV_SERVICE_MODULES, &dirs.service),
        (config::ENV_CUSTOM_MODULES, &dirs.custom),
    ];
    for (key, dir) in destinations {
        if *dir == dirs.inbox {
            warnings.push(format!(
                "{} is the same directory as {} ({})",
                key,
                config::ENV_INBOX_DIR,
                dir.display()
            ));
        }
    }
    if dirs.core == dirs.service || dirs.core == dirs.custom || dirs.service == dirs.custom {
        warnings.push("module category directories are not distinct".to_string());
    }
    if settings.artifact_extensions.is_empty() {
        warnings.push("no artifact extensions configured; nothing will be deployed".to_string());
    }
    if let Some(limit) = settings.quiescence_timeout {
        if limit < settings.poll_interval {
            warnings.push(format!(
                "{} ({}s) is shorter than one poll interval",
                config::ENV_QUIESCENCE_TIMEOUT,
                limit.as_secs()
            ));
        }
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in cfg.entries() {
        println!("{}={}", key, value);
    }
}
