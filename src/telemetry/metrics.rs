// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Metric recording helpers.
//!
//! Names are prefixed `modhost_`. Without an installed recorder these are
//! no-ops.

use metrics::{counter, histogram};
use std::time::Duration;

/// One completed or skipped scan.
pub fn record_scan(status: &'static str) {
    counter!("modhost_scans_total", "status" => status).increment(1);
}

/// One processed candidate, labelled by outcome.
pub fn record_candidate(outcome: &'static str, category: &'static str) {
    counter!(
        "modhost_candidates_total",
        "outcome" => outcome,
        "category" => category
    )
    .increment(1);
}

/// An artifact deleted from the inbox or a destination directory.
pub fn record_artifact_removed(reason: &'static str) {
    counter!("modhost_artifacts_removed_total", "reason" => reason).increment(1);
}

pub fn record_quiescence_wait(waited: Duration) {
    histogram!("modhost_quiescence_wait_seconds").record(waited.as_secs_f64());
}

pub fn record_swap_duration(elapsed: Duration) {
    histogram!("modhost_swap_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_teardown(stopped: usize, failed: usize) {
    counter!("modhost_teardown_stopped_total").increment(stopped as u64);
    counter!("modhost_teardown_failed_total").increment(failed as u64);
}
