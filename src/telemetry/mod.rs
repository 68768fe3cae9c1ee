// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Telemetry for the module host.
//!
//! Structured logging via `tracing`, per-swap and per-scan spans, and
//! counters/histograms through the `metrics` facade. No exporter is
//! installed here; the embedding process picks one.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_artifact_removed, record_candidate, record_quiescence_wait, record_scan,
    record_swap_duration, record_teardown,
};
pub use spans::{ScanSpan, SpanExt, SwapSpan};
