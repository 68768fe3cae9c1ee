// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Span factories and result recording.

use std::path::Path;
use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Span covering one candidate's swap.
///
/// `status`, `error.message`, `outcome` and `duration_ms` are filled in on
/// completion.
pub struct SwapSpan;

impl SwapSpan {
    pub fn new(module: &str, version: &str, candidate: &Path) -> Span {
        info_span!(
            "module_swap",
            module = %module,
            version = %version,
            candidate = %candidate.display(),
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            outcome = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        )
    }
}

/// Span covering one pass over the inbox.
pub struct ScanSpan;

impl ScanSpan {
    pub fn new(inbox: &Path) -> Span {
        info_span!(
            "inbox_scan",
            inbox = %inbox.display(),
            candidates = tracing::field::Empty,
            failed = tracing::field::Empty,
        )
    }
}
