// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Quiescence coordination for module replacement.
//!
//! Before an installed module is stopped, its driver (if any) must leave the
//! `Running` state. The wait is a cancellable poll scoped to one swap.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::container::{DriverState, ModuleInstance};
use super::registry::ModuleRegistry;

#[derive(Error, Debug)]
pub enum QuiescenceError {
    #[error("Driver {name} still running after {waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("Wait for driver {0} was cancelled")]
    Cancelled(String),
}

/// How the wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuiescenceOutcome {
    /// The module exposes no driver; nothing to protect.
    NoDriver,
    /// The driver reported a non-running state.
    Idle {
        driver: String,
        state: DriverState,
        waited: Duration,
    },
}

impl QuiescenceOutcome {
    pub fn waited(&self) -> Duration {
        match self {
            QuiescenceOutcome::NoDriver => Duration::ZERO,
            QuiescenceOutcome::Idle { waited, .. } => *waited,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuiescenceConfig {
    pub poll_interval: Duration,
    /// Upper bound on the wait. `None` waits until the driver goes idle or
    /// the wait is cancelled.
    pub max_wait: Option<Duration>,
}

impl Default for QuiescenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

/// Blocks a single swap until the module being replaced is safe to stop.
pub struct QuiescenceController {
    registry: Arc<ModuleRegistry>,
    config: QuiescenceConfig,
}

impl QuiescenceController {
    pub fn new(registry: Arc<ModuleRegistry>, config: QuiescenceConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &QuiescenceConfig {
        &self.config
    }

    /// Wait until `instance`'s driver is no longer `Running`.
    pub async fn await_idle(
        &self,
        instance: &ModuleInstance,
        cancel: &CancellationToken,
    ) -> Result<QuiescenceOutcome, QuiescenceError> {
        let started = Instant::now();
        let deadline = self.config.max_wait.map(|w| started + w);
        let mut polls: u64 = 0;

        loop {
            let status = match self.registry.driver(instance).await {
                Some(status) => status,
                None => return Ok(QuiescenceOutcome::NoDriver),
            };

            if status.state != DriverState::Running {
                return Ok(QuiescenceOutcome::Idle {
                    driver: status.name,
                    state: status.state,
                    waited: started.elapsed(),
                });
            }

            if polls == 0 {
                tracing::info!(
                    module = %instance.symbolic_name,
                    driver = %status.name,
                    "deployment waiting, driver is currently running"
                );
            } else {
                tracing::debug!(driver = %status.name, polls, "driver still running");
            }
            polls += 1;

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QuiescenceError::Timeout {
                            name: status.name,
                            waited: started.elapsed(),
                        });
                    }
                    self.config.poll_interval.min(deadline - now)
                }
                None => self.config.poll_interval,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(QuiescenceError::Cancelled(status.name));
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}
