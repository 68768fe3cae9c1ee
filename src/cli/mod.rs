// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Offline CLI subcommands.
//!
//! None of these need a running host.
//!
//! ```bash
//! modhost config show          # effective configuration
//! modhost inspect driver.jar   # classification of an artifact
//! ```

pub mod config_cmd;
pub mod inspect_cmd;
