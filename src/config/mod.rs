// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading and resolution.
//!
//! Configuration comes from three layers, weakest first:
//!
//! 1. Built-in defaults
//! 2. A config file (`coderev.yaml` / `coderev.json` in the workspace root,
//!    or the global `~/.config/coderev/config.yaml`)
//! 3. Environment variables (API keys and endpoint overrides)

pub mod loader;
pub mod types;

pub use loader::{find_config_file, load_config, load_config_file};
pub use types::{Config, LogSettings, RagSettings};
