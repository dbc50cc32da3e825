// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading and validation for the Ferry bridge.

pub mod loader;
pub mod model;

pub use loader::{load, load_config, load_config_from_path, load_config_from_str};
pub use model::FerryConfig;
