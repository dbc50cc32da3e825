// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/ferry/ferry.toml`, `~/.config/ferry/ferry.toml`, `./ferry.toml`,
//! then `FERRY_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::FerryConfig;

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<FerryConfig, figment::Error> {
    base_figment().extract()
}

/// Load configuration from a TOML string only (defaults + string).
pub fn load_config_from_str(toml_content: &str) -> Result<FerryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FerryConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load from an explicit path (or the standard hierarchy when `None`),
/// mapping load failures onto the shared error type.
pub fn load(path: Option<&Path>) -> Result<FerryConfig, ferry_core::FerryError> {
    let result = match path {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    result.map_err(|e| ferry_core::FerryError::Config(format!("failed to load configuration: {e}")))
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<FerryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FerryConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

fn base_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(FerryConfig::default()))
        .merge(Toml::file("/etc/ferry/ferry.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("ferry/ferry.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("ferry.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so keys that themselves
/// contain underscores survive: `FERRY_SESSION_IDLE_MINUTES` must become
/// `session.idle_minutes`, not `session.idle.minutes`.
fn env_provider() -> Env {
    Env::prefixed("FERRY_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("chat_", "chat.", 1)
            .replacen("backend_", "backend.", 1)
            .replacen("classifier_", "classifier.", 1)
            .replacen("session_", "session.", 1)
            .replacen("history_", "history.", 1)
            .replacen("digest_", "digest.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
