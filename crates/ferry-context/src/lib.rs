// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation assembly and prompt formatting for the Ferry bridge.
//!
//! The history assembler fetches and truncates chat history into prompt
//! fragments: bounded truncation (unconditional tail + time-windowed older
//! prefix), omission notices, member listings, and resumption anchors.

pub mod builder;
pub mod prompt;

pub use builder::ContextBuilder;
pub use prompt::{
    format_for_new_thread, format_for_resumed_thread, format_history_for_filter,
    truncate_history, PromptConfig, TruncatedHistory,
};
