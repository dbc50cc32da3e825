// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Ferry bridge.
//!
//! This crate holds the domain model (messages, conversations, sessions,
//! buffer entities), the shared [`FerryError`] enum, and the traits for
//! Ferry's external collaborators: the chat platform, the AI backend
//! sub-process, and the relevance classifier.

pub mod error;
pub mod traits;
pub mod types;

pub use error::FerryError;
pub use traits::{ChatPort, RelevanceFilter, ThreadBackend};
pub use types::{
    ActiveTurnContext, BufferSummary, BufferedMessage, ChatEvent, ChatType, Conversation,
    EventMention, InterestTopic, Member, Message, Session, SessionPolicy, TriggerKeyword,
    WhitelistEntry,
};
