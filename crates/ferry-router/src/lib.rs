// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message triage and relevance classification for the Ferry bridge.
//!
//! Triage runs at ingress on local database state only (whitelist,
//! trigger keywords); the LLM relevance classifier is invoked later, by
//! the digest scheduler, so ingress latency stays bounded.

pub mod classifier;
pub mod triage;

pub use classifier::{listen_strategy, ClassifierConfig, RelevanceClassifier};
pub use triage::{TriageAction, TriageDecision, TriageRouter};
