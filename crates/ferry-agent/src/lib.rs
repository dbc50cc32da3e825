// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Ferry bridge pipeline: ingress, triage dispatch, session
//! reconciliation, conversation orchestration, and the digest scheduler.
//!
//! Data flow: the ingress adapter receives a platform event, dedups it,
//! and triages it into the buffer or straight to the orchestrator. The
//! orchestrator resolves a backend thread via the reconciler, assembles
//! the prompt, and submits the turn; backend stream events flow back in
//! and become replies. The scheduler periodically drains the buffer into
//! synthetic turns.

pub mod ingress;
pub mod orchestrator;
pub mod reconciler;
pub mod scheduler;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod testutil;

pub use ingress::{reply_callback, DedupCache, IngressAdapter};
pub use orchestrator::{
    parse_response, MessageRequest, Orchestrator, ParsedReply, Reply, ReplyCallback,
};
pub use reconciler::{SessionReconciler, ThreadDecision};
pub use scheduler::{DigestScheduler, SchedulerConfig};
