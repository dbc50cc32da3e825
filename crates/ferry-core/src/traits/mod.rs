// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits: the contracts Ferry holds against its external
//! systems. Concrete implementations live in their own crates; everything
//! inside the pipeline is written against these traits so tests can swap
//! in mocks.

pub mod backend;
pub mod chat;
pub mod filter;

pub use backend::ThreadBackend;
pub use chat::ChatPort;
pub use filter::RelevanceFilter;
