// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions, grouped by table family.

pub mod buffer;
pub mod sessions;
