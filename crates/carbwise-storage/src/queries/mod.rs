// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions, one module per table group.
//!
//! Every function takes a `&Database` and runs its statements through
//! `Connection::call` on the single background thread.

pub mod analyses;
pub mod blood_sugar;
pub mod ratios;
pub mod users;
