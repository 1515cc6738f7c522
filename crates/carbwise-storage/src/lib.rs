// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Carbwise dosing assistant.
//!
//! WAL-mode SQLite with embedded migrations, a single-writer model via
//! `tokio-rusqlite`, and typed queries for users, ratio periods, food
//! analyses, corrections and the blood sugar log.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
