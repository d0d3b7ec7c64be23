//! SQLite persistence for chain state, rules, the notification outbox and
//! the raw batch archive.

pub mod archive;
pub mod chain;
pub mod error;
pub mod outbox;
pub mod rules;
pub mod sqlite;
