#![warn(missing_docs)]
//! Vigil ingests blockchain state changes, matches them against alert rules
//! and delivers notifications through configured channels.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod http_client;
pub mod http_server;
pub mod models;
pub mod persistence;
pub mod test_helpers;
