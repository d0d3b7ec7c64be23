//! The ingestion-to-notification engine: rule index, matching and the
//! ingest unit of work.

pub mod ingest;
pub mod matcher;
pub mod rule_index;
