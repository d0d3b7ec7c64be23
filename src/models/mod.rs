//! Data model for the alerting pipeline.

pub mod archive;
pub mod batch;
pub mod block;
pub mod event;
pub mod intent;
pub mod rule;
pub mod transaction;
