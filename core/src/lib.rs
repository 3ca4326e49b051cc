//! scoring-core: scheduled batch scoring of churn and fraud tables.
//!
//! A pipeline fetches unprocessed rows, runs them through a stacked
//! ensemble, writes verdicts back in one transaction and optionally
//! forwards the scored records to a stream.

pub mod clock;
pub mod config;
pub mod decision;
pub mod encoding;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod event;
pub mod frame;
pub mod job;
pub mod model;
pub mod scaler;
pub mod sink;
pub mod store;
pub mod types;
