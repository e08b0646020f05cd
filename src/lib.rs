//! Batch ETL: a CSV dataset becomes a Snappy-compressed Parquet object under a
//! date-partitioned S3 key, followed by a best-effort retention sweep.

pub mod aws;
pub mod config;
pub mod converter;
pub mod error;
pub mod locator;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod publisher;
pub mod retention;
pub mod store;
pub mod trigger;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
pub use locator::Source;
pub use pipeline::{run, RunSummary};
pub use store::{MemoryStore, ObjectStore};
