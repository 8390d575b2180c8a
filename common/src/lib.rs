//! Core wifiology pipeline: frame decoding, aggregation, the data model,
//! the embedded store, and the ambient config/logging/error stack shared by
//! the `capture`, `upload`, and `janitor` binaries.

pub mod aggregate;
pub mod config;
pub mod decode;
pub mod error;
pub mod jitter;
pub mod logging;
pub mod model;
pub mod stats;
pub mod store;

pub use error::{Result, WifiologyError};
