//! Mines Oracle AWR HTML reports: extracts their tables into flat files and
//! looks for anomalous snapshots, per database instance.

#[macro_use]
pub mod macros;

pub mod aggregate;
pub mod analysis;
pub mod anomalies;
pub mod awr;
pub mod correlate;
pub mod error;
pub mod processors;
pub mod registry;
pub mod staticdata;
pub mod table;
pub mod tools;
pub mod writer;

pub use error::{AwrError, Result};
