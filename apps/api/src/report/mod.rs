//! Report Aggregator: turns question scores into the write-once final record.

pub mod aggregator;

pub use aggregator::{ReportAggregator, ReportError};
