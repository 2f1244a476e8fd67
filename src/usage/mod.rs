//! Usage ingestion: service catalogue, raw row normalization and daily rollups.
//!
//! Raw usage arrives with a different column set per service family. The
//! normalizer reshapes each row into a [`NormalizedDailyUsage`] and the
//! aggregator folds those into one [`DailySummary`] per `(date, service)`.

mod aggregator;
mod normalizer;
mod service;

pub use aggregator::*;
pub use normalizer::*;
pub use service::*;

use thiserror::Error;

/// Errors raised while validating raw usage rows
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageError {
    #[error("Invalid usage record: {0}")]
    InvalidUsageRecord(String),

    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),
}
