//! Computation engine: the usage pipeline, projections, trends and the
//! snapshot job that persists daily summaries.

pub mod pipeline;
pub mod projection;
mod snapshot_job;
mod trend;

pub use pipeline::{
    aggregate_window, summarize, AggregationRun, SqliteUsageSource, StaticUsageSource,
    UsageSource, UsageWindow, WindowError, MAX_WINDOW_DAYS,
};
pub use projection::*;
pub use snapshot_job::*;
pub use trend::*;
