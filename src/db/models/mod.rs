mod daily_snapshot;
mod usage_record;

pub use daily_snapshot::*;
pub use usage_record::*;
