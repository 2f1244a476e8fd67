pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod report;
pub mod usage;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::db::{SnapshotStore, SqliteSnapshotStore};
use crate::engine::{SqliteUsageSource, UsageSource};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub usage_source: Arc<dyn UsageSource>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
}

impl AppState {
    /// State over the SQLite-backed usage source and snapshot store
    pub fn new(config: Config, db: DbPool) -> Self {
        Self {
            usage_source: Arc::new(SqliteUsageSource::new(db.clone())),
            snapshot_store: Arc::new(SqliteSnapshotStore::new(db.clone())),
            config,
            db,
        }
    }
}
