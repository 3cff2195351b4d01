//! Per-user notification store with keyset pagination.
//!
//! The store lives in [`db::NotificationRepository`]; [`services`] holds the
//! dispatcher that fans administrator notifications out to recipients and the
//! database bootstrap, and [`routes`] exposes both over HTTP.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;

use config::Config;
use services::notifications::GroupDirectory;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub groups: Arc<dyn GroupDirectory>,
}
