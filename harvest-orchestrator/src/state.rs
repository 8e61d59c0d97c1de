//! Shared application state handed to every API handler

use harvest_queue::QueueHealthMonitor;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::service::dispatch::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<QueueHealthMonitor>,
    pub config: Arc<Config>,
}
