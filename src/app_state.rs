use std::sync::Arc;

use sqlx::{MySql, Pool};

use crate::broker::BrokerClient;
use crate::dispatch::DispatchService;
use crate::status_cache::WorkerStatusCache;

/// Everything an axum handler needs, cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<MySql>,
    pub broker: Arc<BrokerClient>,
    pub dispatch: Arc<DispatchService>,
    pub status_cache: WorkerStatusCache,
}
