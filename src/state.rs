use crate::db::Store;
use crate::middleware::RateLimiter;
use crate::services::tables::TableRegistry;
use crate::time_utils::LocalZone;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<TableRegistry>,
    pub zone: LocalZone,
    pub session_key: Vec<u8>,
    pub login_limiter: RateLimiter,
    pub secure_cookie: bool,
}

pub type SharedState = Arc<AppState>;
