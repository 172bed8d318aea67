use std::sync::Arc;

use sqlx::PgPool;

use crate::middleware::RateLimiter;
use crate::services::report::ReportService;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub reports: Arc<ReportService>,
    pub limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;
