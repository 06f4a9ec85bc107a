//! Shared application state handed to every handler and middleware.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::fx::RateService;
use crate::services::provider::ProviderClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub fx: Arc<RateService>,

    /// Absent in tests; payouts then stay pending until a webhook arrives.
    pub provider: Option<Arc<ProviderClient>>,
}
