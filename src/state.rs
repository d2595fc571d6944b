use std::sync::Arc;

use crate::db::pg_forecast_store::PgForecastStore;
use crate::external::forecast_provider::ForecastProvider;
use crate::services::forecast_sync::SyncConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: PgForecastStore,
    pub forecast_provider: Arc<dyn ForecastProvider>,
    pub sync: SyncConfig,
}
