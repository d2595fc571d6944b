pub mod forecast_store;
pub mod pg_forecast_store;

pub use forecast_store::{ForecastStore, StoreError};
pub use pg_forecast_store::PgForecastStore;
