pub mod coordinates;
pub mod forecast_sync;
