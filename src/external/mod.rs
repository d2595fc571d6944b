pub mod forecast_provider;
pub mod yr;
