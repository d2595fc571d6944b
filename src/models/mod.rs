mod forecast_point;

pub use forecast_point::{ForecastPoint, ForecastPointResponse};
