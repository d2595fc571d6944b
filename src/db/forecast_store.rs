use async_trait::async_trait;
use thiserror::Error;

use crate::models::ForecastPoint;
use crate::services::coordinates::Coordinate;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation on the coordinate pair. Two concurrent
    /// reconciliations can race on the first insert for a coordinate;
    /// callers treat this as "already exists" and re-read.
    #[error("a forecast point already exists for this coordinate")]
    Duplicate,

    #[error("forecast point no longer exists")]
    Missing,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for forecast points.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Batch lookup: one call for the whole coordinate set. Each requested
    /// pair is matched independently, by exact equality on the 4-decimal
    /// representation.
    async fn find_by_coordinates(
        &self,
        coords: &[Coordinate],
    ) -> Result<Vec<ForecastPoint>, StoreError>;

    async fn create(&self, point: &ForecastPoint) -> Result<ForecastPoint, StoreError>;

    /// Replaces all mutable fields of an existing point.
    async fn update(&self, point: &ForecastPoint) -> Result<(), StoreError>;
}
