use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use crate::db::forecast_store::{ForecastStore, StoreError};
use crate::models::ForecastPoint;
use crate::services::coordinates::Coordinate;

const SELECT_COLUMNS: &str = "id, latitude, longitude, \
     forecast_start_datetime, last_forecast_update_datetime, new_req_allowed_datetime, \
     symbol_name_0h, t_0h, symbol_name_1h, t_1h, symbol_name_2h, t_2h, \
     symbol_name_3h, t_3h, symbol_name_4h, t_4h, symbol_name_5h, t_5h, \
     symbol_name_6h, t_6h";

/// Postgres-backed store. The (latitude, longitude) pair carries a unique
/// index, so concurrent duplicate inserts surface as [`StoreError::Duplicate`].
#[derive(Clone)]
pub struct PgForecastStore {
    pool: PgPool,
}

impl PgForecastStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ForecastStore for PgForecastStore {
    async fn find_by_coordinates(
        &self,
        coords: &[Coordinate],
    ) -> Result<Vec<ForecastPoint>, StoreError> {
        if coords.is_empty() {
            return Ok(Vec::new());
        }

        // One round trip for the whole batch: unnest the parallel lat/lon
        // arrays into rows and match the pair against each of them.
        let mut latitudes: Vec<BigDecimal> = Vec::with_capacity(coords.len());
        let mut longitudes: Vec<BigDecimal> = Vec::with_capacity(coords.len());
        for coord in coords {
            latitudes.push(coord.latitude.clone());
            longitudes.push(coord.longitude.clone());
        }

        let points = sqlx::query_as::<_, ForecastPoint>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM forecast_points
            WHERE (latitude, longitude) IN (
                SELECT * FROM UNNEST($1::NUMERIC[], $2::NUMERIC[])
            )
            ORDER BY latitude, longitude
            "#
        ))
        .bind(&latitudes)
        .bind(&longitudes)
        .fetch_all(&self.pool)
        .await?;

        Ok(points)
    }

    async fn create(&self, point: &ForecastPoint) -> Result<ForecastPoint, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO forecast_points (
                id, latitude, longitude,
                forecast_start_datetime, last_forecast_update_datetime, new_req_allowed_datetime,
                symbol_name_0h, t_0h, symbol_name_1h, t_1h, symbol_name_2h, t_2h,
                symbol_name_3h, t_3h, symbol_name_4h, t_4h, symbol_name_5h, t_5h,
                symbol_name_6h, t_6h
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(point.id)
        .bind(&point.latitude)
        .bind(&point.longitude)
        .bind(point.forecast_start_datetime)
        .bind(point.last_forecast_update_datetime)
        .bind(point.new_req_allowed_datetime)
        .bind(&point.symbol_name_0h)
        .bind(&point.t_0h)
        .bind(&point.symbol_name_1h)
        .bind(&point.t_1h)
        .bind(&point.symbol_name_2h)
        .bind(&point.t_2h)
        .bind(&point.symbol_name_3h)
        .bind(&point.t_3h)
        .bind(&point.symbol_name_4h)
        .bind(&point.t_4h)
        .bind(&point.symbol_name_5h)
        .bind(&point.t_5h)
        .bind(&point.symbol_name_6h)
        .bind(&point.t_6h)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(point.clone()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn update(&self, point: &ForecastPoint) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE forecast_points
            SET forecast_start_datetime = $2,
                last_forecast_update_datetime = $3,
                new_req_allowed_datetime = $4,
                symbol_name_0h = $5, t_0h = $6,
                symbol_name_1h = $7, t_1h = $8,
                symbol_name_2h = $9, t_2h = $10,
                symbol_name_3h = $11, t_3h = $12,
                symbol_name_4h = $13, t_4h = $14,
                symbol_name_5h = $15, t_5h = $16,
                symbol_name_6h = $17, t_6h = $18
            WHERE id = $1
            "#,
        )
        .bind(point.id)
        .bind(point.forecast_start_datetime)
        .bind(point.last_forecast_update_datetime)
        .bind(point.new_req_allowed_datetime)
        .bind(&point.symbol_name_0h)
        .bind(&point.t_0h)
        .bind(&point.symbol_name_1h)
        .bind(&point.t_1h)
        .bind(&point.symbol_name_2h)
        .bind(&point.t_2h)
        .bind(&point.symbol_name_3h)
        .bind(&point.t_3h)
        .bind(&point.symbol_name_4h)
        .bind(&point.t_4h)
        .bind(&point.symbol_name_5h)
        .bind(&point.t_5h)
        .bind(&point.symbol_name_6h)
        .bind(&point.t_6h)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing);
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
