use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use mapcast_backend::app;
use mapcast_backend::db::pg_forecast_store::PgForecastStore;
use mapcast_backend::external::yr::YrProvider;
use mapcast_backend::logging::{init_logging, LoggingConfig};
use mapcast_backend::services::forecast_sync::SyncConfig;
use mapcast_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env())?;

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let provider = YrProvider::from_env()?;

    let state = AppState {
        store: PgForecastStore::new(pool),
        forecast_provider: Arc::new(provider),
        sync: SyncConfig::from_env(),
    };
    let app = app::create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 mapcast backend running at http://{}/", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
