mod app;
mod cache;
mod categories;
mod config;
mod db;
mod error;
mod pagination;
mod products;
mod state;
mod storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "catalog=debug,axum=info,tower_http=info,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let (app_state, pg) = state::AppState::init().await?;
    tracing::info!(
        backend = ?app_state.config.store_backend,
        cache = app_state.config.cache_enabled,
        "catalog state ready"
    );

    if let Some(pg) = pg {
        if let Err(e) = sqlx::migrate!("./migrations").run(pg.pool()).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }
    }

    app::serve(app::build_app(app_state)).await
}
