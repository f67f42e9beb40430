use anyhow::Result;
use ledger_service::{config::AppConfig, http, metrics_server, observability};
use std::{net::SocketAddr, sync::Arc};
use substation_ledger::{db, Ledger};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = db::connect(&cfg.db_options()).await?;
    db::schema::create_schema(&pool).await?;
    let ledger = Arc::new(Ledger::new(pool, cfg.retry_policy()));

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ledger http listener started");

    axum::serve(listener, http::router(ledger).into_make_service()).await?;

    Ok(())
}
