use anyhow::{bail, Result};
use ledger_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::LedgerSink,
    sources::InstallationCsvFileSource,
    transform,
};
use std::{env, sync::Arc};
use substation_ledger::{db, domain::InstallationEvent, Ledger};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_installations <csv_file_path>");
    }
    let file_path = &args[1];

    // LEDGER_CONFIG can point at a backfill-specific file.
    let cfg = AppConfig::load()?;

    let pool = db::connect(&cfg.db_options()).await?;
    db::schema::create_schema(&pool).await?;
    let ledger = Arc::new(Ledger::new(pool, cfg.retry_policy()));

    let pipeline: Pipeline<_, InstallationEvent, _> = Pipeline {
        source: InstallationCsvFileSource::new(file_path),
        transforms: vec![Arc::new(transform::InstallationValidation::default())],
        sink: LedgerSink::new(ledger),
    };

    let report = pipeline.run().await?;
    tracing::info!(applied = report.applied, rejected = report.rejected, file = %file_path, "backfill finished");

    Ok(())
}
