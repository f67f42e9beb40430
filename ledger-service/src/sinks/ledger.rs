use std::sync::Arc;

use futures::StreamExt;
use substation_ledger::{domain::InstallationEvent, Ledger};

use crate::pipeline::{Envelope, PipelineError, Sink, SinkReport};

/// Applies each event in its own ledger transaction.
///
/// Events rejected upstream or by the ledger (bad lines, bad counts, unknown
/// substation) are logged, counted and skipped. An unavailable source or a
/// store failure stops the run. Events already
/// applied stay committed.
pub struct LedgerSink {
    ledger: Arc<Ledger>,
}

impl LedgerSink {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Sink<InstallationEvent> for LedgerSink {
    async fn run<S>(&self, mut input: S) -> Result<SinkReport, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<InstallationEvent>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut report = SinkReport::default();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e @ PipelineError::SourceUnavailable(_)) => {
                    tracing::error!(error = %e, "source unavailable, stopping");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping event rejected upstream");
                    report.rejected += 1;
                    continue;
                }
            };

            match self.ledger.record_installation(env.payload).await {
                Ok(_) => {
                    metrics::counter!("backfill_events_applied_total").increment(1);
                    report.applied += 1;
                }
                Err(e) if e.is_rejection() => {
                    tracing::warn!(error = %e, origin = %env.origin, "ledger rejected event");
                    metrics::counter!("backfill_events_rejected_total").increment(1);
                    report.rejected += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, origin = %env.origin, "ledger write failed, stopping");
                    return Err(PipelineError::Sink(format!("{}: {e}", env.origin)));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use substation_ledger::{
        db,
        domain::{BalanceGroup, MeterCounts},
        RetryPolicy,
    };
    use time::macros::date;

    fn env(substation_id: i64, total_installed: i64, registered_count: i64) -> Result<Envelope<InstallationEvent>, PipelineError> {
        Ok(Envelope::new(
            InstallationEvent {
                substation_id,
                balance_group: BalanceGroup::Residential,
                date: date!(2023 - 06 - 01),
                total_installed,
                registered_count,
            },
            "test",
        ))
    }

    #[tokio::test]
    async fn applies_valid_events_and_counts_rejections() {
        let ledger = Arc::new(Ledger::new(db::in_memory().await.unwrap(), RetryPolicy::default()));
        let sub = ledger.create_substation("Backfill").await.unwrap();

        let items = vec![
            env(sub.id, 15, 12),
            env(sub.id, 10, 20),
            env(999, 1, 1),
            Err(PipelineError::Source("bad line".into())),
            env(sub.id, 5, 5),
        ];
        let sink = LedgerSink::new(ledger.clone());
        let report = sink.run(futures::stream::iter(items)).await.unwrap();

        assert_eq!(report, SinkReport { applied: 2, rejected: 3 });
        assert_eq!(
            ledger
                .point_as_of(sub.id, BalanceGroup::Residential, date!(2023 - 06 - 01))
                .await
                .unwrap(),
            MeterCounts::new(20, 17)
        );
    }

    #[tokio::test]
    async fn backfill_of_missing_file_fails() {
        use crate::{pipeline::Pipeline, sources::InstallationCsvFileSource, transform::InstallationValidation};

        let ledger = Arc::new(Ledger::new(db::in_memory().await.unwrap(), RetryPolicy::default()));
        let pipeline: Pipeline<_, InstallationEvent, _> = Pipeline {
            source: InstallationCsvFileSource::new("/nonexistent/installations.csv"),
            transforms: vec![Arc::new(InstallationValidation)],
            sink: LedgerSink::new(ledger),
        };

        let res = pipeline.run().await;
        assert!(matches!(res, Err(PipelineError::SourceUnavailable(_))));
    }
}
