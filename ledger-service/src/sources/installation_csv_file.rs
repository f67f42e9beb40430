use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use substation_ledger::domain::{BalanceGroup, InstallationEvent};
use time::{macros::format_description, Date};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// CSV backfill source for `InstallationEvent`.
///
/// Expected header columns (by name):
/// - substation_id
/// - balance_group (stored name, e.g. `legal_entity_a`)
/// - date (`YYYY-MM-DD`)
/// - total_installed
/// - registered_count (optional, defaults to 0)
pub struct InstallationCsvFileSource {
    path: PathBuf,
}

impl InstallationCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn parse_count(name: &str, raw: &str) -> Result<i64, PipelineError> {
    raw.trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid {name} '{raw}': {e}")))
}

fn record_to_event(record: &StringRecord, headers: &StringRecord) -> Result<InstallationEvent, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    let substation_id = parse_count("substation_id", get("substation_id")?)?;

    let group_str = get("balance_group")?;
    let balance_group: BalanceGroup = group_str
        .parse()
        .map_err(|e| PipelineError::Source(format!("{e}")))?;

    let date_str = get("date")?;
    let date = Date::parse(date_str.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| PipelineError::Source(format!("invalid date '{date_str}': {e}")))?;

    let total_installed = parse_count("total_installed", get("total_installed")?)?;
    let registered_count = match get("registered_count") {
        Ok(raw) if !raw.trim().is_empty() => parse_count("registered_count", raw)?,
        _ => 0,
    };

    Ok(InstallationEvent {
        substation_id,
        balance_group,
        date,
        total_installed,
        registered_count,
    })
}

#[async_trait::async_trait]
impl Source<InstallationEvent> for InstallationCsvFileSource {
    async fn stream(&self) -> EnvelopeStream<InstallationEvent> {
        // Blocking reader; backfill files are read once by a single task.
        // A malformed line is reported downstream and reading continues; a
        // file that cannot be opened or has no readable header ends the run.
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::SourceUnavailable(format!("failed to open CSV file {}: {e}", path.display())));
                    return;
                }
            };
            let mut rdr = csv::Reader::from_reader(file);
            let headers = match rdr.headers() {
                Ok(h) => h.clone(),
                Err(e) => {
                    yield Err(PipelineError::SourceUnavailable(format!("failed to read CSV headers of {}: {e}", path.display())));
                    return;
                }
            };

            for (idx, result) in rdr.records().enumerate() {
                // Header is line 1.
                let origin = format!("{}:{}", path.display(), idx + 2);
                let parsed = result
                    .map_err(|e| PipelineError::Source(format!("{origin}: failed to read CSV record: {e}")))
                    .and_then(|record| {
                        record_to_event(&record, &headers)
                            .map_err(|e| PipelineError::Source(format!("{origin}: {e}")))
                    });

                match parsed {
                    Ok(event) => {
                        yield Ok(Envelope::new(event, origin));
                    }
                    Err(e) => {
                        metrics::counter!("backfill_csv_parse_errors_total").increment(1);
                        yield Err(e);
                    }
                }
            }
        };

        Box::pin(s)
    }
}
