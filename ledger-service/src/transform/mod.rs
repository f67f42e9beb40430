use substation_ledger::{domain::InstallationEvent, validate_installation};

use crate::pipeline::{Envelope, PipelineError, Transform};

/// Rejects events whose counts are negative or register more meters than
/// were installed. Nothing is written for a rejected event.
pub fn validate_installation_event(
    env: Envelope<InstallationEvent>,
) -> Result<Envelope<InstallationEvent>, PipelineError> {
    let e = &env.payload;
    validate_installation(e.total_installed, e.registered_count)
        .map_err(|err| PipelineError::Transform(format!("{}: {err}", env.origin)))?;
    Ok(env)
}

#[derive(Clone, Default)]
pub struct InstallationValidation;

#[async_trait::async_trait]
impl Transform<InstallationEvent, InstallationEvent> for InstallationValidation {
    async fn apply(
        &self,
        input: Envelope<InstallationEvent>,
    ) -> Result<Envelope<InstallationEvent>, PipelineError> {
        match validate_installation_event(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_installation_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
