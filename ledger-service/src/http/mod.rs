//! Thin request layer over the ledger.

mod error;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use substation_ledger::{
    db::audit::AuditEntry,
    domain::{
        BalanceGroup, InstallationEvent, MonthlyAggregate, PointRecord, RegistrationEvent, Substation, SubstationSummary,
        SummaryDates, TechnicalMeterReport, TechnicalMeterStats, YearlyAggregate,
    },
    AccumulationOutcome, Ledger,
};
use time::{Date, OffsetDateTime};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

pub fn router(ledger: Arc<Ledger>) -> Router {
    Router::new()
        .route("/substations", get(list_substations).post(create_substation))
        .route(
            "/substations/:id",
            get(get_substation).put(rename_substation).delete(delete_substation),
        )
        .route("/substations/:id/installations", post(record_installation))
        .route("/substations/:id/registrations", post(record_registration))
        .route("/substations/:id/technical-meters", post(record_technical_meters))
        .route("/substations/:id/summary", get(summary))
        .route("/substations/:id/groups/:group/points", get(point_history))
        .route("/substations/:id/groups/:group/months", get(monthly_history))
        .route("/substations/:id/groups/:group/years", get(yearly_history))
        .route("/substations/:id/audit", get(audit_trail))
        .with_state(AppState { ledger })
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

#[derive(Debug, Deserialize)]
pub struct SubstationForm {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct InstallationForm {
    pub balance_group: BalanceGroup,
    pub date: Date,
    pub total_installed: i64,
    pub registered_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationForm {
    pub balance_group: BalanceGroup,
    pub date: Date,
    pub registered_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct TechnicalMeterForm {
    pub quantity: i64,
    pub under_voltage: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub residential_date: Option<Date>,
    pub legal_date: Option<Date>,
    pub general_metering_date: Option<Date>,
}

impl SummaryParams {
    fn dates(&self, today: Date) -> SummaryDates {
        SummaryDates {
            residential: self.residential_date.unwrap_or(today),
            legal: self.legal_date.unwrap_or(today),
            general_metering: self.general_metering_date.unwrap_or(today),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DateRangeParams {
    pub from: Date,
    pub to: Date,
}

#[derive(Debug, Default, Deserialize)]
pub struct YearParams {
    pub year: Option<i32>,
}

pub async fn list_substations(State(state): State<AppState>) -> Result<Json<Vec<Substation>>, ApiError> {
    Ok(Json(state.ledger.list_substations().await?))
}

pub async fn create_substation(
    State(state): State<AppState>,
    Json(form): Json<SubstationForm>,
) -> Result<(StatusCode, Json<Substation>), ApiError> {
    let substation = state.ledger.create_substation(&form.name).await?;
    Ok((StatusCode::CREATED, Json(substation)))
}

pub async fn get_substation(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Substation>, ApiError> {
    Ok(Json(state.ledger.get_substation(id).await?))
}

pub async fn rename_substation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<SubstationForm>,
) -> Result<Json<Substation>, ApiError> {
    Ok(Json(state.ledger.rename_substation(id, &form.name).await?))
}

pub async fn delete_substation(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.ledger.delete_substation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_installation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<InstallationForm>,
) -> Result<(StatusCode, Json<AccumulationOutcome>), ApiError> {
    let event = InstallationEvent {
        substation_id: id,
        balance_group: form.balance_group,
        date: form.date,
        total_installed: form.total_installed,
        registered_count: form.registered_count,
    };

    let outcome = state.ledger.record_installation(event).await?;
    metrics::counter!("ledger_installations_recorded_total").increment(1);
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn record_registration(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<RegistrationForm>,
) -> Result<Json<Option<AccumulationOutcome>>, ApiError> {
    let event = RegistrationEvent {
        substation_id: id,
        balance_group: form.balance_group,
        date: form.date,
        registered_count: form.registered_count,
    };

    let outcome = state.ledger.record_registration(event).await?;
    if outcome.is_some() {
        metrics::counter!("ledger_registrations_recorded_total").increment(1);
    }
    Ok(Json(outcome))
}

pub async fn record_technical_meters(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<TechnicalMeterForm>,
) -> Result<Json<TechnicalMeterStats>, ApiError> {
    let report = TechnicalMeterReport {
        substation_id: id,
        quantity: form.quantity,
        under_voltage: form.under_voltage,
    };
    Ok(Json(state.ledger.record_technical_meters(report).await?))
}

pub async fn summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<SubstationSummary>, ApiError> {
    let dates = params.dates(today());
    Ok(Json(state.ledger.summary(id, dates).await?))
}

pub async fn point_history(
    State(state): State<AppState>,
    Path((id, group)): Path<(i64, BalanceGroup)>,
    Query(range): Query<DateRangeParams>,
) -> Result<Json<Vec<PointRecord>>, ApiError> {
    Ok(Json(state.ledger.point_history(id, group, range.from, range.to).await?))
}

pub async fn monthly_history(
    State(state): State<AppState>,
    Path((id, group)): Path<(i64, BalanceGroup)>,
    Query(params): Query<YearParams>,
) -> Result<Json<Vec<MonthlyAggregate>>, ApiError> {
    let year = params.year.unwrap_or_else(|| today().year());
    Ok(Json(state.ledger.monthly_history(id, group, year).await?))
}

pub async fn yearly_history(
    State(state): State<AppState>,
    Path((id, group)): Path<(i64, BalanceGroup)>,
) -> Result<Json<Vec<YearlyAggregate>>, ApiError> {
    Ok(Json(state.ledger.yearly_history(id, group).await?))
}

pub async fn audit_trail(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    state.ledger.get_substation(id).await?;
    Ok(Json(state.ledger.audit_trail(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use substation_ledger::{db, LedgerError, RetryPolicy};
    use time::macros::date;

    async fn state() -> AppState {
        let pool = db::in_memory().await.unwrap();
        AppState {
            ledger: Arc::new(Ledger::new(pool, RetryPolicy::default())),
        }
    }

    async fn substation(state: &AppState, name: &str) -> Substation {
        let (status, Json(sub)) = create_substation(
            State(state.clone()),
            Json(SubstationForm { name: name.to_string() }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        sub
    }

    #[test]
    fn summary_dates_default_to_today() {
        let params = SummaryParams {
            legal_date: Some(date!(2023 - 01 - 01)),
            ..SummaryParams::default()
        };
        let dates = params.dates(date!(2024 - 05 - 05));
        assert_eq!(dates.residential, date!(2024 - 05 - 05));
        assert_eq!(dates.legal, date!(2023 - 01 - 01));
        assert_eq!(dates.general_metering, date!(2024 - 05 - 05));
    }

    #[test]
    fn installation_form_parses_from_json() {
        let form: InstallationForm = serde_json::from_str(
            r#"{"balance_group":"legal_entity_b","date":"2023-06-01","total_installed":15,"registered_count":12}"#,
        )
        .unwrap();
        assert_eq!(form.balance_group, BalanceGroup::LegalEntityB);
        assert_eq!(form.date, date!(2023 - 06 - 01));
    }

    #[tokio::test]
    async fn installation_then_summary() {
        let state = state().await;
        let sub = substation(&state, "South-4").await;

        let (status, Json(outcome)) = record_installation(
            State(state.clone()),
            Path(sub.id),
            Json(InstallationForm {
                balance_group: BalanceGroup::Residential,
                date: date!(2023 - 06 - 01),
                total_installed: 15,
                registered_count: 12,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(outcome.point.counts.unregistered(), 3);

        let Json(summary) = summary(
            State(state.clone()),
            Path(sub.id),
            Query(SummaryParams {
                residential_date: Some(date!(2023 - 06 - 30)),
                ..SummaryParams::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(summary.residential.registered, 12);
        assert_eq!(summary.residential.unregistered, 3);

        let Json(points) = point_history(
            State(state),
            Path((sub.id, BalanceGroup::Residential)),
            Query(DateRangeParams {
                from: date!(2023 - 01 - 01),
                to: date!(2023 - 12 - 31),
            }),
        )
        .await
        .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, date!(2023 - 06 - 01));
        assert_eq!(points[0].counts.registered, 12);
    }

    #[tokio::test]
    async fn invalid_counts_are_unprocessable() {
        let state = state().await;
        let sub = substation(&state, "South-4").await;

        let err = record_installation(
            State(state.clone()),
            Path(sub.id),
            Json(InstallationForm {
                balance_group: BalanceGroup::Residential,
                date: date!(2023 - 06 - 01),
                total_installed: 10,
                registered_count: 20,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.field(), Some("registered_count"));
    }

    #[tokio::test]
    async fn missing_substation_is_not_found() {
        let state = state().await;

        let err = get_substation(State(state.clone()), Path(404)).await.unwrap_err();
        assert!(matches!(err.0, LedgerError::NotFound(404)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = delete_substation(State(state), Path(404)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn zero_registration_returns_nothing() {
        let state = state().await;
        let sub = substation(&state, "South-4").await;

        let Json(outcome) = record_registration(
            State(state),
            Path(sub.id),
            Json(RegistrationForm {
                balance_group: BalanceGroup::GeneralMeteringA,
                date: date!(2023 - 06 - 01),
                registered_count: 0,
            }),
        )
        .await
        .unwrap();
        assert!(outcome.is_none());
    }
}
