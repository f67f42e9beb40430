use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use substation_ledger::LedgerError;

/// Maps ledger failures onto HTTP responses. Rejections carry the offending
/// field so a form can show the message next to it; store failures are
/// logged and answered with a generic message.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::Validation(_) | LedgerError::InvalidName(_) | LedgerError::UnknownBalanceGroup(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::DuplicateName(_) => StatusCode::CONFLICT,
            LedgerError::PropagationIncomplete { .. } | LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match &self.0 {
            LedgerError::Validation(v) => Some(v.field()),
            LedgerError::InvalidName(_) | LedgerError::DuplicateName(_) => Some("name"),
            LedgerError::UnknownBalanceGroup(_) => Some("balance_group"),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            metrics::counter!("ledger_write_failures_total").increment(1);
            let body = serde_json::json!({ "error": "internal server error" });
            return (status, Json(body)).into_response();
        }

        let body = serde_json::json!({
            "error": self.0.to_string(),
            "field": self.field(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use substation_ledger::ValidationError;

    #[test]
    fn rejections_map_to_client_errors() {
        let err = ApiError::from(LedgerError::Validation(ValidationError::RegisteredExceedsTotal {
            total_installed: 10,
            registered: 20,
        }));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.field(), Some("registered_count"));

        assert_eq!(ApiError::from(LedgerError::NotFound(3)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(LedgerError::DuplicateName("North".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn propagation_failure_is_a_server_error() {
        let err = ApiError::from(LedgerError::PropagationIncomplete {
            store: "month",
            expected: 3,
            updated: 2,
        });
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
