//! Pure checks applied to submitted counts before any store is touched.

use crate::domain::MeterCounts;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be non-negative, got {value}")]
    InvalidCount { field: &'static str, value: i64 },
    #[error("registered count {registered} exceeds total installed {total_installed}")]
    RegisteredExceedsTotal { total_installed: i64, registered: i64 },
    #[error("{field} would exceed the largest storable count")]
    CountOverflow { field: &'static str },
}

impl ValidationError {
    /// Name of the submitted field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidCount { field, .. } | ValidationError::CountOverflow { field } => field,
            ValidationError::RegisteredExceedsTotal { .. } => "registered_count",
        }
    }
}

/// Rules:
/// - both counts must be non-negative;
/// - the registered count may not exceed the installed total.
pub fn validate_installation(total_installed: i64, registered_count: i64) -> Result<(), ValidationError> {
    ensure_non_negative("total_installed", total_installed)?;
    ensure_non_negative("registered_count", registered_count)?;
    ensure_registered_within_total(MeterCounts::new(total_installed, registered_count))
}

pub fn validate_registration(registered_count: i64) -> Result<(), ValidationError> {
    ensure_non_negative("registered_count", registered_count)
}

pub fn validate_technical_meters(quantity: i64, under_voltage: i64) -> Result<(), ValidationError> {
    ensure_non_negative("quantity", quantity)?;
    ensure_non_negative("under_voltage", under_voltage)
}

/// `base + delta`, rejected when either count leaves the i64 range.
pub(crate) fn add_counts(base: MeterCounts, delta: MeterCounts) -> Result<MeterCounts, ValidationError> {
    base.checked_add(delta).ok_or(ValidationError::CountOverflow {
        field: if base.total_installed.checked_add(delta.total_installed).is_none() {
            "total_installed"
        } else {
            "registered_count"
        },
    })
}

/// Invariant every stored cumulative record must satisfy.
pub(crate) fn ensure_registered_within_total(counts: MeterCounts) -> Result<(), ValidationError> {
    if counts.registered > counts.total_installed {
        return Err(ValidationError::RegisteredExceedsTotal {
            total_installed: counts.total_installed,
            registered: counts.registered,
        });
    }
    Ok(())
}

fn ensure_non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::InvalidCount { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_registered_up_to_total() {
        assert!(validate_installation(15, 12).is_ok());
        assert!(validate_installation(5, 5).is_ok());
        assert!(validate_installation(0, 0).is_ok());
    }

    #[test]
    fn rejects_negative_counts() {
        assert_eq!(
            validate_installation(-1, 0),
            Err(ValidationError::InvalidCount {
                field: "total_installed",
                value: -1
            })
        );
        assert_eq!(
            validate_installation(3, -2),
            Err(ValidationError::InvalidCount {
                field: "registered_count",
                value: -2
            })
        );
    }

    #[test]
    fn rejects_registered_above_total() {
        let err = validate_installation(10, 20).unwrap_err();
        assert_eq!(
            err,
            ValidationError::RegisteredExceedsTotal {
                total_installed: 10,
                registered: 20
            }
        );
        assert_eq!(err.field(), "registered_count");
    }

    #[test]
    fn validation_is_repeatable() {
        assert_eq!(validate_installation(10, 20), validate_installation(10, 20));
        assert_eq!(validate_installation(15, 12), validate_installation(15, 12));
    }

    #[test]
    fn overflowing_sum_names_the_field() {
        let err = add_counts(MeterCounts::new(i64::MAX, 1), MeterCounts::new(1, 0)).unwrap_err();
        assert_eq!(err, ValidationError::CountOverflow { field: "total_installed" });
        assert_eq!(
            add_counts(MeterCounts::new(3, 2), MeterCounts::new(4, 1)),
            Ok(MeterCounts::new(7, 3))
        );
    }

    #[test]
    fn technical_meters_must_be_non_negative() {
        assert!(validate_technical_meters(4, 1).is_ok());
        assert_eq!(validate_technical_meters(4, -1).unwrap_err().field(), "under_voltage");
    }
}
