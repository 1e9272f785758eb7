//! Garde validation helpers shared by service requests and command parameters.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a request, mapping a garde report to `DomainError::ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

/// Join report entries as `path: message`, comma separated
fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[derive(Validate)]
    struct AcknowledgeLike {
        #[garde(length(min = 1))]
        device_id: String,
        #[garde(length(min = 1))]
        command: String,
    }

    #[test]
    fn test_validate_success() {
        let request = AcknowledgeLike {
            device_id: "SN1".to_string(),
            command: "LOCK_DEVICE".to_string(),
        };
        assert!(validate_struct(&request).is_ok());
    }

    #[test]
    fn test_validate_reports_every_failing_field() {
        let request = AcknowledgeLike {
            device_id: "".to_string(),
            command: "".to_string(),
        };
        match validate_struct(&request) {
            Err(DomainError::ValidationError(msg)) => {
                assert!(msg.contains("device_id"));
                assert!(msg.contains("command"));
            }
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }
}
