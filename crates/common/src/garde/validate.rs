use ::garde::{Report, Validate};
use thiserror::Error;

/// A garde report flattened into a single readable message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Validate a struct, flattening the garde report into a [`ValidationError`]
pub fn validate_struct<T>(value: &T) -> Result<(), ValidationError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| ValidationError(format_validation_errors(&report)))
}

/// Joins each `path: message` pair, dropping the path for struct-level errors
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

    #[derive(Validate)]
    struct DownlinkPortCheck {
        #[garde(range(min = 1, max = 223))]
        f_port: u8,
        #[garde(length(min = 1))]
        device_id: String,
    }

    #[test]
    fn test_validate_success() {
        let value = DownlinkPortCheck {
            f_port: 10,
            device_id: "eui-0004a30b001c0530".to_string(),
        };
        assert!(validate_struct(&value).is_ok());
    }

    #[test]
    fn test_validate_failure_names_every_field() {
        let value = DownlinkPortCheck {
            f_port: 0,
            device_id: String::new(),
        };

        let err = validate_struct(&value).unwrap_err();

        assert!(err.0.contains("f_port"));
        assert!(err.0.contains("device_id"));
    }
}
