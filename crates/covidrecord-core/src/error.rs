use thiserror::Error;

/// Errors raised while parsing FHIR primitive values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid FHIR date: {0}")]
    InvalidDate(String),

    #[error("Invalid FHIR DateTime: {0}")]
    InvalidDateTime(String),
}

impl CoreError {
    pub fn invalid_date(date: impl Into<String>) -> Self {
        Self::InvalidDate(date.into())
    }

    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_date_error() {
        let err = CoreError::invalid_date("2021-13-01");
        assert_eq!(err.to_string(), "Invalid FHIR date: 2021-13-01");
    }

    #[test]
    fn test_invalid_date_time_error() {
        let err = CoreError::invalid_date_time("yesterday");
        assert_eq!(err.to_string(), "Invalid FHIR DateTime: yesterday");
    }
}
