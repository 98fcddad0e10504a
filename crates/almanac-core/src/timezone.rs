use crate::error::CoreError;
use chrono_tz::Tz;
use std::str::FromStr;

/// Validate an IANA timezone name.
pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    parse_timezone(timezone).map(|_| ())
}

/// Parse an IANA timezone name.
pub fn parse_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone)
        .map_err(|_| CoreError::InvalidTimezone(format!("Invalid timezone: {}", timezone)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(validate_timezone("Not/A_Zone").is_err());
    }
}
