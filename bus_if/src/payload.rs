//! Textual payload encodings
//!
//! Every message on the bus carries a single textual value: a real number on
//! the clock and velocity topics, a boolean token on the enable topic. These
//! functions are the only place payload text is interpreted, so a malformed
//! message is always rejected with a [`PayloadParseError`] before it can
//! touch any control-loop state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error produced when a payload cannot be interpreted.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadParseError {
    #[error("Payload {0:?} is not a real number")]
    NotAReal(String),

    #[error("Payload {0:?} is not a recognised boolean token")]
    NotABoolToken(String),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse a payload as a finite real number.
///
/// Non-finite values are rejected, a NaN or infinite sample would poison the
/// controller's accumulators.
pub fn parse_real(payload: &str) -> Result<f64, PayloadParseError> {
    match payload.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PayloadParseError::NotAReal(payload.to_string())),
    }
}

/// Parse a payload as a boolean token.
///
/// Recognised tokens (case-insensitive): `true`/`1`/`on` and
/// `false`/`0`/`off`.
pub fn parse_bool_token(payload: &str) -> Result<bool, PayloadParseError> {
    match payload.trim().to_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(PayloadParseError::NotABoolToken(payload.to_string())),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_real() {
        assert_eq!(parse_real("1.5"), Ok(1.5));
        assert_eq!(parse_real(" -0.25 "), Ok(-0.25));
        assert_eq!(parse_real("42"), Ok(42.0));

        assert!(parse_real("abc").is_err());
        assert!(parse_real("").is_err());
        assert!(parse_real("NaN").is_err());
        assert!(parse_real("inf").is_err());
    }

    #[test]
    fn test_parse_bool_token() {
        assert_eq!(parse_bool_token("true"), Ok(true));
        assert_eq!(parse_bool_token("TRUE"), Ok(true));
        assert_eq!(parse_bool_token("1"), Ok(true));
        assert_eq!(parse_bool_token(" On "), Ok(true));

        assert_eq!(parse_bool_token("false"), Ok(false));
        assert_eq!(parse_bool_token("0"), Ok(false));
        assert_eq!(parse_bool_token("OFF"), Ok(false));

        assert!(parse_bool_token("yes").is_err());
        assert!(parse_bool_token("2").is_err());
        assert!(parse_bool_token("").is_err());
    }
}
