//! Settings errors.

use thiserror::Error;

/// Why a settings snapshot could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not JSON, or a field has the wrong shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A field decoded but is out of range or unknown.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Shorthand for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decode_failures_map_to_json() {
        let err: SettingsError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert_matches!(err, SettingsError::Json(_));
        assert!(err.to_string().starts_with("malformed settings"));
    }

    #[test]
    fn invalid_value_names_the_field() {
        let err = SettingsError::InvalidValue("agent.maxSteps must be at least 1".into());
        assert_eq!(err.to_string(), "invalid settings value: agent.maxSteps must be at least 1");
    }
}
