//! Error types for the load -> aggregate -> summarize pipeline.
//!
//! Every public operation returns one of these as a value. Lower-level
//! failures (I/O, CSV parsing, serialization) are folded into them at the
//! boundary where they occur.

use serde::ser::SerializeStruct;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    /// The source could not be read, parsed or matched against the schema.
    #[error("Failed to load '{path}': {reason}")]
    Load { path: String, reason: String },

    /// Aggregation or summarization ran over zero groups.
    #[error("No data to report: {0}")]
    EmptyResult(String),

    /// Bad call site: unknown column, invalid axis or measure/reduction pair.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InsightsError {
    pub fn load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        InsightsError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Load { .. } => "LOAD_ERROR",
            Self::EmptyResult(_) => "EMPTY_RESULT",
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::Io(_) => "IO_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Errors the presentation layer turns into a "nothing to display"
    /// message instead of a failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::EmptyResult(_))
    }
}

impl Serialize for InsightsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("InsightsError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(InsightsError::load("a.csv", "missing").error_code(), "LOAD_ERROR");
        assert_eq!(
            InsightsError::EmptyResult("x".into()).error_code(),
            "EMPTY_RESULT"
        );
        assert_eq!(
            InsightsError::InvalidParameter("x".into()).error_code(),
            "INVALID_PARAMETER"
        );
    }

    #[test]
    fn user_facing_errors() {
        assert!(InsightsError::load("a.csv", "missing").is_user_facing());
        assert!(InsightsError::EmptyResult("x".into()).is_user_facing());
        assert!(!InsightsError::InvalidParameter("x".into()).is_user_facing());
    }

    #[test]
    fn serializes_code_and_message() {
        let json = serde_json::to_string(&InsightsError::load("train.csv", "not found")).unwrap();
        assert!(json.contains("LOAD_ERROR"));
        assert!(json.contains("train.csv"));
    }
}
