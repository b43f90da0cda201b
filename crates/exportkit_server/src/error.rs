//! Server error taxonomy and HTTP mapping.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use exportkit_xlsx::{ExportError, SchemaError};
use thiserror::Error;

/// Invalid or missing configuration; fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    /// A variable holds a value that cannot be used.
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Parse or range failure.
        reason: String,
    },
}

/// Failure reading records from a source.
#[derive(Error, Debug)]
pub enum FetchError {
    /// No pooled connection could be obtained.
    #[error("database pool error: {0}")]
    Pool(String),
    /// Query execution or row decoding failed.
    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),
    /// The upstream request could not be completed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {status} for {url}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },
    /// An upstream payload could not be decoded into records.
    #[error("cannot decode upstream records: {0}")]
    Decode(String),
    /// The source cannot serve this record type or filter.
    #[error("{record} records are not available from {source_name}: {reason}")]
    Unsupported {
        /// Record type name.
        record: &'static str,
        /// Source name.
        source_name: &'static str,
        /// Why not.
        reason: &'static str,
    },
}

impl From<bb8::RunError<tokio_postgres::Error>> for FetchError {
    fn from(err: bb8::RunError<tokio_postgres::Error>) -> Self {
        match err {
            bb8::RunError::User(err) => Self::Query(err),
            bb8::RunError::TimedOut => Self::Pool("timed out waiting for a connection".to_string()),
        }
    }
}

/// Process startup failure.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The database or upstream client could not be initialised.
    #[error("error setting up record source: {0}")]
    Source(#[from] FetchError),
    /// Binding or serving failed.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-level failure of `/download`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid request parameter.
    #[error("{0}")]
    Validation(String),
    /// Records could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Record type metadata is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A record could not be projected; the export was aborted.
    #[error(transparent)]
    Projection(ExportError),
    /// The workbook could not be written.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// Fetch and export did not complete in time.
    #[error("export timed out after {0:?}")]
    Timeout(Duration),
    /// The export was abandoned before completion.
    #[error("export cancelled")]
    Cancelled,
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Schema(err) => Self::Schema(err),
            ExportError::Projection { .. } => Self::Projection(err),
            ExportError::Sink(message) => Self::Serialization(message),
            ExportError::Cancelled => Self::Cancelled,
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short category label used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Fetch(_) => "fetch",
            Self::Schema(_) => "schema",
            Self::Projection(_) => "projection",
            Self::Serialization(_) => "serialization",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// Client-facing message; only validation errors expose their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Fetch(_) => "Error fetching records".to_string(),
            Self::Schema(_) => "Error getting field tags".to_string(),
            Self::Projection(_) => "Error generating rows".to_string(),
            Self::Serialization(_) => "Error writing file".to_string(),
            Self::Timeout(_) => "Export timed out".to_string(),
            Self::Cancelled => "Export cancelled".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request_with_detail() {
        let err = AppError::Validation("employee_id must be an integer".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "employee_id must be an integer");
    }

    #[test]
    fn other_errors_hide_internals() {
        let err = AppError::from(ExportError::Sink("disk on fire at /tmp/x".to_string()));
        assert!(matches!(err, AppError::Serialization(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("/tmp/x"));

        let err = AppError::from(ExportError::Projection {
            record_index: 2,
            field_position: 1,
            display_name: "Amount".to_string(),
            reason: "unknown field".to_string(),
        });
        assert_eq!(err.category(), "projection");
        assert!(err.to_string().contains("record 2"));

        let err = AppError::from(ExportError::Schema(SchemaError::MissingRecordType));
        assert!(matches!(err, AppError::Schema(_)));
        assert!(matches!(
            AppError::from(ExportError::Cancelled),
            AppError::Cancelled
        ));
    }
}
