//! `exportkit_server` v1:
//! HTTP service exporting database records as XLSX attachments.
//!
//! Module layout:
//! - `config`    : environment configuration
//! - `error`     : error taxonomy and HTTP mapping
//! - `records`   : exported record types and datasets
//! - `source`    : Postgres / upstream record sources
//! - `export`    : request-scoped export pipeline and shared state
//! - `handler`   : axum routes
//! - `telemetry` : tracing setup and timing
pub mod config;
pub mod error;
pub mod export;
pub mod handler;
pub mod records;
pub mod source;
pub mod telemetry;

pub use config::SpecServerConfig;
pub use error::{AppError, ConfigError, FetchError, StartupError};
pub use export::{AppState, SpecExportedFile, export_dataset};
pub use handler::build_router;
pub use records::{EnumDataset, SourcedRecord};
pub use source::{
    PgRecordSource, RecordSource, RecordStream, ServiceRecordSource, SpecRecordFilter,
    UpstreamRecordSource,
};
