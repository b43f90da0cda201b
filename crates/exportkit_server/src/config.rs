//! Server configuration resolved from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use exportkit_xlsx::{
    EnumAutofitColumnsRule, EnumUntaggedFieldRule, N_BUFFERS_POOL_MAX_DEFAULT,
    N_BYTES_BUFFER_DEFAULT, SpecAutofitCellsPolicy, SpecExportOptions, SpecRowChunkPolicy,
};

use crate::error::ConfigError;

pub const C_ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const C_ENV_LISTEN_ADDR: &str = "EXPORTKIT_LISTEN_ADDR";
pub const C_ENV_DB_MAX_OPEN_CONNS: &str = "DB_MAX_OPEN_CONNS";
pub const C_ENV_DB_MAX_IDLE_CONNS: &str = "DB_MAX_IDLE_CONNS";
pub const C_ENV_DB_CONN_MAX_LIFETIME_SECS: &str = "DB_CONN_MAX_LIFETIME_SECS";
pub const C_ENV_FETCH_TIMEOUT_SECS: &str = "EXPORTKIT_FETCH_TIMEOUT_SECS";
pub const C_ENV_NUM_WORKERS: &str = "EXPORTKIT_NUM_WORKERS";
pub const C_ENV_ROW_CHUNK_SIZE: &str = "EXPORTKIT_ROW_CHUNK_SIZE";
pub const C_ENV_BUFFER_CAPACITY_BYTES: &str = "EXPORTKIT_BUFFER_CAPACITY_BYTES";
pub const C_ENV_BUFFER_POOL_MAX: &str = "EXPORTKIT_BUFFER_POOL_MAX";
pub const C_ENV_UNTAGGED_FIELDS: &str = "EXPORTKIT_UNTAGGED_FIELDS";
pub const C_ENV_AUTOFIT: &str = "EXPORTKIT_AUTOFIT";
pub const C_ENV_UPSTREAM_API_BASE_URL: &str = "UPSTREAM_API_BASE_URL";
pub const C_ENV_UPSTREAM_API_TOKEN: &str = "UPSTREAM_API_TOKEN";

const C_LISTEN_ADDR_DEFAULT: &str = "127.0.0.1:8080";
const N_DB_MAX_OPEN_CONNS_DEFAULT: u32 = 25;
const N_DB_MAX_IDLE_CONNS_DEFAULT: u32 = 5;
const N_SECS_CONN_MAX_LIFETIME_DEFAULT: u64 = 5 * 60;
const N_SECS_FETCH_TIMEOUT_DEFAULT: u64 = 5 * 60;

/// Typed server configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct SpecServerConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// HTTP bind address.
    pub listen_addr: SocketAddr,
    /// Pool max size.
    pub db_max_open_conns: u32,
    /// Pool min idle connections.
    pub db_max_idle_conns: u32,
    /// Connection max lifetime.
    pub db_conn_max_lifetime: Duration,
    /// Per-request fetch and export timeout.
    pub fetch_timeout: Duration,
    /// Projection worker cap; `None` picks from available parallelism.
    pub num_workers_max: Option<usize>,
    /// Fixed row chunk size; `None` uses the width-based policy.
    pub row_chunk_size: Option<usize>,
    /// Initial capacity of each pooled output buffer.
    pub buffer_capacity_bytes: usize,
    /// Idle output buffers retained.
    pub buffer_pool_max: usize,
    /// Header policy for untagged fields.
    pub rule_untagged: EnumUntaggedFieldRule,
    /// Column width inference: header text only, or header plus body rows.
    pub rule_autofit: EnumAutofitColumnsRule,
    /// Remote record API base URL.
    pub upstream_api_base_url: Option<String>,
    /// Bearer token for the remote record API.
    pub upstream_api_token: Option<String>,
}

impl std::fmt::Debug for SpecServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecServerConfig")
            .field("database_url", &"<redacted>")
            .field("listen_addr", &self.listen_addr)
            .field("db_max_open_conns", &self.db_max_open_conns)
            .field("db_max_idle_conns", &self.db_max_idle_conns)
            .field("db_conn_max_lifetime", &self.db_conn_max_lifetime)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("num_workers_max", &self.num_workers_max)
            .field("row_chunk_size", &self.row_chunk_size)
            .field("buffer_capacity_bytes", &self.buffer_capacity_bytes)
            .field("buffer_pool_max", &self.buffer_pool_max)
            .field("rule_untagged", &self.rule_untagged)
            .field("rule_autofit", &self.rule_autofit)
            .field("upstream_api_base_url", &self.upstream_api_base_url)
            .field(
                "upstream_api_token",
                &self.upstream_api_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl SpecServerConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url =
            read(C_ENV_DATABASE_URL).ok_or(ConfigError::MissingVar(C_ENV_DATABASE_URL))?;
        let listen_addr = parse_value(
            C_ENV_LISTEN_ADDR,
            read(C_ENV_LISTEN_ADDR).unwrap_or_else(|| C_LISTEN_ADDR_DEFAULT.to_string()),
        )?;

        let db_max_open_conns =
            parse_optional(C_ENV_DB_MAX_OPEN_CONNS, read(C_ENV_DB_MAX_OPEN_CONNS))?
                .unwrap_or(N_DB_MAX_OPEN_CONNS_DEFAULT);
        let db_max_idle_conns =
            parse_optional(C_ENV_DB_MAX_IDLE_CONNS, read(C_ENV_DB_MAX_IDLE_CONNS))?
                .unwrap_or(N_DB_MAX_IDLE_CONNS_DEFAULT);
        if db_max_open_conns == 0 {
            return Err(ConfigError::InvalidValue {
                key: C_ENV_DB_MAX_OPEN_CONNS,
                value: db_max_open_conns.to_string(),
                reason: "must be >= 1".to_string(),
            });
        }
        if db_max_idle_conns > db_max_open_conns {
            return Err(ConfigError::InvalidValue {
                key: C_ENV_DB_MAX_IDLE_CONNS,
                value: db_max_idle_conns.to_string(),
                reason: format!("must not exceed {C_ENV_DB_MAX_OPEN_CONNS}={db_max_open_conns}"),
            });
        }

        let n_secs_lifetime = parse_optional(
            C_ENV_DB_CONN_MAX_LIFETIME_SECS,
            read(C_ENV_DB_CONN_MAX_LIFETIME_SECS),
        )?
        .unwrap_or(N_SECS_CONN_MAX_LIFETIME_DEFAULT);
        let n_secs_timeout = parse_positive(
            C_ENV_FETCH_TIMEOUT_SECS,
            read(C_ENV_FETCH_TIMEOUT_SECS),
        )?
        .unwrap_or(N_SECS_FETCH_TIMEOUT_DEFAULT as usize);

        let rule_untagged = match read(C_ENV_UNTAGGED_FIELDS) {
            None => EnumUntaggedFieldRule::Identifier,
            Some(value) => parse_untagged_rule(&value)?,
        };
        let rule_autofit = match read(C_ENV_AUTOFIT) {
            None => EnumAutofitColumnsRule::Header,
            Some(value) => parse_autofit_rule(&value)?,
        };

        Ok(Self {
            database_url,
            listen_addr,
            db_max_open_conns,
            db_max_idle_conns,
            db_conn_max_lifetime: Duration::from_secs(n_secs_lifetime),
            fetch_timeout: Duration::from_secs(n_secs_timeout as u64),
            num_workers_max: parse_positive(C_ENV_NUM_WORKERS, read(C_ENV_NUM_WORKERS))?,
            row_chunk_size: parse_positive(C_ENV_ROW_CHUNK_SIZE, read(C_ENV_ROW_CHUNK_SIZE))?,
            buffer_capacity_bytes: parse_positive(
                C_ENV_BUFFER_CAPACITY_BYTES,
                read(C_ENV_BUFFER_CAPACITY_BYTES),
            )?
            .unwrap_or(N_BYTES_BUFFER_DEFAULT),
            buffer_pool_max: parse_optional(C_ENV_BUFFER_POOL_MAX, read(C_ENV_BUFFER_POOL_MAX))?
                .unwrap_or(N_BUFFERS_POOL_MAX_DEFAULT),
            rule_untagged,
            rule_autofit,
            upstream_api_base_url: read(C_ENV_UPSTREAM_API_BASE_URL)
                .map(|value| value.trim_end_matches('/').to_string()),
            upstream_api_token: read(C_ENV_UPSTREAM_API_TOKEN),
        })
    }

    /// Export options derived from this configuration.
    pub fn export_options(&self) -> SpecExportOptions {
        SpecExportOptions {
            rule_untagged: self.rule_untagged,
            row_chunk_policy: SpecRowChunkPolicy {
                fixed_size: self.row_chunk_size,
                ..SpecRowChunkPolicy::default()
            },
            num_workers_max: self.num_workers_max,
        }
    }

    /// Column autofit policy for exported sheets.
    pub fn autofit_policy(&self) -> SpecAutofitCellsPolicy {
        SpecAutofitCellsPolicy {
            rule_columns: self.rule_autofit,
            ..SpecAutofitCellsPolicy::default()
        }
    }
}

/// Load a `.env` file into the process environment.
///
/// Returns the loaded path, or the reason no file was loaded. Variables
/// already set in the environment win.
pub fn load_dotenv() -> Result<PathBuf, String> {
    dotenvy::dotenv().map_err(|e| e.to_string())
}

fn parse_value<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })
}

fn parse_optional<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map(|value| parse_value(key, value)).transpose()
}

fn parse_positive(key: &'static str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    match parse_optional::<usize>(key, value)? {
        Some(0) => Err(ConfigError::InvalidValue {
            key,
            value: "0".to_string(),
            reason: "must be >= 1".to_string(),
        }),
        other => Ok(other),
    }
}

fn parse_untagged_rule(value: &str) -> Result<EnumUntaggedFieldRule, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "identifier" => Ok(EnumUntaggedFieldRule::Identifier),
        "skip" => Ok(EnumUntaggedFieldRule::Skip),
        _ => Err(ConfigError::InvalidValue {
            key: C_ENV_UNTAGGED_FIELDS,
            value: value.to_string(),
            reason: "expected `identifier` or `skip`".to_string(),
        }),
    }
}

fn parse_autofit_rule(value: &str) -> Result<EnumAutofitColumnsRule, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "none" => Ok(EnumAutofitColumnsRule::None),
        "header" => Ok(EnumAutofitColumnsRule::Header),
        "all" => Ok(EnumAutofitColumnsRule::All),
        _ => Err(ConfigError::InvalidValue {
            key: C_ENV_AUTOFIT,
            value: value.to_string(),
            reason: "expected `none`, `header` or `all`".to_string(),
        }),
    }
}
