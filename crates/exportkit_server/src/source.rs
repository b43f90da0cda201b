//! Record sources: Postgres, the upstream record API, and routing between them.

use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::config::SpecServerConfig;
use crate::error::FetchError;
use crate::records::SourcedRecord;

/// Stream of decoded records; dropping it releases the underlying request.
pub type RecordStream<T> = BoxStream<'static, Result<T, FetchError>>;

/// Postgres connection pool.
pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Optional narrowing of a record fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecRecordFilter {
    /// Only records of this employee.
    pub employee_id: Option<i64>,
}

/// Async provider of typed records.
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    /// Start fetching records of type `T` matching `filter`.
    async fn fetch<T: SourcedRecord>(
        &self,
        filter: SpecRecordFilter,
    ) -> Result<RecordStream<T>, FetchError>;
}

////////////////////////////////////////////////////////////////////////////////
// #region Postgres

/// Records read from Postgres through a `bb8` pool.
#[derive(Clone)]
pub struct PgRecordSource {
    pool: PgPool,
}

impl PgRecordSource {
    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the pool from configuration and open the idle connections.
    pub async fn connect(config: &SpecServerConfig) -> Result<Self, FetchError> {
        let manager =
            PostgresConnectionManager::new_from_stringlike(config.database_url.as_str(), NoTls)?;
        let pool = Pool::builder()
            .max_size(config.db_max_open_conns)
            .min_idle(Some(config.db_max_idle_conns))
            .max_lifetime(Some(config.db_conn_max_lifetime))
            .build(manager)
            .await?;
        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    async fn fetch<T: SourcedRecord>(
        &self,
        filter: SpecRecordFilter,
    ) -> Result<RecordStream<T>, FetchError> {
        let (c_sql, l_params) = match filter.employee_id {
            None => (T::C_SQL_SELECT, Vec::new()),
            Some(n_employee_id) => {
                let Some(c_sql) = T::C_SQL_SELECT_BY_EMPLOYEE else {
                    return Err(FetchError::Unsupported {
                        record: T::record_type().name,
                        source_name: "postgres",
                        reason: "no employee relation",
                    });
                };
                (c_sql, vec![n_employee_id])
            }
        };

        let conn = self.pool.get_owned().await?;
        debug!(record = T::record_type().name, "Querying postgres");
        let stream_rows = conn
            .query_raw(
                c_sql,
                l_params.iter().map(|n_value| n_value as &(dyn ToSql + Sync)),
            )
            .await?;

        // The pooled connection stays checked out until the stream is dropped.
        let stream_records = stream_rows.map(move |res_row| {
            let _conn = &conn;
            res_row
                .and_then(|row| T::from_pg_row(&row))
                .map_err(FetchError::from)
        });
        Ok(stream_records.boxed())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Upstream

/// Records served as a JSON array by a remote HTTP API.
#[derive(Debug, Clone)]
pub struct UpstreamRecordSource {
    client: reqwest::Client,
    c_url_base: String,
    token: Option<String>,
}

impl UpstreamRecordSource {
    /// Create a client for `c_url_base` with a request timeout.
    pub fn new(
        c_url_base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            c_url_base: c_url_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Create from configuration; `None` when no base URL is configured.
    pub fn from_config(config: &SpecServerConfig) -> Result<Option<Self>, FetchError> {
        config
            .upstream_api_base_url
            .as_ref()
            .map(|c_url_base| {
                Self::new(
                    c_url_base.as_str(),
                    config.upstream_api_token.clone(),
                    config.fetch_timeout,
                )
            })
            .transpose()
    }
}

#[async_trait]
impl RecordSource for UpstreamRecordSource {
    async fn fetch<T: SourcedRecord>(
        &self,
        filter: SpecRecordFilter,
    ) -> Result<RecordStream<T>, FetchError> {
        let c_record = T::record_type().name;
        let Some(c_path) = T::C_UPSTREAM_PATH else {
            return Err(FetchError::Unsupported {
                record: c_record,
                source_name: "upstream",
                reason: "no upstream path",
            });
        };
        if filter.employee_id.is_some() {
            return Err(FetchError::Unsupported {
                record: c_record,
                source_name: "upstream",
                reason: "employee filter not supported",
            });
        }

        let c_url = format!("{}/{c_path}", self.c_url_base);
        let mut request = self.client.get(&c_url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        debug!(record = c_record, url = %c_url, "Requesting upstream records");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
                url: c_url,
            });
        }

        let bytes = response.bytes().await?;
        let l_records: Vec<T> =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(stream::iter(l_records.into_iter().map(Ok)).boxed())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Routing

/// Routes record types that declare an upstream path to the upstream source
/// when one is configured; everything else goes to the default source.
pub struct ServiceRecordSource<D, U> {
    source_default: D,
    source_upstream: Option<U>,
}

impl<D: RecordSource, U: RecordSource> ServiceRecordSource<D, U> {
    pub fn new(source_default: D, source_upstream: Option<U>) -> Self {
        Self {
            source_default,
            source_upstream,
        }
    }
}

#[async_trait]
impl<D: RecordSource, U: RecordSource> RecordSource for ServiceRecordSource<D, U> {
    async fn fetch<T: SourcedRecord>(
        &self,
        filter: SpecRecordFilter,
    ) -> Result<RecordStream<T>, FetchError> {
        match &self.source_upstream {
            Some(source_upstream) if T::C_UPSTREAM_PATH.is_some() => {
                source_upstream.fetch::<T>(filter).await
            }
            _ => self.source_default.fetch::<T>(filter).await,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////


#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use futures_util::TryStreamExt;

    use super::testing::MemoryRecordSource;
    use super::*;
    use crate::records::{NetflixShow, Salary};

    async fn spawn_upstream(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    fn derive_show_json() -> &'static str {
        r#"[{"show_id":"s1","type":"Movie","title":"Dick Johnson Is Dead","director":null,
            "cast_members":null,"country":"United States","date_added":"2021-09-25",
            "release_year":2020,"rating":"PG-13","duration":"90 min",
            "listed_in":"Documentaries","description":"A film."}]"#
    }

    #[tokio::test]
    async fn upstream_source_decodes_records_and_sends_token() {
        let app = Router::new().route(
            "/netflix-shows",
            get(|headers: HeaderMap| async move {
                let if_authorized = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    == Some("Bearer t0k3n");
                if if_authorized {
                    (StatusCode::OK, derive_show_json())
                } else {
                    (StatusCode::UNAUTHORIZED, "")
                }
            }),
        );
        let addr = spawn_upstream(app).await;
        let source = UpstreamRecordSource::new(
            format!("http://{addr}/"),
            Some("t0k3n".to_string()),
            Duration::from_secs(5),
        )
        .expect("client");

        let l_shows: Vec<NetflixShow> = source
            .fetch::<NetflixShow>(SpecRecordFilter::default())
            .await
            .expect("fetch")
            .try_collect()
            .await
            .expect("records");
        assert_eq!(l_shows.len(), 1);
        assert_eq!(l_shows[0].show_id, "s1");
    }

    #[tokio::test]
    async fn upstream_source_non_success_is_fetch_error() {
        let app = Router::new().route(
            "/netflix-shows",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let addr = spawn_upstream(app).await;
        let source =
            UpstreamRecordSource::new(format!("http://{addr}"), None, Duration::from_secs(5))
                .expect("client");

        let err = source
            .fetch::<NetflixShow>(SpecRecordFilter::default())
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, FetchError::UpstreamStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn upstream_source_rejects_types_without_path() {
        let source =
            UpstreamRecordSource::new("http://127.0.0.1:9", None, Duration::from_secs(1))
                .expect("client");
        let err = source
            .fetch::<Salary>(SpecRecordFilter::default())
            .await
            .err()
            .expect("must fail");
        assert!(matches!(err, FetchError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn service_source_routes_by_upstream_path() {
        let show: NetflixShow = serde_json::from_str::<Vec<NetflixShow>>(derive_show_json())
            .expect("decode")
            .remove(0);
        let mut show_local = show.clone();
        show_local.show_id = "local".to_string();
        let salary = Salary {
            employee_id: 1,
            amount: 10.0,
            from_date: chrono::NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"),
            to_date: chrono::NaiveDate::from_ymd_opt(2001, 1, 1).expect("date"),
        };

        let source_default = MemoryRecordSource::default()
            .with_records(vec![salary.clone()])
            .with_records(vec![show_local]);
        let source_upstream = MemoryRecordSource::default().with_records(vec![show]);
        let source = ServiceRecordSource::new(source_default, Some(source_upstream));

        let l_shows: Vec<NetflixShow> = source
            .fetch::<NetflixShow>(SpecRecordFilter::default())
            .await
            .expect("fetch")
            .try_collect()
            .await
            .expect("records");
        assert_eq!(l_shows[0].show_id, "s1");

        let l_salaries: Vec<Salary> = source
            .fetch::<Salary>(SpecRecordFilter::default())
            .await
            .expect("fetch")
            .try_collect()
            .await
            .expect("records");
        assert_eq!(l_salaries, vec![salary]);
    }
}
