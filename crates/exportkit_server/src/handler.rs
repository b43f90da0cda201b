//! HTTP routes: `/download` and `/healthz`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use exportkit_xlsx::{C_MIME_XLSX, PooledBuffer};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::AppError;
use crate::export::{AppState, SpecExportedFile, export_dataset};
use crate::records::{
    Employee, EmployeeSalary, EnumDataset, EnumEmployeeFilterRule, NetflixShow, Salary, Title,
};
use crate::source::{RecordSource, SpecRecordFilter};
use crate::telemetry::ElapsedTimer;

/// Size of one response body chunk.
const N_BYTES_BODY_CHUNK: usize = 64 * 1024;

/// Build the application router.
pub fn build_router<S: RecordSource>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/download", get(download::<S>))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Raw `/download` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SpecDownloadQuery {
    pub dataset: Option<String>,
    pub employee_id: Option<String>,
}

/// Validate query parameters into a dataset and a record filter.
pub fn parse_download_query(
    query: &SpecDownloadQuery,
) -> Result<(EnumDataset, SpecRecordFilter), AppError> {
    let dataset = match query.dataset.as_deref().map(str::trim) {
        None | Some("") => EnumDataset::default(),
        Some(c_name) => c_name.parse::<EnumDataset>().map_err(AppError::Validation)?,
    };

    let employee_id = match query.employee_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(c_value) => Some(c_value.parse::<i64>().map_err(|_| {
            AppError::Validation(format!("employee_id must be an integer, got `{c_value}`"))
        })?),
    };

    match (dataset.rule_employee_filter(), employee_id) {
        (EnumEmployeeFilterRule::Required, None) => Err(AppError::Validation(format!(
            "employee_id is required for dataset {dataset}"
        ))),
        (EnumEmployeeFilterRule::Unsupported, Some(_)) => Err(AppError::Validation(format!(
            "employee_id is not supported for dataset {dataset}"
        ))),
        _ => Ok((dataset, SpecRecordFilter { employee_id })),
    }
}

async fn download<S: RecordSource>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<SpecDownloadQuery>,
) -> Result<Response, AppError> {
    let timer = ElapsedTimer::start("download");
    let (dataset, filter) = parse_download_query(&query).inspect_err(|err| {
        info!(operation = "download", error = %err, "Rejected download request");
    })?;

    let span = info_span!("export", dataset = dataset.name());
    let res_file = tokio::time::timeout(
        state.fetch_timeout,
        dispatch_export(&state, dataset, filter).instrument(span),
    )
    .await
    .unwrap_or_else(|_| Err(AppError::Timeout(state.fetch_timeout)));

    match res_file {
        Ok(file) => {
            info!(
                operation = "download",
                dataset = dataset.name(),
                elapsed_ms = timer.elapsed_ms(),
                "{}",
                file.report
            );
            for c_warning in &file.report.warnings {
                warn!(operation = "download", dataset = dataset.name(), "{c_warning}");
            }
            Ok(derive_attachment_response(file))
        }
        Err(err) => {
            error!(
                operation = "download",
                dataset = dataset.name(),
                category = err.category(),
                elapsed_ms = timer.elapsed_ms(),
                error = %err,
                "{}",
                err.public_message()
            );
            Err(err)
        }
    }
}

async fn dispatch_export<S: RecordSource>(
    state: &AppState<S>,
    dataset: EnumDataset,
    filter: SpecRecordFilter,
) -> Result<SpecExportedFile, AppError> {
    match dataset {
        EnumDataset::Salary => export_dataset::<S, Salary>(state, dataset, filter).await,
        EnumDataset::Title => export_dataset::<S, Title>(state, dataset, filter).await,
        EnumDataset::Employee => export_dataset::<S, Employee>(state, dataset, filter).await,
        EnumDataset::EmployeeSalary => {
            export_dataset::<S, EmployeeSalary>(state, dataset, filter).await
        }
        EnumDataset::NetflixShow => {
            export_dataset::<S, NetflixShow>(state, dataset, filter).await
        }
    }
}

fn derive_attachment_response(file: SpecExportedFile) -> Response {
    let n_bytes = file.buffer.len();
    let headers = [
        (header::CONTENT_TYPE, C_MIME_XLSX.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", file.file_name),
        ),
        (header::CONTENT_LENGTH, n_bytes.to_string()),
    ];
    let body = Body::from_stream(stream_buffer_chunks(file.buffer));
    (StatusCode::OK, headers, body).into_response()
}

/// Stream a pooled buffer in fixed-size chunks; the buffer is released when
/// the body finishes or the client goes away.
fn stream_buffer_chunks(
    buffer: PooledBuffer,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::unfold((buffer, 0usize), |(buffer, n_offset)| async move {
        if n_offset >= buffer.len() {
            return None;
        }
        let n_end = usize::min(n_offset + N_BYTES_BODY_CHUNK, buffer.len());
        let chunk = Bytes::copy_from_slice(&buffer[n_offset..n_end]);
        Some((Ok(chunk), (buffer, n_end)))
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::Request;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::SpecServerConfig;
    use crate::source::testing::MemoryRecordSource;
    use crate::source::{ServiceRecordSource, UpstreamRecordSource};

    fn derive_config() -> SpecServerConfig {
        SpecServerConfig::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/employees".to_string())
        })
        .expect("config")
    }

    fn derive_salaries() -> Vec<Salary> {
        let from_date = NaiveDate::from_ymd_opt(1986, 6, 26).expect("date");
        let to_date = NaiveDate::from_ymd_opt(1987, 6, 26).expect("date");
        vec![
            Salary {
                employee_id: 10001,
                amount: 60117.0,
                from_date,
                to_date,
            },
            Salary {
                employee_id: 10002,
                amount: 65828.0,
                from_date,
                to_date,
            },
        ]
    }

    fn derive_router<S: RecordSource>(source: S, config: &SpecServerConfig) -> Router {
        build_router(Arc::new(AppState::new(source, config)))
    }

    async fn send(router: Router, c_uri: &str) -> Response {
        router
            .oneshot(
                Request::builder()
                    .uri(c_uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response")
    }

    async fn read_body(response: Response) -> Bytes {
        response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let router = derive_router(MemoryRecordSource::default(), &derive_config());
        let response = send(router, "/healthz").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn download_defaults_to_salaries_attachment() {
        let config = derive_config();
        let state = Arc::new(AppState::new(
            MemoryRecordSource::default().with_records(derive_salaries()),
            &config,
        ));
        let router = build_router(Arc::clone(&state));
        let response = send(router, "/download").await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], C_MIME_XLSX);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=salaries.xlsx"
        );

        let body = read_body(response).await;
        assert!(body.starts_with(b"PK"));
        assert_eq!(
            headers[header::CONTENT_LENGTH].to_str().expect("length"),
            body.len().to_string()
        );
        assert_eq!(state.pool_buffers.idle_count(), 1);
    }

    #[tokio::test]
    async fn download_large_workbook_streams_in_chunks() {
        let mut l_salaries = Vec::new();
        for _ in 0..10_000 {
            l_salaries.extend(derive_salaries());
        }
        let router = derive_router(
            MemoryRecordSource::default().with_records(l_salaries),
            &derive_config(),
        );
        let response = send(router, "/download?dataset=salary").await;
        assert_eq!(response.status(), StatusCode::OK);
        let n_length: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .expect("length")
            .parse()
            .expect("number");
        let body = read_body(response).await;
        assert!(body.len() > N_BYTES_BODY_CHUNK);
        assert_eq!(body.len(), n_length);
    }

    #[tokio::test]
    async fn download_rejects_invalid_parameters() {
        for c_uri in [
            "/download?dataset=payroll",
            "/download?employee_id=abc",
            "/download?dataset=employee_salary",
            "/download?dataset=netflix_show&employee_id=7",
        ] {
            let router = derive_router(MemoryRecordSource::default(), &derive_config());
            let response = send(router, c_uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{c_uri}");
        }
    }

    #[tokio::test]
    async fn download_employee_salary_with_filter() {
        let router = derive_router(MemoryRecordSource::default(), &derive_config());
        let response = send(router, "/download?dataset=employee_salary&employee_id=10001").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=employee_salaries.xlsx"
        );
    }

    #[tokio::test]
    async fn download_times_out_before_writing() {
        let mut config = derive_config();
        config.fetch_timeout = Duration::from_millis(50);
        let router = derive_router(
            MemoryRecordSource::default()
                .with_records(derive_salaries())
                .with_delay(Duration::from_secs(5)),
            &config,
        );

        let response = send(router, "/download").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body(response).await;
        assert_eq!(body.as_ref(), b"Export timed out");
    }

    #[tokio::test]
    async fn download_fetch_failure_is_generic_500() {
        let router = derive_router(
            MemoryRecordSource::default()
                .with_records(derive_salaries())
                .with_failure_after(1),
            &derive_config(),
        );
        let response = send(router, "/download").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body(response).await;
        assert_eq!(body.as_ref(), b"Error fetching records");
    }

    #[tokio::test]
    async fn download_upstream_failure_is_500() {
        let app_upstream = Router::new().route(
            "/netflix-shows",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app_upstream).await;
        });

        let source_upstream =
            UpstreamRecordSource::new(format!("http://{addr}"), None, Duration::from_secs(5))
                .expect("client");
        let source = ServiceRecordSource::new(MemoryRecordSource::default(), Some(source_upstream));
        let router = derive_router(source, &derive_config());

        let response = send(router, "/download?dataset=netflix_show").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body(response).await;
        assert!(!body.windows(b"upstream down".len()).any(|w| w == b"upstream down"));
    }

    #[test]
    fn parse_download_query_accepts_filters() {
        let query = SpecDownloadQuery {
            dataset: Some("title".to_string()),
            employee_id: Some(" 10001 ".to_string()),
        };
        let (dataset, filter) = parse_download_query(&query).expect("valid");
        assert_eq!(dataset, EnumDataset::Title);
        assert_eq!(filter.employee_id, Some(10001));

        let (dataset, filter) =
            parse_download_query(&SpecDownloadQuery::default()).expect("valid");
        assert_eq!(dataset, EnumDataset::Salary);
        assert!(filter.employee_id.is_none());
    }
}
