//! Request-scoped export pipeline: async record feed, blocking workbook writer.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use exportkit_xlsx::{
    BufferPool, ExportError, ExportSession, PooledBuffer, ReportExport, SchemaCache,
    SpecAutofitCellsPolicy, SpecCancelToken, SpecExportOptions, SpecRecordSchema,
    SpecXlsxSinkOptions, XlsxSink,
    calculate_row_chunk_size, calculate_worker_limit, derive_thread_pool,
};
use futures_util::StreamExt;
use rayon::ThreadPool;
use tokio::sync::mpsc;
use tracing::{Span, debug, warn};

use crate::config::SpecServerConfig;
use crate::error::{AppError, FetchError};
use crate::records::{EnumDataset, SourcedRecord};
use crate::source::{RecordSource, RecordStream, SpecRecordFilter};
use crate::telemetry::ElapsedTimer;

/// Chunks buffered between the record feed and the writer.
const N_CHUNKS_IN_FLIGHT: usize = 2;

/// Shared, read-mostly state of the running server.
pub struct AppState<S> {
    pub source: S,
    pub cache_schema: SchemaCache,
    pub pool_buffers: Arc<BufferPool>,
    pub thread_pool: Option<Arc<ThreadPool>>,
    pub options_export: SpecExportOptions,
    pub policy_autofit: SpecAutofitCellsPolicy,
    pub fetch_timeout: Duration,
}

impl<S: RecordSource> AppState<S> {
    pub fn new(source: S, config: &SpecServerConfig) -> Self {
        let options_export = config.export_options();
        let n_workers_max = calculate_worker_limit(options_export.num_workers_max);
        let thread_pool = derive_thread_pool(n_workers_max).map(Arc::new);
        if n_workers_max > 1 && thread_pool.is_none() {
            warn!(
                workers = n_workers_max,
                "Failed to initialize thread pool; fallback to serial projection"
            );
        }

        Self {
            source,
            cache_schema: SchemaCache::new(options_export.rule_untagged),
            pool_buffers: Arc::new(BufferPool::new(
                config.buffer_capacity_bytes,
                config.buffer_pool_max,
            )),
            thread_pool,
            options_export,
            policy_autofit: config.autofit_policy(),
            fetch_timeout: config.fetch_timeout,
        }
    }
}

/// Serialized workbook ready to be sent.
#[derive(Debug)]
pub struct SpecExportedFile {
    /// Workbook bytes; the buffer returns to its pool when dropped.
    pub buffer: PooledBuffer,
    /// Attachment file name.
    pub file_name: &'static str,
    /// Run counters.
    pub report: ReportExport,
}

enum EnumChunkMessage<T> {
    Records(Vec<T>),
    End,
}

/// Cancels the token when dropped, i.e. when the request future goes away.
struct CancelOnDrop(SpecCancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Fetch every record of `T` matching `filter` and serialize them into a
/// pooled workbook buffer.
///
/// Nothing is returned until the workbook is complete; any failure or a
/// dropped future discards the partial output.
pub async fn export_dataset<S, T>(
    state: &AppState<S>,
    dataset: EnumDataset,
    filter: SpecRecordFilter,
) -> Result<SpecExportedFile, AppError>
where
    S: RecordSource,
    T: SourcedRecord,
{
    let schema = state.cache_schema.get_or_extract::<T>()?;
    let size_rows_chunk =
        calculate_row_chunk_size(schema.width(), &state.options_export.row_chunk_policy).max(1);

    let token_cancel = SpecCancelToken::new();
    let _guard_cancel = CancelOnDrop(token_cancel.clone());

    let (tx, rx) = mpsc::channel::<EnumChunkMessage<T>>(N_CHUNKS_IN_FLIGHT);
    let buffer = state.pool_buffers.acquire();
    let thread_pool = state.thread_pool.clone();
    let options_sink = SpecXlsxSinkOptions {
        policy_autofit: state.policy_autofit.clone(),
        ..SpecXlsxSinkOptions::with_sheet_name(dataset.sheet_name())
    };
    let span = Span::current();
    let handle_writer = tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        write_workbook(schema, buffer, rx, thread_pool, token_cancel, &options_sink)
    });

    let timer_fetch = ElapsedTimer::start("fetch");
    let stream_records = state.source.fetch::<T>(filter).await?;
    feed_records(stream_records, &tx, size_rows_chunk).await?;
    drop(tx);
    timer_fetch.finish();

    let (buffer, report) = handle_writer
        .await
        .map_err(|e| AppError::Internal(format!("writer task failed: {e}")))??;
    Ok(SpecExportedFile {
        buffer,
        file_name: dataset.file_name(),
        report,
    })
}

/// Forward records to the writer in chunks, ending with [`EnumChunkMessage::End`].
///
/// Returns `Ok` early when the writer hung up; its own result carries the
/// reason.
async fn feed_records<T: SourcedRecord>(
    mut stream_records: RecordStream<T>,
    tx: &mpsc::Sender<EnumChunkMessage<T>>,
    size_rows_chunk: usize,
) -> Result<(), FetchError> {
    let mut l_chunk = Vec::with_capacity(size_rows_chunk);
    while let Some(res_record) = stream_records.next().await {
        l_chunk.push(res_record?);
        if l_chunk.len() >= size_rows_chunk {
            let l_full = std::mem::replace(&mut l_chunk, Vec::with_capacity(size_rows_chunk));
            if tx.send(EnumChunkMessage::Records(l_full)).await.is_err() {
                debug!("Writer stopped; dropping remaining records");
                return Ok(());
            }
        }
    }

    if !l_chunk.is_empty() && tx.send(EnumChunkMessage::Records(l_chunk)).await.is_err() {
        return Ok(());
    }
    let _ = tx.send(EnumChunkMessage::End).await;
    Ok(())
}

fn write_workbook<T: SourcedRecord>(
    schema: Arc<SpecRecordSchema>,
    mut buffer: PooledBuffer,
    mut rx: mpsc::Receiver<EnumChunkMessage<T>>,
    thread_pool: Option<Arc<ThreadPool>>,
    token_cancel: SpecCancelToken,
    options_sink: &SpecXlsxSinkOptions,
) -> Result<(PooledBuffer, ReportExport), ExportError> {
    let timer_write = ElapsedTimer::start("write");
    let mut report = {
        let sink = XlsxSink::new(Cursor::new(&mut *buffer), &schema, options_sink)?;
        let mut session = ExportSession::new(&schema, sink, thread_pool.as_deref(), token_cancel)?;
        loop {
            match rx.blocking_recv() {
                Some(EnumChunkMessage::Records(l_records)) => session.push_chunk(&l_records)?,
                Some(EnumChunkMessage::End) => break,
                None => return Err(ExportError::Cancelled),
            }
        }
        let (_, report) = session.finish()?;
        report
    };
    report.n_bytes_out = buffer.len() as u64;
    timer_write.finish();
    Ok((buffer, report))
}
