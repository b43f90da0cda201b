//! Record-to-row projection and the chunked export session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::report::{ReportExport, ReportExportBuilder};
use crate::spec::{
    EnumCellValue, EnumFieldRef, ExportError, RecordFields, SchemaError, SpecGrid,
    SpecRecordSchema, TabularRecord,
};
use crate::writer::{GridSink, TabularSink};

////////////////////////////////////////////////////////////////////////////////
// #region Cancellation

/// Shared flag asking a running export to stop.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct SpecCancelToken {
    flag: Arc<AtomicBool>,
}

impl SpecCancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Projection

fn resolve_field_path(
    record: &dyn RecordFields,
    path: &[&'static str],
) -> Result<EnumCellValue, String> {
    let Some((c_leaf, l_steps)) = path.split_last() else {
        return Err("empty field path".to_string());
    };

    let mut record_current = record;
    for c_step in l_steps {
        match record_current.field(c_step) {
            Some(EnumFieldRef::Record(record_child)) => record_current = record_child,
            Some(EnumFieldRef::Cell(_)) => {
                return Err(format!("`{c_step}` is a scalar, expected an embedded record"));
            }
            None => return Err(format!("unknown field `{c_step}`")),
        }
    }

    match record_current.field(c_leaf) {
        Some(EnumFieldRef::Cell(value)) => Ok(value),
        Some(EnumFieldRef::Record(_)) => Err(format!(
            "`{c_leaf}` is an embedded record, expected a scalar"
        )),
        None => Err(format!("unknown field `{c_leaf}`")),
    }
}

/// Project one record into a row aligned with `schema`.
///
/// `record_index` is only used to label a [`ExportError::Projection`].
pub fn project_record(
    schema: &SpecRecordSchema,
    record: &dyn RecordFields,
    record_index: usize,
) -> Result<Vec<EnumCellValue>, ExportError> {
    let mut l_row = Vec::with_capacity(schema.width());
    for (n_pos, field) in schema.fields.iter().enumerate() {
        let derive_err = |reason: String| ExportError::Projection {
            record_index,
            field_position: n_pos,
            display_name: field.display_name.clone(),
            reason,
        };

        let value = resolve_field_path(record, &field.path).map_err(derive_err)?;
        if !value.is_compatible_with(field.kind) {
            return Err(derive_err(format!(
                "value {value:?} does not match declared kind {:?}",
                field.kind
            )));
        }
        l_row.push(value);
    }
    Ok(l_row)
}

/// Project `records` into an in-memory grid (header plus one row per record).
pub fn project_rows<T: TabularRecord>(
    schema: &SpecRecordSchema,
    records: &[T],
) -> Result<SpecGrid, ExportError> {
    let mut session =
        ExportSession::new(schema, GridSink::default(), None, SpecCancelToken::new())?;
    session.push_chunk(records)?;
    let (sink, _) = session.finish()?;
    Ok(sink.into_grid())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportSession

/// Build a projection thread pool, or `None` when `n_workers_max <= 1` or the
/// pool cannot be created (callers then project serially).
pub fn derive_thread_pool(n_workers_max: usize) -> Option<ThreadPool> {
    if n_workers_max <= 1 {
        return None;
    }
    ThreadPoolBuilder::new()
        .num_threads(n_workers_max)
        .thread_name(|n_idx| format!("exportkit-project-{n_idx}"))
        .build()
        .ok()
}

/// Incremental export into a [`TabularSink`].
///
/// The header is written on construction. Each [`ExportSession::push_chunk`]
/// projects one chunk (in parallel when a pool is given) and writes its rows
/// in record order. A failing chunk writes nothing.
pub struct ExportSession<'a, S: TabularSink> {
    schema: &'a SpecRecordSchema,
    sink: S,
    thread_pool: Option<&'a ThreadPool>,
    token_cancel: SpecCancelToken,
    builder_report: ReportExportBuilder,
    n_records_seen: usize,
}

impl<'a, S: TabularSink> ExportSession<'a, S> {
    /// Start a session and write the header row.
    pub fn new(
        schema: &'a SpecRecordSchema,
        mut sink: S,
        thread_pool: Option<&'a ThreadPool>,
        token_cancel: SpecCancelToken,
    ) -> Result<Self, ExportError> {
        if schema.fields.is_empty() {
            return Err(SchemaError::EmptySchema {
                record: schema.record_name,
            }
            .into());
        }
        sink.write_header(&schema.header())?;

        let mut builder_report = ReportExportBuilder::default();
        builder_report.set_columns(schema.width() as u64);
        Ok(Self {
            schema,
            sink,
            thread_pool,
            token_cancel,
            builder_report,
            n_records_seen: 0,
        })
    }

    /// Project and write one chunk of records.
    ///
    /// Record indices in errors are global across chunks. When several records
    /// fail, the lowest index is reported.
    pub fn push_chunk<T: TabularRecord>(&mut self, records: &[T]) -> Result<(), ExportError> {
        if self.token_cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let schema = self.schema;
        let token_cancel = &self.token_cancel;
        let n_idx_base = self.n_records_seen;
        let project = |n_idx: usize, record: &T| {
            if token_cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            project_record(schema, record, n_idx_base + n_idx)
        };

        let l_results: Vec<Result<Vec<EnumCellValue>, ExportError>> = match self.thread_pool {
            Some(thread_pool) if records.len() > 1 => thread_pool.install(|| {
                records
                    .par_iter()
                    .enumerate()
                    .map(|(n_idx, record)| project(n_idx, record))
                    .collect()
            }),
            _ => records
                .iter()
                .enumerate()
                .map(|(n_idx, record)| project(n_idx, record))
                .collect(),
        };
        let l_rows = l_results.into_iter().collect::<Result<Vec<_>, _>>()?;

        if self.token_cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        for row in &l_rows {
            self.sink.write_row(row)?;
        }

        self.n_records_seen += records.len();
        self.builder_report.add_records(records.len() as u64);
        Ok(())
    }

    /// Record a non-fatal warning in the final report.
    pub fn add_warning(&mut self, warning: String) {
        self.builder_report.add_warning(warning);
    }

    /// Records consumed so far.
    pub fn records_seen(&self) -> usize {
        self.n_records_seen
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Finish the sink and return it with the run report.
    ///
    /// Warnings raised by the sink are appended to the report.
    pub fn finish(mut self) -> Result<(S, ReportExport), ExportError> {
        if self.token_cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        self.sink.finish()?;
        self.builder_report
            .add_rows_written(self.sink.rows_written() as u64);
        for c_warning in self.sink.warnings() {
            self.builder_report.add_warning(c_warning);
        }
        Ok((self.sink, self.builder_report.build()))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
