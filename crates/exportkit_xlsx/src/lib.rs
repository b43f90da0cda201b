//! `exportkit_xlsx` v1:
//! Record-to-spreadsheet export kernel.
//!
//! Module layout:
//! - `conf`    : constants and default presets
//! - `spec`    : specs/models/options/errors
//! - `schema`  : record type declaration -> ordered column schema
//! - `project` : record -> row projection and the chunked export session
//! - `writer`  : tabular sinks (XLSX workbook, in-memory grid)
//! - `pool`    : reusable output buffers
//! - `report`  : export run counters
//! - `util`    : pure helper functions
pub mod conf;
pub mod pool;
pub mod project;
pub mod report;
pub mod schema;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    C_MIME_XLSX, EnumFmtKey, N_BUFFERS_POOL_MAX_DEFAULT, N_BYTES_BUFFER_DEFAULT,
    N_INT_EXACT_F64_MAX, N_LEN_EXCEL_CELL_TEXT_MAX, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX,
    N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
pub use pool::{BufferPool, PooledBuffer};
pub use project::{
    ExportSession, SpecCancelToken, derive_thread_pool, project_record, project_rows,
};
pub use report::{ReportExport, ReportExportBuilder};
pub use schema::{SchemaCache, extract_schema};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellKind, EnumCellValue, EnumFieldKind, EnumFieldRef,
    EnumUntaggedFieldRule, ExportError, RecordFields, SchemaError, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecExportOptions, SpecFieldDecl, SpecFieldDescriptor, SpecGrid,
    SpecRecordSchema, SpecRecordType, SpecRowChunkPolicy, TabularRecord,
};
pub use util::{calculate_row_chunk_size, calculate_worker_limit, sanitize_sheet_name};
pub use writer::{GridSink, SpecXlsxSinkOptions, TabularSink, XlsxSink};
