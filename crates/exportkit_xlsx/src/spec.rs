//! Shared export specification models and error types.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region CellValues

/// Scalar kind declared for one exported column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumCellKind {
    /// Free text.
    Text,
    /// Signed integer.
    Integer,
    /// Floating-point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Calendar date or timestamp.
    DateTime,
}

/// Normalized cell value during the projection/write pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Timestamp value (dates are promoted to midnight).
    DateTime(NaiveDateTime),
}

impl EnumCellValue {
    /// Kind of a non-null value; `None` for a blank cell.
    pub fn kind(&self) -> Option<EnumCellKind> {
        match self {
            Self::None => None,
            Self::String(_) => Some(EnumCellKind::Text),
            Self::Integer(_) => Some(EnumCellKind::Integer),
            Self::Float(_) => Some(EnumCellKind::Float),
            Self::Boolean(_) => Some(EnumCellKind::Boolean),
            Self::DateTime(_) => Some(EnumCellKind::DateTime),
        }
    }

    /// Whether this value may be written into a column of `kind`.
    ///
    /// Blank cells fit every column.
    pub fn is_compatible_with(&self, kind: EnumCellKind) -> bool {
        self.kind().is_none_or(|kind_value| kind_value == kind)
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for EnumCellValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<i32> for EnumCellValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f32> for EnumCellValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for EnumCellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDateTime> for EnumCellValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<NaiveDate> for EnumCellValue {
    fn from(value: NaiveDate) -> Self {
        Self::DateTime(value.and_time(NaiveTime::MIN))
    }
}

impl<T: Into<EnumCellValue>> From<Option<T>> for EnumCellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordTypeDeclarations

/// Shape of one declared record field.
#[derive(Debug, Clone, Copy)]
pub enum EnumFieldKind {
    /// Leaf column holding a scalar of the given kind.
    Scalar(EnumCellKind),
    /// Sub-record embedded by value; flattened in place.
    Record(fn() -> &'static SpecRecordType),
}

/// One statically declared record field.
#[derive(Debug, Clone, Copy)]
pub struct SpecFieldDecl {
    /// Accessor identifier used to reach the field on a record instance.
    pub ident: &'static str,
    /// Column header annotation; `None` when the field is untagged.
    pub display_name: Option<&'static str>,
    /// Scalar kind or embedded record.
    pub kind: EnumFieldKind,
}

impl SpecFieldDecl {
    /// Scalar field carrying a display name.
    pub const fn scalar(
        ident: &'static str,
        display_name: &'static str,
        kind: EnumCellKind,
    ) -> Self {
        Self {
            ident,
            display_name: Some(display_name),
            kind: EnumFieldKind::Scalar(kind),
        }
    }

    /// Scalar field without a display name.
    pub const fn untagged(ident: &'static str, kind: EnumCellKind) -> Self {
        Self {
            ident,
            display_name: None,
            kind: EnumFieldKind::Scalar(kind),
        }
    }

    /// Embedded sub-record.
    pub const fn embedded(ident: &'static str, record: fn() -> &'static SpecRecordType) -> Self {
        Self {
            ident,
            display_name: None,
            kind: EnumFieldKind::Record(record),
        }
    }
}

/// Static description of a record type's fields in declaration order.
#[derive(Debug)]
pub struct SpecRecordType {
    /// Unique type name; also the schema cache key.
    pub name: &'static str,
    /// Declared fields.
    pub fields: &'static [SpecFieldDecl],
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordAccess

/// Value reached by one accessor step.
pub enum EnumFieldRef<'a> {
    /// Scalar leaf.
    Cell(EnumCellValue),
    /// Embedded sub-record to descend into.
    Record(&'a dyn RecordFields),
}

/// Read-only accessor over a record's declared fields.
pub trait RecordFields {
    /// Resolve one accessor step; `None` when `ident` is unknown.
    fn field(&self, ident: &str) -> Option<EnumFieldRef<'_>>;
}

/// Record type that can be exported as one spreadsheet row.
pub trait TabularRecord: RecordFields + Send + Sync {
    /// Static field declaration of this type.
    fn record_type() -> &'static SpecRecordType;
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SchemaAndGrid

/// Policy for fields that carry no display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumUntaggedFieldRule {
    /// Use the field identifier as its header (default).
    #[default]
    Identifier,
    /// Leave the field out of the export.
    Skip,
}

/// One exported leaf column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecFieldDescriptor {
    /// Column header text.
    pub display_name: String,
    /// Accessor steps from the record root to the leaf.
    pub path: Vec<&'static str>,
    /// Declared scalar kind.
    pub kind: EnumCellKind,
}

impl SpecFieldDescriptor {
    /// Dotted path text, e.g. `salary.amount`.
    pub fn path_text(&self) -> String {
        self.path.join(".")
    }
}

/// Ordered, flattened field descriptors of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecRecordSchema {
    /// Source record type name.
    pub record_name: &'static str,
    /// Leaf columns in export order.
    pub fields: Vec<SpecFieldDescriptor>,
}

impl SpecRecordSchema {
    /// Number of columns.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Header row.
    pub fn header(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| field.display_name.clone())
            .collect()
    }

    /// Column kinds in order.
    pub fn kinds(&self) -> Vec<EnumCellKind> {
        self.fields.iter().map(|field| field.kind).collect()
    }
}

/// Header plus data rows, column-aligned to a schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecGrid {
    /// Header row.
    pub header: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<EnumCellValue>>,
}

impl SpecGrid {
    /// Number of data rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.header.len()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Bold style.
    pub bold: Option<bool>,
    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Thin border on all sides.
    pub border: Option<bool>,
    /// Number format code.
    pub num_format: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Policy for selecting row chunk size in the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecRowChunkPolicy {
    /// Width threshold for a wide schema.
    pub width_large: usize,
    /// Width threshold for a medium schema.
    pub width_medium: usize,
    /// Chunk size used when width >= `width_large`.
    pub size_large: usize,
    /// Chunk size used when width >= `width_medium`.
    pub size_medium: usize,
    /// Default chunk size.
    pub size_default: usize,
    /// Force exact chunk size when set.
    pub fixed_size: Option<usize>,
}

impl Default for SpecRowChunkPolicy {
    fn default() -> Self {
        Self {
            width_large: 256,
            width_medium: 32,
            size_large: 500,
            size_medium: 2_000,
            size_default: 5_000,
            fixed_size: None,
        }
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only (default).
    #[default]
    Header,
    /// Infer width from header and body cells.
    All,
}

/// Autofit policy for the XLSX sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::Header,
            height_body_inferred_max: Some(1_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Options shared by every export run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecExportOptions {
    /// Header policy for untagged fields.
    pub rule_untagged: EnumUntaggedFieldRule,
    /// Row chunking policy.
    pub row_chunk_policy: SpecRowChunkPolicy,
    /// Maximum projection workers; `None` picks from available parallelism.
    pub num_workers_max: Option<usize>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Malformed record type metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// No record type descriptor was supplied.
    #[error("Record type descriptor is absent.")]
    MissingRecordType,
    /// A display-name annotation is blank or contains control characters.
    #[error("Malformed display name on {record}.{field}: {reason}")]
    MalformedAnnotation {
        /// Record type name.
        record: &'static str,
        /// Field identifier.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// A declared field has an empty identifier.
    #[error("Empty field identifier in {record} at position {position}.")]
    EmptyIdentifier {
        /// Record type name.
        record: &'static str,
        /// Zero-based declaration position.
        position: usize,
    },
    /// A record type embeds itself, directly or transitively.
    #[error("Record type {record} embeds itself via `{path}`.")]
    RecursiveEmbedding {
        /// Record type name.
        record: &'static str,
        /// Dotted path of the offending embedding.
        path: String,
    },
    /// No exportable columns remain after applying the untagged rule.
    #[error("Record type {record} has no exportable fields.")]
    EmptySchema {
        /// Record type name.
        record: &'static str,
    },
    /// Flattened width exceeds the sheet column limit.
    #[error("Record type {record} flattens to {width} columns; limit is {limit}.")]
    TooManyColumns {
        /// Record type name.
        record: &'static str,
        /// Flattened width.
        width: usize,
        /// Column limit.
        limit: usize,
    },
}

/// Export pipeline failure.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Schema derivation failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A record could not be projected through a field path.
    #[error(
        "Cannot project record {record_index}, field {field_position} ({display_name}): {reason}"
    )]
    Projection {
        /// Global zero-based record index.
        record_index: usize,
        /// Zero-based column position in the schema.
        field_position: usize,
        /// Column header of the failing field.
        display_name: String,
        /// Failure detail.
        reason: String,
    },
    /// The sink rejected a row or failed to serialize.
    #[error("Sink error: {0}")]
    Sink(String),
    /// The export was cancelled by its caller.
    #[error("Export cancelled.")]
    Cancelled,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
