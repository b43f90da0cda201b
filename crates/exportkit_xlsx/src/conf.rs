//! Export constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{EnumCellKind, SpecCellFormat};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Excel maximum characters in one text cell.
pub const N_LEN_EXCEL_CELL_TEXT_MAX: usize = 32_767;
/// Largest integer magnitude a spreadsheet number (f64) holds exactly (2^53).
pub const N_INT_EXACT_F64_MAX: u64 = 1 << 53;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Initial capacity of one pooled output buffer (4 MiB).
pub const N_BYTES_BUFFER_DEFAULT: usize = 4 * 1024 * 1024;
/// Idle buffers retained by a pool by default.
pub const N_BUFFERS_POOL_MAX_DEFAULT: usize = 8;
/// Buffers grown past this multiple of their initial capacity are not retained.
pub const N_BUFFER_GROWTH_RETAIN_MAX: usize = 4;

/// MIME type of an XLSX document.
pub const C_MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Canonical format preset keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnumFmtKey {
    /// Generic text cell format.
    Text,
    /// Integer number format.
    Integer,
    /// Decimal number format.
    Decimal,
    /// Date-only format.
    Date,
    /// Date and time format.
    DateTime,
    /// Header cell format.
    Header,
}

impl EnumFmtKey {
    /// Body format key used for a column of `kind`.
    pub fn from_cell_kind(kind: EnumCellKind) -> Self {
        match kind {
            EnumCellKind::Text | EnumCellKind::Boolean => Self::Text,
            EnumCellKind::Integer => Self::Integer,
            EnumCellKind::Float => Self::Decimal,
            EnumCellKind::DateTime => Self::DateTime,
        }
    }
}

/// Build default named format presets used by [`crate::writer::XlsxSink`].
pub fn derive_default_xlsx_formats() -> BTreeMap<EnumFmtKey, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(EnumFmtKey::Text, cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        EnumFmtKey::Header,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            border: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Integer,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0".to_string()),
            align: Some("right".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Decimal,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.00".to_string()),
            align: Some("right".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Date,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("yyyy-mm-dd".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::DateTime,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("yyyy-mm-dd hh:mm:ss".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}
