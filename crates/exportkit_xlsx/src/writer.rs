//! Tabular sinks: the XLSX workbook writer and an in-memory grid collector.

use std::collections::BTreeMap;
use std::io::{Seek, Write};

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};

use crate::conf::{
    EnumFmtKey, N_INT_EXACT_F64_MAX, N_LEN_EXCEL_CELL_TEXT_MAX, N_NROWS_EXCEL_MAX,
    derive_default_xlsx_formats,
};
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellKind, EnumCellValue, ExportError, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecGrid, SpecRecordSchema,
};
use crate::util::{
    cast_col_num, cast_row_num, estimate_unicode_string_width, is_midnight, sanitize_sheet_name,
};

/// Ordered row consumer fed by [`crate::project::ExportSession`].
///
/// Call order is `write_header` once, `write_row` any number of times, then
/// `finish`. Every row must be as wide as the header.
pub trait TabularSink {
    /// Write the header row.
    fn write_header(&mut self, header: &[String]) -> Result<(), ExportError>;
    /// Append one data row.
    fn write_row(&mut self, row: &[EnumCellValue]) -> Result<(), ExportError>;
    /// Complete the container; no rows may follow.
    fn finish(&mut self) -> Result<(), ExportError>;
    /// Number of data rows accepted so far.
    fn rows_written(&self) -> usize;
    /// Non-fatal adjustments made while writing.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

fn validate_row_width(
    n_width_header: Option<usize>,
    row: &[EnumCellValue],
    n_rows_written: usize,
) -> Result<usize, ExportError> {
    let Some(n_width) = n_width_header else {
        return Err(ExportError::Sink(
            "Row written before header.".to_string(),
        ));
    };
    if row.len() != n_width {
        return Err(ExportError::Sink(format!(
            "Ragged row {n_rows_written}: {} cells, header has {n_width}.",
            row.len()
        )));
    }
    Ok(n_width)
}

////////////////////////////////////////////////////////////////////////////////
// #region GridSink

/// Sink collecting the full grid in memory.
#[derive(Debug, Default)]
pub struct GridSink {
    header: Option<Vec<String>>,
    rows: Vec<Vec<EnumCellValue>>,
    if_finished: bool,
}

impl GridSink {
    /// Take the collected grid.
    pub fn into_grid(self) -> SpecGrid {
        SpecGrid {
            header: self.header.unwrap_or_default(),
            rows: self.rows,
        }
    }
}

impl TabularSink for GridSink {
    fn write_header(&mut self, header: &[String]) -> Result<(), ExportError> {
        if self.header.is_some() {
            return Err(ExportError::Sink("Header already written.".to_string()));
        }
        self.header = Some(header.to_vec());
        Ok(())
    }

    fn write_row(&mut self, row: &[EnumCellValue]) -> Result<(), ExportError> {
        if self.if_finished {
            return Err(ExportError::Sink("Cannot write after finish().".to_string()));
        }
        validate_row_width(
            self.header.as_ref().map(Vec::len),
            row,
            self.rows.len(),
        )?;
        self.rows.push(row.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.if_finished = true;
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows.len()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XlsxSink

/// XLSX sink options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxSinkOptions {
    /// Worksheet name (sanitized before use).
    pub sheet_name: String,
    /// Named format presets.
    pub dict_fmts: BTreeMap<EnumFmtKey, SpecCellFormat>,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Freeze panes below the header row.
    pub if_freeze_header: bool,
}

impl Default for SpecXlsxSinkOptions {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            dict_fmts: derive_default_xlsx_formats(),
            policy_autofit: SpecAutofitCellsPolicy::default(),
            if_freeze_header: true,
        }
    }
}

impl SpecXlsxSinkOptions {
    /// Default options with the given sheet name.
    pub fn with_sheet_name(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            ..Self::default()
        }
    }

    fn format_for(&self, key: EnumFmtKey) -> Format {
        self.dict_fmts
            .get(&key)
            .map(derive_rust_xlsx_format)
            .unwrap_or_default()
    }
}

/// Outcome of writing one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumCellWrite {
    /// Value written as given.
    Exact,
    /// Integer beyond exact `f64` range, written as text.
    IntegerAsText,
    /// Text cut to the Excel cell limit.
    TextTruncated,
}

/// Single-sheet workbook sink serialized into `W` on [`TabularSink::finish`].
///
/// The worksheet runs in constant-memory mode: each completed row is flushed
/// to a temporary file, so memory stays flat regardless of row count. `W`
/// receives nothing before `finish`, so an aborted export leaves it untouched.
///
/// Cell policies:
/// - integers with magnitude above 2^53 are written as text to keep every digit;
/// - text longer than 32,767 characters is truncated;
/// - non-finite floats are written blank.
///
/// Adjusted cells are counted and reported through [`TabularSink::warnings`].
pub struct XlsxSink<W: Write + Seek + Send> {
    workbook: Workbook,
    writer_out: Option<W>,
    policy_autofit: SpecAutofitCellsPolicy,
    l_kinds: Vec<EnumCellKind>,
    l_fmt_by_col: Vec<Format>,
    fmt_date: Format,
    fmt_header: Format,
    l_width_by_col: Vec<usize>,
    n_width_header: Option<usize>,
    n_rows_written: usize,
    cnt_ints_as_text: usize,
    cnt_texts_truncated: usize,
    if_finished: bool,
}

impl<W: Write + Seek + Send> XlsxSink<W> {
    /// Create a sink for rows of `schema`, serialized into `writer_out`.
    pub fn new(
        writer_out: W,
        schema: &SpecRecordSchema,
        options: &SpecXlsxSinkOptions,
    ) -> Result<Self, ExportError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet_with_constant_memory();
        worksheet
            .set_name(sanitize_sheet_name(&options.sheet_name, "_"))
            .map_err(derive_xlsx_error)?;
        if options.if_freeze_header {
            worksheet
                .set_freeze_panes(1, 0)
                .map_err(derive_xlsx_error)?;
        }

        let l_kinds = schema.kinds();
        let l_fmt_by_col = l_kinds
            .iter()
            .map(|kind| options.format_for(EnumFmtKey::from_cell_kind(*kind)))
            .collect();

        Ok(Self {
            workbook,
            writer_out: Some(writer_out),
            policy_autofit: options.policy_autofit.clone(),
            l_width_by_col: vec![0; l_kinds.len()],
            l_kinds,
            l_fmt_by_col,
            fmt_date: options.format_for(EnumFmtKey::Date),
            fmt_header: options.format_for(EnumFmtKey::Header),
            n_width_header: None,
            n_rows_written: 0,
            cnt_ints_as_text: 0,
            cnt_texts_truncated: 0,
            if_finished: false,
        })
    }

    fn if_autofit_body(&self) -> bool {
        self.policy_autofit.rule_columns == EnumAutofitColumnsRule::All
            && self
                .policy_autofit
                .height_body_inferred_max
                .is_none_or(|n_max| self.n_rows_written < n_max)
    }

    /// Final column widths: inferred width plus padding, clamped to policy.
    fn derive_column_widths(&self) -> Vec<usize> {
        let n_min = usize::max(1, self.policy_autofit.width_cell_min);
        let n_max = usize::min(255, usize::max(n_min, self.policy_autofit.width_cell_max));
        let n_pad = self.policy_autofit.width_cell_padding;
        self.l_width_by_col
            .iter()
            .map(|n_width| usize::min(n_max, usize::max(n_min, n_width + n_pad)))
            .collect()
    }

    fn apply_autofit(&mut self) -> Result<(), ExportError> {
        if self.policy_autofit.rule_columns == EnumAutofitColumnsRule::None {
            return Ok(());
        }
        let l_widths = self.derive_column_widths();
        let worksheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(derive_xlsx_error)?;
        for (n_idx_col, n_width_final) in l_widths.into_iter().enumerate() {
            worksheet
                .set_column_width(
                    cast_col_num(n_idx_col).map_err(ExportError::Sink)?,
                    n_width_final as f64,
                )
                .map_err(derive_xlsx_error)?;
        }
        Ok(())
    }
}

impl<W: Write + Seek + Send> TabularSink for XlsxSink<W> {
    fn write_header(&mut self, header: &[String]) -> Result<(), ExportError> {
        if self.n_width_header.is_some() {
            return Err(ExportError::Sink("Header already written.".to_string()));
        }
        if header.len() != self.l_kinds.len() {
            return Err(ExportError::Sink(format!(
                "Header has {} cells, schema has {} columns.",
                header.len(),
                self.l_kinds.len()
            )));
        }

        let worksheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(derive_xlsx_error)?;
        for (n_idx_col, c_name) in header.iter().enumerate() {
            let n_col = cast_col_num(n_idx_col).map_err(ExportError::Sink)?;
            if c_name.is_empty() {
                worksheet
                    .write_blank(0, n_col, &self.fmt_header)
                    .map_err(derive_xlsx_error)?;
            } else {
                worksheet
                    .write_string_with_format(0, n_col, c_name, &self.fmt_header)
                    .map_err(derive_xlsx_error)?;
            }
            if self.policy_autofit.rule_columns != EnumAutofitColumnsRule::None {
                self.l_width_by_col[n_idx_col] = estimate_unicode_string_width(c_name);
            }
        }

        self.n_width_header = Some(header.len());
        Ok(())
    }

    fn write_row(&mut self, row: &[EnumCellValue]) -> Result<(), ExportError> {
        if self.if_finished {
            return Err(ExportError::Sink("Cannot write after finish().".to_string()));
        }
        validate_row_width(self.n_width_header, row, self.n_rows_written)?;

        let n_row_idx = self.n_rows_written + 1;
        if n_row_idx >= N_NROWS_EXCEL_MAX {
            return Err(ExportError::Sink(format!(
                "Excel row limit exceeded: {N_NROWS_EXCEL_MAX} rows including header."
            )));
        }

        let if_autofit_body = self.if_autofit_body();
        let worksheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(derive_xlsx_error)?;
        for (n_idx_col, value) in row.iter().enumerate() {
            let format = match value {
                EnumCellValue::DateTime(val) if is_midnight(val) => &self.fmt_date,
                _ => &self.l_fmt_by_col[n_idx_col],
            };
            match write_cell_with_format(worksheet, n_row_idx, n_idx_col, value, format)? {
                EnumCellWrite::Exact => {}
                EnumCellWrite::IntegerAsText => self.cnt_ints_as_text += 1,
                EnumCellWrite::TextTruncated => self.cnt_texts_truncated += 1,
            }

            if if_autofit_body {
                self.l_width_by_col[n_idx_col] =
                    usize::max(self.l_width_by_col[n_idx_col], estimate_width_len(value));
            }
        }

        self.n_rows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        if self.if_finished {
            return Ok(());
        }
        if self.n_width_header.is_none() {
            return Err(ExportError::Sink(
                "Cannot finish before header.".to_string(),
            ));
        }
        let Some(writer_out) = self.writer_out.take() else {
            return Err(ExportError::Sink("Output writer already consumed.".to_string()));
        };

        self.apply_autofit()?;
        self.workbook
            .save_to_writer(writer_out)
            .map_err(derive_xlsx_error)?;

        self.if_finished = true;
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.n_rows_written
    }

    fn warnings(&self) -> Vec<String> {
        let mut l_warnings = Vec::new();
        if self.cnt_ints_as_text > 0 {
            l_warnings.push(format!(
                "{} integer cell(s) beyond 2^53 written as text.",
                self.cnt_ints_as_text
            ));
        }
        if self.cnt_texts_truncated > 0 {
            l_warnings.push(format!(
                "{} text cell(s) truncated to {N_LEN_EXCEL_CELL_TEXT_MAX} characters.",
                self.cnt_texts_truncated
            ));
        }
        l_warnings
    }
}

/// Estimate displayed width units for one cell value.
///
/// Used by autofit inference logic.
pub fn estimate_width_len(value: &EnumCellValue) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::String(s) => estimate_unicode_string_width(s),
        EnumCellValue::Integer(n) => n.to_string().len(),
        EnumCellValue::Float(n) => format!("{n:.2}").len(),
        EnumCellValue::Boolean(_) => 5,
        EnumCellValue::DateTime(val) => {
            if is_midnight(val) {
                10
            } else {
                19
            }
        }
    }
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<EnumCellWrite, ExportError> {
    let n_row = cast_row_num(row_idx).map_err(ExportError::Sink)?;
    let n_col = cast_col_num(col_idx).map_err(ExportError::Sink)?;
    let mut outcome = EnumCellWrite::Exact;
    match value {
        EnumCellValue::None => {
            worksheet
                .write_blank(n_row, n_col, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::String(val) => {
            if val.chars().count() > N_LEN_EXCEL_CELL_TEXT_MAX {
                let c_cut: String = val.chars().take(N_LEN_EXCEL_CELL_TEXT_MAX).collect();
                worksheet
                    .write_string_with_format(n_row, n_col, &c_cut, format)
                    .map_err(derive_xlsx_error)?;
                outcome = EnumCellWrite::TextTruncated;
            } else {
                worksheet
                    .write_string_with_format(n_row, n_col, val, format)
                    .map_err(derive_xlsx_error)?;
            }
        }
        EnumCellValue::Integer(val) => {
            if val.unsigned_abs() > N_INT_EXACT_F64_MAX {
                worksheet
                    .write_string_with_format(n_row, n_col, val.to_string(), format)
                    .map_err(derive_xlsx_error)?;
                outcome = EnumCellWrite::IntegerAsText;
            } else {
                worksheet
                    .write_number_with_format(n_row, n_col, *val as f64, format)
                    .map_err(derive_xlsx_error)?;
            }
        }
        EnumCellValue::Float(val) => {
            if val.is_finite() {
                worksheet
                    .write_number_with_format(n_row, n_col, *val, format)
                    .map_err(derive_xlsx_error)?;
            } else {
                worksheet
                    .write_blank(n_row, n_col, format)
                    .map_err(derive_xlsx_error)?;
            }
        }
        EnumCellValue::Boolean(val) => {
            worksheet
                .write_boolean_with_format(n_row, n_col, *val, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::DateTime(val) => {
            worksheet
                .write_datetime_with_format(n_row, n_col, val, format)
                .map_err(derive_xlsx_error)?;
        }
    }
    Ok(outcome)
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if spec.border.unwrap_or(false) {
        format = format.set_border(FormatBorder::Thin);
    }

    format
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn derive_xlsx_error(err: XlsxError) -> ExportError {
    ExportError::Sink(format!("xlsx write error: {err}"))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::NaiveDate;

    use super::*;
    use crate::spec::SpecFieldDescriptor;

    fn derive_schema() -> SpecRecordSchema {
        SpecRecordSchema {
            record_name: "Salary",
            fields: vec![
                SpecFieldDescriptor {
                    display_name: "Employee ID".to_string(),
                    path: vec!["employee_id"],
                    kind: EnumCellKind::Integer,
                },
                SpecFieldDescriptor {
                    display_name: "Amount".to_string(),
                    path: vec!["amount"],
                    kind: EnumCellKind::Float,
                },
                SpecFieldDescriptor {
                    display_name: "From Date".to_string(),
                    path: vec!["from_date"],
                    kind: EnumCellKind::DateTime,
                },
            ],
        }
    }

    fn derive_row(n_id: i64) -> Vec<EnumCellValue> {
        vec![
            EnumCellValue::Integer(n_id),
            EnumCellValue::Float(1000.5),
            EnumCellValue::from(NaiveDate::from_ymd_opt(1990, 1, 1).expect("date")),
        ]
    }

    #[test]
    fn xlsx_sink_writes_zip_container() {
        let schema = derive_schema();
        let mut v_out = Vec::new();
        {
            let mut sink = XlsxSink::new(
                Cursor::new(&mut v_out),
                &schema,
                &SpecXlsxSinkOptions::with_sheet_name("Salaries"),
            )
            .expect("sink");
            sink.write_header(&schema.header()).expect("header");
            sink.write_row(&derive_row(1)).expect("row");
            sink.write_row(&derive_row(2)).expect("row");
            assert_eq!(sink.rows_written(), 2);
            sink.finish().expect("finish");
            sink.finish().expect("finish is idempotent");
        }
        assert!(v_out.starts_with(b"PK"));
    }

    #[test]
    fn xlsx_sink_rejects_ragged_rows_and_missing_header() {
        let schema = derive_schema();
        let mut v_out = Vec::new();
        let mut sink = XlsxSink::new(
            Cursor::new(&mut v_out),
            &schema,
            &SpecXlsxSinkOptions::default(),
        )
        .expect("sink");

        let err = sink.write_row(&derive_row(1)).expect_err("no header yet");
        assert!(matches!(err, ExportError::Sink(_)));

        sink.write_header(&schema.header()).expect("header");
        let err = sink
            .write_row(&[EnumCellValue::Integer(1)])
            .expect_err("ragged row");
        assert!(err.to_string().contains("Ragged row 0"));
        assert_eq!(sink.rows_written(), 0);
    }

    #[test]
    fn xlsx_sink_rejects_header_width_mismatch() {
        let schema = derive_schema();
        let mut v_out = Vec::new();
        let mut sink = XlsxSink::new(
            Cursor::new(&mut v_out),
            &schema,
            &SpecXlsxSinkOptions::default(),
        )
        .expect("sink");
        let err = sink
            .write_header(&["Only".to_string()])
            .expect_err("header mismatch");
        assert!(matches!(err, ExportError::Sink(_)));
    }

    #[test]
    fn grid_sink_collects_rows() {
        let mut sink = GridSink::default();
        sink.write_header(&["A".to_string(), "B".to_string()])
            .expect("header");
        sink.write_row(&[EnumCellValue::Integer(1), EnumCellValue::None])
            .expect("row");
        sink.finish().expect("finish");
        assert!(sink.write_row(&[EnumCellValue::None, EnumCellValue::None]).is_err());

        let grid = sink.into_grid();
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.height(), 1);
    }

    fn derive_name_schema() -> SpecRecordSchema {
        SpecRecordSchema {
            record_name: "Employee",
            fields: vec![SpecFieldDescriptor {
                display_name: "Name".to_string(),
                path: vec!["name"],
                kind: EnumCellKind::Text,
            }],
        }
    }

    fn derive_name_sink<'a>(
        v_out: &'a mut Vec<u8>,
        rule_columns: EnumAutofitColumnsRule,
    ) -> XlsxSink<Cursor<&'a mut Vec<u8>>> {
        let schema = derive_name_schema();
        let options = SpecXlsxSinkOptions {
            policy_autofit: SpecAutofitCellsPolicy {
                rule_columns,
                height_body_inferred_max: Some(1),
                ..SpecAutofitCellsPolicy::default()
            },
            ..SpecXlsxSinkOptions::default()
        };
        let mut sink = XlsxSink::new(Cursor::new(v_out), &schema, &options).expect("sink");
        sink.write_header(&schema.header()).expect("header");
        sink.write_row(&[EnumCellValue::from("x".repeat(30))])
            .expect("row");
        sink.write_row(&[EnumCellValue::from("y".repeat(50))])
            .expect("row");
        sink
    }

    #[test]
    fn xlsx_sink_autofit_header_ignores_body() {
        let mut v_out = Vec::new();
        let mut sink = derive_name_sink(&mut v_out, EnumAutofitColumnsRule::Header);
        // "Name" (4) + padding 2 is below the minimum width of 8.
        assert_eq!(sink.derive_column_widths(), vec![8]);
        sink.finish().expect("finish");
    }

    #[test]
    fn xlsx_sink_autofit_all_widens_from_sampled_rows() {
        let mut v_out = Vec::new();
        let mut sink = derive_name_sink(&mut v_out, EnumAutofitColumnsRule::All);
        // Only the first body row is sampled: 30 + padding 2.
        assert_eq!(sink.derive_column_widths(), vec![32]);
        sink.finish().expect("finish");
        drop(sink);
        assert!(v_out.starts_with(b"PK"));
    }

    #[test]
    fn xlsx_sink_keeps_large_integers_and_truncates_long_text() {
        let schema = SpecRecordSchema {
            record_name: "Event",
            fields: vec![
                SpecFieldDescriptor {
                    display_name: "Id".to_string(),
                    path: vec!["id"],
                    kind: EnumCellKind::Integer,
                },
                SpecFieldDescriptor {
                    display_name: "Payload".to_string(),
                    path: vec!["payload"],
                    kind: EnumCellKind::Text,
                },
            ],
        };
        let mut v_out = Vec::new();
        let mut sink = XlsxSink::new(
            Cursor::new(&mut v_out),
            &schema,
            &SpecXlsxSinkOptions::default(),
        )
        .expect("sink");
        sink.write_header(&schema.header()).expect("header");
        sink.write_row(&[
            EnumCellValue::Integer(1 << 53),
            EnumCellValue::from("short"),
        ])
        .expect("row");
        assert!(sink.warnings().is_empty());

        sink.write_row(&[
            EnumCellValue::Integer(i64::MAX),
            EnumCellValue::from("z".repeat(N_LEN_EXCEL_CELL_TEXT_MAX + 10)),
        ])
        .expect("oversized cells are adjusted, not rejected");
        sink.write_row(&[EnumCellValue::Integer(i64::MIN), EnumCellValue::None])
            .expect("row");
        sink.finish().expect("finish");

        assert_eq!(
            sink.warnings(),
            vec![
                "2 integer cell(s) beyond 2^53 written as text.".to_string(),
                "1 text cell(s) truncated to 32767 characters.".to_string(),
            ]
        );
        drop(sink);
        assert!(v_out.starts_with(b"PK"));
    }

    #[test]
    fn write_cell_reports_adjustments() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let format = Format::new();
        let write = |worksheet: &mut Worksheet, value: EnumCellValue| {
            write_cell_with_format(worksheet, 1, 0, &value, &format).expect("write")
        };

        assert_eq!(write(worksheet, EnumCellValue::Integer(42)), EnumCellWrite::Exact);
        assert_eq!(
            write(worksheet, EnumCellValue::Integer(-(1 << 53) - 1)),
            EnumCellWrite::IntegerAsText
        );
        assert_eq!(
            write(worksheet, EnumCellValue::from("é".repeat(N_LEN_EXCEL_CELL_TEXT_MAX))),
            EnumCellWrite::Exact
        );
        assert_eq!(
            write(
                worksheet,
                EnumCellValue::from("é".repeat(N_LEN_EXCEL_CELL_TEXT_MAX + 1))
            ),
            EnumCellWrite::TextTruncated
        );
        assert_eq!(write(worksheet, EnumCellValue::Float(f64::NAN)), EnumCellWrite::Exact);
    }

    #[test]
    fn header_preset_has_bold_thin_border() {
        let dict_fmts = derive_default_xlsx_formats();
        let fmt_header = &dict_fmts[&EnumFmtKey::Header];
        assert_eq!(fmt_header.bold, Some(true));
        assert_eq!(fmt_header.border, Some(true));
        assert_eq!(
            derive_rust_xlsx_format(fmt_header),
            Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
        );
    }

    #[test]
    fn estimate_width_len_by_kind() {
        assert_eq!(estimate_width_len(&EnumCellValue::None), 0);
        assert_eq!(estimate_width_len(&EnumCellValue::Integer(12345)), 5);
        assert_eq!(estimate_width_len(&EnumCellValue::Float(3.14159)), 4);
        assert_eq!(
            estimate_width_len(&EnumCellValue::from(
                NaiveDate::from_ymd_opt(2020, 5, 1).expect("date")
            )),
            10
        );
    }
}
