//! Export report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counters and diagnostics for one export run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportExport {
    /// Number of records consumed from the source.
    pub cnt_records: u64,
    /// Number of data rows handed to the sink.
    pub cnt_rows_written: u64,
    /// Number of columns in the exported schema.
    pub cnt_columns: u64,
    /// Serialized output size in bytes (0 until serialized).
    pub n_bytes_out: u64,
    /// Non-fatal warnings collected during the run.
    pub warnings: Vec<String>,
}

impl ReportExport {
    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_records".to_string(), self.cnt_records);
        dict_counts.insert("cnt_rows_written".to_string(), self.cnt_rows_written);
        dict_counts.insert("cnt_columns".to_string(), self.cnt_columns);
        dict_counts.insert("n_bytes_out".to_string(), self.n_bytes_out);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} records={} rows={} columns={} bytes={} warnings={}",
            dict_counts["cnt_records"],
            dict_counts["cnt_rows_written"],
            dict_counts["cnt_columns"],
            dict_counts["n_bytes_out"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[EXPORT]"))
    }
}

/// Mutable accumulator for export statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportExportBuilder {
    /// See [`ReportExport::cnt_records`].
    pub cnt_records: u64,
    /// See [`ReportExport::cnt_rows_written`].
    pub cnt_rows_written: u64,
    /// See [`ReportExport::cnt_columns`].
    pub cnt_columns: u64,
    /// See [`ReportExport::n_bytes_out`].
    pub n_bytes_out: u64,
    /// See [`ReportExport::warnings`].
    pub warnings: Vec<String>,
}

impl ReportExportBuilder {
    /// Add `value` consumed records.
    pub fn add_records(&mut self, value: u64) {
        self.cnt_records += value;
    }

    /// Add `value` written rows.
    pub fn add_rows_written(&mut self, value: u64) {
        self.cnt_rows_written += value;
    }

    /// Record schema width.
    pub fn set_columns(&mut self, value: u64) {
        self.cnt_columns = value;
    }

    /// Record serialized output size.
    pub fn set_bytes_out(&mut self, value: u64) {
        self.n_bytes_out = value;
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportExport {
        ReportExport {
            cnt_records: self.cnt_records,
            cnt_rows_written: self.cnt_rows_written,
            cnt_columns: self.cnt_columns,
            n_bytes_out: self.n_bytes_out,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportExport, ReportExportBuilder};

    #[test]
    fn report_export_to_dict_and_format() {
        let mut builder = ReportExportBuilder::default();
        builder.add_records(3);
        builder.add_records(2);
        builder.add_rows_written(5);
        builder.set_columns(4);
        builder.set_bytes_out(1024);
        builder.add_warning("w".to_string());
        let report: ReportExport = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_records"], 5);
        assert_eq!(dict_counts["cnt_rows_written"], 5);
        assert_eq!(dict_counts["cnt_columns"], 4);
        assert_eq!(dict_counts["cnt_warnings"], 1);

        let txt = report.format("[EXPORT]");
        assert_eq!(
            txt,
            "[EXPORT] records=5 rows=5 columns=4 bytes=1024 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
    }
}
