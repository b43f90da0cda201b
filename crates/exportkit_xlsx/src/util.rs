//! Stateless helper utilities used by the export kernel.

use chrono::{NaiveDateTime, NaiveTime};

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::SpecRowChunkPolicy;

////////////////////////////////////////////////////////////////////////////////
// #region RowChunking

/// Derive row chunk size from schema width and chunk policy.
pub fn calculate_row_chunk_size(width_schema: usize, policy: &SpecRowChunkPolicy) -> usize {
    if let Some(n_fixed_size) = policy.fixed_size {
        return n_fixed_size;
    }
    if width_schema >= policy.width_large {
        return policy.size_large;
    }
    if width_schema >= policy.width_medium {
        return policy.size_medium;
    }
    policy.size_default
}

/// Resolve projection worker count, clamped to available parallelism.
pub fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TextNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Check a display-name annotation; `Err` carries the reason.
pub fn validate_display_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("display name is blank".to_string());
    }
    if let Some(chr) = name.chars().find(|chr| chr.is_control()) {
        return Err(format!("display name contains control character {chr:?}"));
    }
    Ok(())
}

/// Approximate rendered width; non-ASCII glyphs count as 1.6 columns.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Whether a timestamp carries no time-of-day part.
pub fn is_midnight(value: &NaiveDateTime) -> bool {
    value.time() == NaiveTime::MIN
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region IndexCasting

/// Convert a zero-based row index to the worksheet row type.
pub fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

/// Convert a zero-based column index to the worksheet column type.
pub fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
