//! Rows-per-chunk estimation.
//!
//! The estimate is a planning hint only: it is logged before a size-bounded
//! split and never drives allocation or the split itself.

/// Estimate how many data rows fit in a chunk of `target_bytes`.
///
/// `rows_per_byte = total_rows / total_bytes`, the result is
/// `max(1, round(rows_per_byte * target_bytes))`. An input with no data
/// rows (or no bytes) yields 1.
pub fn rows_per_chunk(total_rows: u64, total_bytes: u64, target_bytes: u64) -> u64 {
    if total_rows == 0 || total_bytes == 0 {
        return 1;
    }
    let rows_per_byte = total_rows as f64 / total_bytes as f64;
    let estimate = (rows_per_byte * target_bytes as f64).round();
    (estimate as u64).max(1)
}
