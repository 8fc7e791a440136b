//! File naming rules for chunks, probes, and merge outputs.

use chrono::NaiveDateTime;

/// Width of the zero-padded chunk number.
pub const CHUNK_NUMBER_WIDTH: usize = 3;

/// Default output name for the marker group.
pub const DEFAULT_TRUTH_OUTPUT: &str = "merged_truth.csv";

/// Default output name for the remaining files.
pub const DEFAULT_OTHER_OUTPUT: &str = "merged_other.csv";

/// `{base}_chunk_{n:03}{ext}`; `ext` includes its leading dot (or is empty).
pub fn chunk_file_name(base: &str, ext: &str, number: u32) -> String {
    format!(
        "{}_chunk_{:0width$}{}",
        base,
        number,
        ext,
        width = CHUNK_NUMBER_WIDTH
    )
}

/// Prefix shared by every private size-probe file of one input.
///
/// Leading dot keeps probes out of directory scans that skip hidden entries.
pub fn probe_prefix(base: &str) -> String {
    format!(".{}_probe_", base)
}

/// Output file names for the two merge groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutputNames {
    pub truth: String,
    pub other: String,
}

impl MergeOutputNames {
    pub fn fixed(truth: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            truth: truth.into(),
            other: other.into(),
        }
    }

    /// `merged_{pattern}_{yyyyMMdd_HHmmss}.csv` and
    /// `merged_other_{yyyyMMdd_HHmmss}.csv`.
    pub fn timestamped(pattern: &str, at: NaiveDateTime) -> Self {
        let stamp = at.format("%Y%m%d_%H%M%S");
        Self {
            truth: format!("merged_{}_{}.csv", pattern, stamp),
            other: format!("merged_other_{}.csv", stamp),
        }
    }
}

impl Default for MergeOutputNames {
    fn default() -> Self {
        Self::fixed(DEFAULT_TRUTH_OUTPUT, DEFAULT_OTHER_OUTPUT)
    }
}
