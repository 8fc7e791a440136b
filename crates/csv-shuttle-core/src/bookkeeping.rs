//! Merge provenance ("bookkeeping") columns.
//!
//! A fixed set of column names is reserved for merge provenance. Before a
//! table joins an aggregate, every reserved column it already carries is
//! stripped, and only then are fresh values injected (when enabled). This
//! keeps a merged output that is fed back into another merge from growing
//! duplicate provenance columns.

use serde::Serialize;

use crate::table::Table;

/// One reserved provenance column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookkeepingColumn {
    SourceFile,
    SourcePath,
    FileSize,
    MergeTimestamp,
    ContainerName,
}

impl BookkeepingColumn {
    /// Every reserved column, in injection order.
    pub const ALL: [BookkeepingColumn; 5] = [
        BookkeepingColumn::SourceFile,
        BookkeepingColumn::SourcePath,
        BookkeepingColumn::ContainerName,
        BookkeepingColumn::FileSize,
        BookkeepingColumn::MergeTimestamp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookkeepingColumn::SourceFile => "source_file",
            BookkeepingColumn::SourcePath => "source_path",
            BookkeepingColumn::FileSize => "file_size",
            BookkeepingColumn::MergeTimestamp => "merge_timestamp",
            BookkeepingColumn::ContainerName => "container_name",
        }
    }
}

/// True when `name` is one of the reserved provenance column names.
pub fn is_bookkeeping(name: &str) -> bool {
    BookkeepingColumn::ALL.iter().any(|c| c.as_str() == name)
}

/// Where one table came from, as recorded in the injected columns.
#[derive(Debug, Clone)]
pub struct Provenance {
    /// Basename of the source file.
    pub file_name: String,
    /// Path relative to the enumeration scope root.
    pub relative_path: String,
    /// Size of the source file in bytes.
    pub size: u64,
    /// Remote container, when the file came from object storage.
    pub container: Option<String>,
    /// ISO-8601 timestamp shared by every file of one merge run.
    pub merged_at: String,
}

impl Provenance {
    fn value_for(&self, column: BookkeepingColumn) -> String {
        match column {
            BookkeepingColumn::SourceFile => self.file_name.clone(),
            BookkeepingColumn::SourcePath => self.relative_path.clone(),
            BookkeepingColumn::FileSize => self.size.to_string(),
            BookkeepingColumn::MergeTimestamp => self.merged_at.clone(),
            BookkeepingColumn::ContainerName => self.container.clone().unwrap_or_default(),
        }
    }
}

/// Which provenance columns a merge run injects.
///
/// An empty plan disables injection; stripping always happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPlan {
    columns: Vec<BookkeepingColumn>,
}

impl MetadataPlan {
    /// No injection.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Standard plan: `source_file` and `source_path`, plus `container_name`
    /// for remote scopes. `extended` adds `file_size` and `merge_timestamp`.
    pub fn standard(remote: bool, extended: bool) -> Self {
        let columns = BookkeepingColumn::ALL
            .iter()
            .copied()
            .filter(|c| match c {
                BookkeepingColumn::SourceFile | BookkeepingColumn::SourcePath => true,
                BookkeepingColumn::ContainerName => remote,
                BookkeepingColumn::FileSize | BookkeepingColumn::MergeTimestamp => extended,
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[BookkeepingColumn] {
        &self.columns
    }

    /// Strip inherited provenance columns, then inject fresh ones.
    pub fn apply(&self, table: &mut Table, provenance: &Provenance) {
        strip(table);
        for &column in &self.columns {
            table.push_constant_column(column.as_str(), &provenance.value_for(column));
        }
    }
}

/// Remove every reserved provenance column from `table`.
pub fn strip(table: &mut Table) -> usize {
    table.drop_columns_where(is_bookkeeping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance {
            file_name: "a_truth.csv".to_string(),
            relative_path: "data/a_truth.csv".to_string(),
            size: 42,
            container: Some("lake".to_string()),
            merged_at: "2026-01-02T03:04:05".to_string(),
        }
    }

    fn sample() -> Table {
        Table {
            columns: vec!["id".to_string(), "value".to_string()],
            rows: vec![vec!["1".to_string(), "x".to_string()]],
        }
    }

    #[test]
    fn test_standard_local_plan() {
        let plan = MetadataPlan::standard(false, false);
        let names: Vec<&str> = plan.columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["source_file", "source_path"]);
    }

    #[test]
    fn test_standard_remote_extended_plan() {
        let plan = MetadataPlan::standard(true, true);
        let names: Vec<&str> = plan.columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "source_file",
                "source_path",
                "container_name",
                "file_size",
                "merge_timestamp"
            ]
        );
    }

    #[test]
    fn test_apply_injects_values() {
        let mut t = sample();
        MetadataPlan::standard(true, true).apply(&mut t, &provenance());
        assert_eq!(
            t.rows[0],
            vec![
                "1",
                "x",
                "a_truth.csv",
                "data/a_truth.csv",
                "lake",
                "42",
                "2026-01-02T03:04:05"
            ]
        );
    }

    #[test]
    fn test_apply_twice_is_idempotent_on_columns() {
        let plan = MetadataPlan::standard(false, true);
        let mut once = sample();
        plan.apply(&mut once, &provenance());
        let mut twice = once.clone();
        plan.apply(&mut twice, &provenance());
        assert_eq!(once.columns, twice.columns);
        assert_eq!(once.rows, twice.rows);
    }

    #[test]
    fn test_disabled_plan_still_strips() {
        let mut t = sample();
        MetadataPlan::standard(false, false).apply(&mut t, &provenance());
        MetadataPlan::disabled().apply(&mut t, &provenance());
        assert_eq!(t.columns, vec!["id", "value"]);
        assert_eq!(t.rows[0], vec!["1", "x"]);
    }

    #[test]
    fn test_is_bookkeeping() {
        assert!(is_bookkeeping("merge_timestamp"));
        assert!(is_bookkeeping("container_name"));
        assert!(!is_bookkeeping("Source_File"));
        assert!(!is_bookkeeping("id"));
    }
}
