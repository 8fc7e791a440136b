//! Per-group aggregation.
//!
//! One [`Aggregator`] is built per merge run and applied to each classified
//! group in turn. For every file, in group order, it reads the table,
//! strips inherited bookkeeping columns, injects fresh ones when enabled,
//! and keeps it. A file that cannot be read is recorded and skipped; the
//! rest of the group still merges.
//!
//! ```text
//! Empty ─┬─▶ NoFilesToMerge
//!        └─▶ Reading(1..n) ─┬─▶ AllFailed
//!                           └─▶ Concatenated ─┬─▶ Written
//!                                             └─▶ WriteFailed
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use csv_shuttle_core::bookkeeping::{MetadataPlan, Provenance};
use csv_shuttle_core::table::{concat, Table};

use crate::csv_io::{read_table, read_table_file, write_table_atomic};
use crate::error::ShuttleError;
use crate::models::{CandidateFile, Origin};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::remote::ObjectStore;

/// Reads candidate files from wherever they live.
#[derive(Clone, Copy)]
pub struct TableSource<'a> {
    store: Option<&'a dyn ObjectStore>,
}

impl<'a> TableSource<'a> {
    /// Local files only.
    pub fn local() -> Self {
        Self { store: None }
    }

    /// Local files plus objects from `store`.
    pub fn with_store(store: &'a dyn ObjectStore) -> Self {
        Self { store: Some(store) }
    }

    pub fn read(&self, file: &CandidateFile) -> Result<Table> {
        match &file.origin {
            Origin::Local { path } => read_table_file(path),
            Origin::Remote { name, .. } => {
                let Some(store) = self.store else {
                    bail!("no object store available to read '{}'", name);
                };
                let bytes = store.download(name)?;
                read_table(bytes.as_slice())
            }
        }
    }
}

/// Terminal state of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOutcome {
    NoFilesToMerge,
    AllFailed,
    Written,
    /// Rows were read but the output could not be written.
    WriteFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// What happened to one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: String,
    pub output: PathBuf,
    pub outcome: GroupOutcome,
    pub files: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
    pub rows: u64,
    pub columns: Vec<String>,
    /// Why the output could not be written, for `WriteFailed`.
    pub error: Option<String>,
}

impl GroupReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True for outcomes that leave the group without an output.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            GroupOutcome::AllFailed | GroupOutcome::WriteFailed
        )
    }
}

/// Merges groups of candidate files into one output table each.
pub struct Aggregator<'a> {
    source: TableSource<'a>,
    plan: MetadataPlan,
    merged_at: String,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Aggregator<'a> {
    /// `merged_at` is written into `merge_timestamp` for every file of the run.
    pub fn new(
        source: TableSource<'a>,
        plan: MetadataPlan,
        merged_at: impl Into<String>,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            source,
            plan,
            merged_at: merged_at.into(),
            progress,
        }
    }

    /// Merge `files` into `output`.
    ///
    /// Read failures are isolated per file, and a failure to write the
    /// output is recorded as [`GroupOutcome::WriteFailed`]. Either way the
    /// caller can go on to the next group.
    pub fn merge_group(&self, group: &str, files: &[CandidateFile], output: &Path) -> GroupReport {
        let output_name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| output.display().to_string());
        let mut report = GroupReport {
            group: group.to_string(),
            output: output.to_path_buf(),
            outcome: GroupOutcome::NoFilesToMerge,
            files: files.len(),
            succeeded: 0,
            failures: Vec::new(),
            rows: 0,
            columns: Vec::new(),
            error: None,
        };

        if files.is_empty() {
            info!("No files to merge for {}", output_name);
            return report;
        }

        let total = files.len() as u64;
        let mut tables = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            match self.source.read(file) {
                Ok(mut table) => {
                    self.plan.apply(&mut table, &self.provenance(file));
                    let rows = table.row_count() as u64;
                    info!("Added {} ({} rows)", file.relative_path, rows);
                    self.progress.report(ProgressEvent::FileMerged {
                        group: group.to_string(),
                        path: file.relative_path.clone(),
                        rows,
                        n: i as u64 + 1,
                        total,
                    });
                    tables.push(table);
                }
                Err(e) => {
                    let failure = ShuttleError::FileRead {
                        path: file.display_path(),
                        reason: format!("{:#}", e),
                    };
                    warn!("{}", failure);
                    self.progress.report(ProgressEvent::FileFailed {
                        group: group.to_string(),
                        path: file.relative_path.clone(),
                        reason: format!("{:#}", e),
                    });
                    report.failures.push(FileFailure {
                        path: file.relative_path.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        report.succeeded = tables.len();
        if tables.is_empty() {
            report.outcome = GroupOutcome::AllFailed;
            error!(
                "{}",
                ShuttleError::GroupFullyFailed {
                    output: output_name,
                    failed: report.failed(),
                }
            );
            return report;
        }

        let merged = concat(tables);
        report.rows = merged.row_count() as u64;
        if let Err(e) = write_table_atomic(output, &merged) {
            error!("Failed to write {}: {:#}", output.display(), e);
            report.outcome = GroupOutcome::WriteFailed;
            report.error = Some(format!("{:#}", e));
            return report;
        }

        report.outcome = GroupOutcome::Written;
        report.columns = merged.columns;
        info!(
            "Merged {} files into {} ({} rows, {} failed)",
            report.succeeded,
            output_name,
            report.rows,
            report.failed()
        );
        self.progress.report(ProgressEvent::GroupWritten {
            group: group.to_string(),
            path: output.display().to_string(),
            rows: report.rows,
        });
        report
    }

    fn provenance(&self, file: &CandidateFile) -> Provenance {
        Provenance {
            file_name: file.file_name.clone(),
            relative_path: file.relative_path.clone(),
            size: file.size,
            container: file.container().map(str::to_string),
            merged_at: self.merged_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::remote::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn local_file(dir: &Path, rel: &str, body: &str) -> CandidateFile {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        CandidateFile {
            origin: Origin::Local { path: path.clone() },
            relative_path: rel.to_string(),
            file_name: rel.rsplit('/').next().unwrap().to_string(),
            size: body.len() as u64,
            last_modified: None,
        }
    }

    fn remote_file(container: &str, name: &str, size: u64) -> CandidateFile {
        CandidateFile {
            origin: Origin::Remote {
                container: container.to_string(),
                name: name.to_string(),
            },
            relative_path: name.to_string(),
            file_name: name.rsplit('/').next().unwrap().to_string(),
            size,
            last_modified: None,
        }
    }

    #[test]
    fn test_partial_failure_isolation() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            local_file(dir.path(), "one.csv", "id,v\n1,a\n2,b\n"),
            local_file(dir.path(), "two.csv", ""),
            local_file(dir.path(), "three.csv", "id,v\n3,c\n"),
        ];
        let output = dir.path().join("out.csv");
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::disabled(),
            "2026-01-01T00:00:00",
            &NoProgress,
        );
        let report = aggregator.merge_group("other", &files, &output);

        assert_eq!(report.outcome, GroupOutcome::Written);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].path, "two.csv");
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "id,v\n1,a\n2,b\n3,c\n"
        );
    }

    #[test]
    fn test_all_failed_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let files = vec![local_file(dir.path(), "bad.csv", "")];
        let output = dir.path().join("out.csv");
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::disabled(),
            "t",
            &NoProgress,
        );
        let report = aggregator.merge_group("truth", &files, &output);
        assert_eq!(report.outcome, GroupOutcome::AllFailed);
        assert!(!output.exists());
    }

    #[test]
    fn test_empty_group() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::disabled(),
            "t",
            &NoProgress,
        );
        let report = aggregator.merge_group("truth", &[], &output);
        assert_eq!(report.outcome, GroupOutcome::NoFilesToMerge);
        assert!(!output.exists());
    }

    #[test]
    fn test_metadata_injection_and_union() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            local_file(dir.path(), "a/x.csv", "id,source_file\n1,stale\n"),
            local_file(dir.path(), "b/y.csv", "id,extra\n2,e\n"),
        ];
        let output = dir.path().join("out.csv");
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::standard(false, false),
            "t",
            &NoProgress,
        );
        let report = aggregator.merge_group("other", &files, &output);
        assert_eq!(
            report.columns,
            vec!["id", "source_file", "source_path", "extra"]
        );
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "id,source_file,source_path,extra\n1,x.csv,a/x.csv,\n2,y.csv,b/y.csv,e\n"
        );
    }

    #[test]
    fn test_remote_source_with_container_column() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new("lake")
            .with_object("base/t_truth.csv", "id\n1\n")
            .with_failing_download("base/gone_truth.csv");
        let files = vec![
            remote_file("lake", "base/t_truth.csv", 5),
            remote_file("lake", "base/gone_truth.csv", 5),
        ];
        let output = dir.path().join("merged_truth.csv");
        let aggregator = Aggregator::new(
            TableSource::with_store(&store),
            MetadataPlan::standard(true, true),
            "2026-01-01T00:00:00",
            &NoProgress,
        );
        let report = aggregator.merge_group("truth", &files, &output);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "id,source_file,source_path,container_name,file_size,merge_timestamp\n\
             1,t_truth.csv,base/t_truth.csv,lake,5,2026-01-01T00:00:00\n"
        );
    }

    #[test]
    fn test_remote_file_without_store_fails_per_file() {
        let dir = TempDir::new().unwrap();
        let files = vec![remote_file("lake", "a.csv", 1)];
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::disabled(),
            "t",
            &NoProgress,
        );
        let report = aggregator
            .merge_group("other", &files, &dir.path().join("o.csv"));
        assert_eq!(report.outcome, GroupOutcome::AllFailed);
    }

    #[test]
    fn test_repeated_header_names_keep_every_field() {
        let dir = TempDir::new().unwrap();
        let files = vec![local_file(dir.path(), "dup.csv", "a,a,b\n1,2,3\n")];
        let output = dir.path().join("out.csv");
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::disabled(),
            "t",
            &NoProgress,
        );
        let report = aggregator.merge_group("other", &files, &output);
        assert_eq!(report.columns, vec!["a", "a.1", "b"]);
        assert_eq!(fs::read_to_string(&output).unwrap(), "a,a.1,b\n1,2,3\n");
    }

    #[test]
    fn test_unwritable_output_is_recorded() {
        let dir = TempDir::new().unwrap();
        let files = vec![local_file(dir.path(), "one.csv", "id\n1\n")];
        let output = dir.path().join("taken");
        fs::create_dir_all(output.join("inner")).unwrap();
        let aggregator = Aggregator::new(
            TableSource::local(),
            MetadataPlan::disabled(),
            "t",
            &NoProgress,
        );
        let report = aggregator.merge_group("truth", &files, &output);
        assert_eq!(report.outcome, GroupOutcome::WriteFailed);
        assert!(report.is_failure());
        assert!(report.error.is_some());
        assert_eq!(report.succeeded, 1);
        assert!(output.is_dir());
    }
}
