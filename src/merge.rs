//! Merge runs: enumerate, classify, aggregate, upload.
//!
//! A run takes one scope (a local directory or a remote container path),
//! lists the delimited-text files in it, splits them into the marker group
//! and the rest by basename, and writes one combined file per group. For
//! remote scopes the written outputs can be uploaded back into the same
//! container.
//!
//! File-level read failures never abort a run. A group in which every file
//! failed produces no output and is reported as failed; the other group is
//! unaffected.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use csv_shuttle_core::bookkeeping::MetadataPlan;
use csv_shuttle_core::classify::{Classifier, DEFAULT_MARKER};
use csv_shuttle_core::naming::MergeOutputNames;
use csv_shuttle_core::scope::{normalize_base_path, SubfolderSelection};

use crate::aggregate::{Aggregator, GroupOutcome, GroupReport, TableSource};
use crate::connector_azure::{is_remote, scan_remote, RemoteLocation};
use crate::connector_fs::{scan_local, LocalScanOptions};
use crate::error::ShuttleError;
use crate::models::{CandidateFile, Origin};
use crate::progress::ProgressReporter;
use crate::remote::ObjectStore;

/// Group label for files whose basename contains the marker.
pub const TRUTH_GROUP: &str = "truth";
/// Group label for every other file.
pub const OTHER_GROUP: &str = "other";

/// Where candidate files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Local { root: PathBuf },
    Remote { location: RemoteLocation },
}

impl Scope {
    /// A remote container URL, or else a local directory.
    pub fn parse(location: &str) -> Result<Self> {
        if is_remote(location) {
            Ok(Scope::Remote {
                location: RemoteLocation::parse(location)?,
            })
        } else {
            Ok(Scope::Local {
                root: PathBuf::from(location),
            })
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Scope::Remote { .. })
    }

    /// Human-readable scope, without any credential.
    pub fn describe(&self) -> String {
        match self {
            Scope::Local { root } => root.display().to_string(),
            Scope::Remote { location } => location.display(),
        }
    }
}

/// How the two output files are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputNaming {
    Fixed { truth: String, other: String },
    /// `merged_{marker}_{yyyyMMdd_HHmmss}.csv` / `merged_other_{..}.csv`
    /// from the run's start time.
    Timestamped,
}

impl Default for OutputNaming {
    fn default() -> Self {
        let names = MergeOutputNames::default();
        OutputNaming::Fixed {
            truth: names.truth,
            other: names.other,
        }
    }
}

impl OutputNaming {
    fn resolve(&self, marker: &str, started_at: NaiveDateTime) -> MergeOutputNames {
        match self {
            OutputNaming::Fixed { truth, other } => MergeOutputNames::fixed(truth, other),
            OutputNaming::Timestamped => MergeOutputNames::timestamped(marker, started_at),
        }
    }
}

/// Settings for one merge run.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub scope: Scope,
    pub selection: SubfolderSelection,
    pub marker: String,
    pub case_sensitive: bool,
    pub add_metadata: bool,
    /// Also inject `file_size` and `merge_timestamp`.
    pub extended_metadata: bool,
    pub naming: OutputNaming,
    /// Defaults to the scope root for local scopes and the current
    /// directory for remote ones.
    pub output_dir: Option<PathBuf>,
    /// Remote only: upload outputs to `<prefix>/<name>` in the same container.
    pub upload_to: Option<String>,
    pub scan: LocalScanOptions,
    /// Enumerate and classify only.
    pub dry_run: bool,
}

impl MergeConfig {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            selection: SubfolderSelection::everything(),
            marker: DEFAULT_MARKER.to_string(),
            case_sensitive: false,
            add_metadata: false,
            extended_metadata: false,
            naming: OutputNaming::default(),
            output_dir: None,
            upload_to: None,
            scan: LocalScanOptions::default(),
            dry_run: false,
        }
    }

    fn resolved_output_dir(&self) -> PathBuf {
        match (&self.output_dir, &self.scope) {
            (Some(dir), _) => dir.clone(),
            (None, Scope::Local { root }) => root.clone(),
            (None, Scope::Remote { .. }) => PathBuf::from("."),
        }
    }

    fn metadata_plan(&self) -> MetadataPlan {
        if self.add_metadata {
            MetadataPlan::standard(self.scope.is_remote(), self.extended_metadata)
        } else {
            MetadataPlan::disabled()
        }
    }
}

/// A group as classified, before any file is read.
#[derive(Debug, Clone, Serialize)]
pub struct GroupPlan {
    pub group: String,
    pub output: PathBuf,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub name: String,
    pub uploaded: bool,
    pub error: Option<String>,
}

/// Outcome of a merge run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub scope: String,
    pub marker: String,
    pub total_files: usize,
    pub dry_run: bool,
    pub plans: Vec<GroupPlan>,
    pub groups: Vec<GroupReport>,
    pub uploads: Vec<UploadReport>,
}

impl MergeReport {
    /// True when some group had files but produced no output.
    pub fn has_failed_group(&self) -> bool {
        self.groups.iter().any(GroupReport::is_failure)
    }
}

/// Run one merge.
///
/// `store` must be given for remote scopes; it is what the caller built
/// from already-resolved credentials.
pub fn run_merge(
    config: &MergeConfig,
    store: Option<&dyn ObjectStore>,
    progress: &dyn ProgressReporter,
) -> Result<MergeReport> {
    if config.marker.is_empty() {
        bail!("marker pattern must not be empty");
    }
    let started_at = Local::now().naive_local();
    let names = config.naming.resolve(&config.marker, started_at);
    let output_dir = config.resolved_output_dir();
    let truth_output = output_dir.join(&names.truth);
    let other_output = output_dir.join(&names.other);

    info!("Merging CSV files from {}", config.scope.describe());
    let files = enumerate(config, store, &[&truth_output, &other_output])?;
    let total_files = files.len();

    let classifier = Classifier::new(config.marker.clone(), config.case_sensitive);
    let groups = classifier.partition(files, |f| f.relative_path.as_str());
    info!(
        "Truth files: {} (marker '{}')",
        groups.matched.len(),
        classifier.marker()
    );
    info!("Other files: {}", groups.other.len());

    let plans = vec![
        plan(TRUTH_GROUP, &truth_output, &groups.matched),
        plan(OTHER_GROUP, &other_output, &groups.other),
    ];

    let mut report = MergeReport {
        scope: config.scope.describe(),
        marker: config.marker.clone(),
        total_files,
        dry_run: config.dry_run,
        plans,
        groups: Vec::new(),
        uploads: Vec::new(),
    };
    if config.dry_run {
        return Ok(report);
    }

    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let source = match store {
        Some(store) => TableSource::with_store(store),
        None => TableSource::local(),
    };
    let merged_at = started_at.format("%Y-%m-%dT%H:%M:%S").to_string();
    let aggregator = Aggregator::new(source, config.metadata_plan(), merged_at, progress);

    // Groups are independent: a failed truth group never stops the other.
    report
        .groups
        .push(aggregator.merge_group(TRUTH_GROUP, &groups.matched, &truth_output));
    report
        .groups
        .push(aggregator.merge_group(OTHER_GROUP, &groups.other, &other_output));

    if let Some(prefix) = &config.upload_to {
        match (store, &config.scope) {
            (Some(store), Scope::Remote { .. }) => {
                report.uploads = upload_outputs(store, prefix, &report.groups);
            }
            _ => warn!("--upload-to only applies to remote scopes; skipping upload"),
        }
    }

    Ok(report)
}

fn enumerate(
    config: &MergeConfig,
    store: Option<&dyn ObjectStore>,
    outputs: &[&Path],
) -> Result<Vec<CandidateFile>> {
    match &config.scope {
        Scope::Local { root } => {
            let files = scan_local(root, &config.selection, &config.scan)?;
            Ok(skip_outputs(files, outputs))
        }
        Scope::Remote { location } => {
            let Some(store) = store else {
                bail!(
                    "remote scope {} needs an object store",
                    location.display()
                );
            };
            scan_remote(store, &location.base_path, &config.selection)
        }
    }
}

/// Drop this run's own output files from a local candidate list, so an
/// earlier run's results are not merged into themselves.
fn skip_outputs(files: Vec<CandidateFile>, outputs: &[&Path]) -> Vec<CandidateFile> {
    let outputs: Vec<PathBuf> = outputs
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()))
        .collect();
    files
        .into_iter()
        .filter(|f| match &f.origin {
            Origin::Local { path } => {
                let path = path.canonicalize().unwrap_or_else(|_| path.clone());
                let keep = !outputs.contains(&path);
                if !keep {
                    debug!("Skipping previous output {}", f.relative_path);
                }
                keep
            }
            Origin::Remote { .. } => true,
        })
        .collect()
}

fn plan(group: &str, output: &Path, files: &[CandidateFile]) -> GroupPlan {
    GroupPlan {
        group: group.to_string(),
        output: output.to_path_buf(),
        files: files.iter().map(|f| f.relative_path.clone()).collect(),
    }
}

/// Upload every written output to `<prefix>/<file name>`. Failures are
/// warnings; the local files stay in place either way.
fn upload_outputs(
    store: &dyn ObjectStore,
    prefix: &str,
    groups: &[GroupReport],
) -> Vec<UploadReport> {
    let prefix = normalize_base_path(prefix);
    let mut uploads = Vec::new();
    for group in groups.iter().filter(|g| g.outcome == GroupOutcome::Written) {
        let file_name = group
            .output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = format!("{}{}", prefix, file_name);

        let result = std::fs::read(&group.output)
            .with_context(|| format!("Failed to read {}", group.output.display()))
            .and_then(|data| store.upload(&name, &data));
        match result {
            Ok(()) => {
                info!("Uploaded {} to {}/{}", file_name, store.container(), name);
                uploads.push(UploadReport {
                    name,
                    uploaded: true,
                    error: None,
                });
            }
            Err(e) => {
                let failure = ShuttleError::Upload {
                    name: name.clone(),
                    reason: format!("{:#}", e),
                };
                warn!("{}; local file {} is kept", failure, group.output.display());
                uploads.push(UploadReport {
                    name,
                    uploaded: false,
                    error: Some(format!("{:#}", e)),
                });
            }
        }
    }
    uploads
}

/// Print a merge report to stdout.
pub fn print_report(report: &MergeReport) {
    println!("merge {}", report.scope);
    println!("  files found: {}", report.total_files);

    if report.dry_run {
        for plan in &report.plans {
            println!(
                "  {} -> {} ({} files)",
                plan.group,
                plan.output.display(),
                plan.files.len()
            );
            for file in &plan.files {
                println!("    - {}", file);
            }
        }
        println!("dry run: nothing written");
        return;
    }

    for group in &report.groups {
        match group.outcome {
            GroupOutcome::NoFilesToMerge => {
                println!("  {}: no files to merge", group.group);
            }
            GroupOutcome::AllFailed => {
                println!(
                    "  {}: FAILED, all {} file(s) unreadable",
                    group.group,
                    group.failed()
                );
            }
            GroupOutcome::WriteFailed => {
                println!(
                    "  {}: FAILED to write {}: {}",
                    group.group,
                    group.output.display(),
                    group.error.as_deref().unwrap_or("unknown error")
                );
            }
            GroupOutcome::Written => {
                println!(
                    "  {}: {} ({} rows from {} file(s), {} failed)",
                    group.group,
                    group.output.display(),
                    group.rows,
                    group.succeeded,
                    group.failed()
                );
                println!("    columns: {}", group.columns.join(", "));
            }
        }
        for failure in &group.failures {
            println!("    ! {}: {}", failure.path, failure.reason);
        }
    }

    for upload in &report.uploads {
        match &upload.error {
            None => println!("  uploaded {}", upload.name),
            Some(e) => println!("  upload of {} failed: {}", upload.name, e),
        }
    }

    if report.has_failed_group() {
        println!("partial failure");
    } else {
        println!("ok");
    }
}
