//! Local filesystem enumeration.
//!
//! Walks a directory tree and collects delimited-text files as
//! [`CandidateFile`]s. Paths relative to the scope root are matched against
//! include and exclude globs (case-insensitive). Hidden entries are never
//! visited, which keeps split probe files and atomic-write temporaries out
//! of merges.
//!
//! With a subfolder allow-list only the named subfolders are walked, in
//! allow-list order. A missing subfolder is a warning and contributes
//! nothing; an existing folder without matches is logged separately.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use csv_shuttle_core::scope::SubfolderSelection;

use crate::config::MergeSettings;
use crate::error::ShuttleError;
use crate::models::{CandidateFile, Origin};

/// Glob filters and traversal options for a local scan.
#[derive(Debug, Clone)]
pub struct LocalScanOptions {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for LocalScanOptions {
    fn default() -> Self {
        Self {
            include_globs: vec!["**/*.csv".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl From<&MergeSettings> for LocalScanOptions {
    fn from(settings: &MergeSettings) -> Self {
        Self {
            include_globs: settings.include_globs.clone(),
            exclude_globs: settings.exclude_globs.clone(),
            follow_symlinks: settings.follow_symlinks,
        }
    }
}

struct Filters {
    include: GlobSet,
    exclude: GlobSet,
}

impl Filters {
    fn new(options: &LocalScanOptions) -> Result<Self> {
        Ok(Self {
            include: build_globset(&options.include_globs)?,
            exclude: build_globset(&options.exclude_globs)?,
        })
    }

    fn matches(&self, relative: &str) -> bool {
        !self.exclude.is_match(relative) && self.include.is_match(relative)
    }
}

/// Enumerate delimited-text files under `root`.
///
/// Results are sorted by relative path within each walked folder.
pub fn scan_local(
    root: &Path,
    selection: &SubfolderSelection,
    options: &LocalScanOptions,
) -> Result<Vec<CandidateFile>> {
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }
    let filters = Filters::new(options)?;

    let files = match selection.normalized_subfolders() {
        None => walk(root, root, options, &filters, None)?,
        Some(subfolders) => {
            let mut seen: HashSet<PathBuf> = HashSet::new();
            let mut files = Vec::new();
            if selection.include_root {
                let found = walk(root, root, options, &filters, Some(1))?;
                info!("Found {} CSV files in the root folder", found.len());
                extend_unique(&mut files, &mut seen, found);
            }
            for subfolder in &subfolders {
                let dir = root.join(subfolder);
                if !dir.is_dir() {
                    warn!(
                        "{}",
                        ShuttleError::SubfolderNotFound {
                            name: subfolder.clone(),
                            root: root.display().to_string(),
                        }
                    );
                    continue;
                }
                let found = walk(root, &dir, options, &filters, None)?;
                if found.is_empty() {
                    info!("No CSV files found in '{}' folder", subfolder);
                } else {
                    info!("Found {} CSV files in '{}' folder", found.len(), subfolder);
                }
                extend_unique(&mut files, &mut seen, found);
            }
            files
        }
    };

    if files.is_empty() {
        warn!("No CSV files found in specified locations");
    } else {
        info!("Total CSV files found: {}", files.len());
    }
    Ok(files)
}

fn extend_unique(
    files: &mut Vec<CandidateFile>,
    seen: &mut HashSet<PathBuf>,
    found: Vec<CandidateFile>,
) {
    for file in found {
        if let Origin::Local { path } = &file.origin {
            if !seen.insert(path.clone()) {
                continue;
            }
        }
        files.push(file);
    }
}

fn walk(
    root: &Path,
    dir: &Path,
    options: &LocalScanOptions,
    filters: &Filters,
    max_depth: Option<usize>,
) -> Result<Vec<CandidateFile>> {
    let mut walker = WalkDir::new(dir).follow_links(options.follow_symlinks);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = relative_path(root, path);
        if !filters.matches(&relative) {
            continue;
        }
        files.push(to_candidate(path, relative)?);
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// `path` relative to `root`, always with `/` separators.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_candidate(path: &Path, relative_path: String) -> Result<CandidateFile> {
    let metadata = std::fs::metadata(path)?;
    let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(CandidateFile {
        origin: Origin::Local {
            path: path.to_path_buf(),
        },
        relative_path,
        file_name,
        size: metadata.len(),
        last_modified,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(false)
                .build()?,
        );
    }
    Ok(builder.build()?)
}
