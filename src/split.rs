//! Splitting one CSV file into numbered chunks.
//!
//! Two modes share the same streaming loop over raw byte records:
//!
//! - **Row count** ([`SplitThreshold::Rows`]): a chunk is sealed as soon as
//!   it holds the configured number of rows. All chunks but the last are
//!   exactly that size.
//! - **Size probe** ([`SplitThreshold::Bytes`]): every `probe_interval`
//!   rows the open chunk is written to a private probe file and its on-disk
//!   size measured. A probe that reaches the target, with at least
//!   `min_chunk_rows` rows in the chunk, is renamed to the chunk's final
//!   path; otherwise it is discarded and accumulation continues. Size is
//!   therefore bounded only approximately, to within one probe interval.
//!
//! In both modes trailing rows become a final (possibly small) chunk, the
//! source header is copied into each chunk unless disabled, and chunks are
//! named `{base}_chunk_{NNN}{ext}` after the *input* file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::ByteRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use csv_shuttle_core::estimate;
use csv_shuttle_core::naming::{chunk_file_name, probe_prefix};

use crate::chunk_writer::{remove_stale_probes, write_chunk, ProbeFile};
use crate::csv_io::table_reader;
use crate::error::ShuttleError;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Rows accumulated between two size probes.
pub const DEFAULT_PROBE_INTERVAL: usize = 100;

/// Fewest rows a chunk may hold when sealed by the size test.
pub const DEFAULT_MIN_CHUNK_ROWS: usize = 100;

/// Bytes in one size unit (MB) for CLI and report figures.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// What bounds a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitThreshold {
    Rows(u64),
    Bytes(u64),
}

impl SplitThreshold {
    /// Byte threshold from a size in MB (fractions allowed).
    pub fn from_megabytes(mb: f64) -> Self {
        SplitThreshold::Bytes((mb * BYTES_PER_MB as f64).round() as u64)
    }
}

/// Immutable settings for one split run.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub input: PathBuf,
    pub threshold: SplitThreshold,
    /// Defaults to the input file's directory.
    pub output_dir: Option<PathBuf>,
    pub keep_header: bool,
    pub probe_interval: usize,
    pub min_chunk_rows: usize,
}

impl SplitConfig {
    pub fn new(input: impl Into<PathBuf>, threshold: SplitThreshold) -> Self {
        Self {
            input: input.into(),
            threshold,
            output_dir: None,
            keep_header: true,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            min_chunk_rows: DEFAULT_MIN_CHUNK_ROWS,
        }
    }
}

/// One sealed chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkInfo {
    pub number: u32,
    pub path: PathBuf,
    pub rows: u64,
    pub bytes: u64,
}

/// Outcome of a split run.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub threshold: SplitThreshold,
    pub total_rows: u64,
    pub estimated_rows_per_chunk: Option<u64>,
    pub chunks: Vec<ChunkInfo>,
}

impl SplitReport {
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes).sum()
    }
}

/// Estimate rows per chunk for a `target_bytes` chunk size.
///
/// One full pass over the data rows (the header is not counted). Advisory
/// only: the result is logged, never used to size anything.
pub fn estimate_rows_per_chunk(input: &Path, target_bytes: u64) -> Result<u64> {
    if !input.exists() {
        return Err(ShuttleError::SourceNotFound(input.to_path_buf()).into());
    }
    let total_bytes = std::fs::metadata(input)?.len();

    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = table_reader(file);
    let mut record = ByteRecord::new();
    let mut total_rows: u64 = 0;
    while reader.read_byte_record(&mut record)? {
        total_rows += 1;
    }

    Ok(estimate::rows_per_chunk(total_rows, total_bytes, target_bytes))
}

/// Split `config.input` into chunk files.
///
/// # Errors
///
/// - [`ShuttleError::SourceNotFound`] if the input does not exist.
/// - [`ShuttleError::EmptySource`] if it has no header row.
/// - Any I/O or CSV error while reading or writing.
///
/// Probe files left behind by a failed size-probe run are removed before
/// the error is returned.
pub fn split_file(config: &SplitConfig, progress: &dyn ProgressReporter) -> Result<SplitReport> {
    let input = &config.input;
    if !input.exists() {
        return Err(ShuttleError::SourceNotFound(input.clone()).into());
    }
    match config.threshold {
        SplitThreshold::Rows(0) => bail!("row threshold must be > 0"),
        SplitThreshold::Bytes(0) => bail!("size threshold must be > 0"),
        _ => {}
    }
    if config.probe_interval == 0 {
        bail!("probe interval must be > 0");
    }

    let output_dir = resolve_output_dir(input, config.output_dir.as_deref());
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let naming = ChunkNaming::for_input(input);

    let estimated = match config.threshold {
        SplitThreshold::Bytes(target) => {
            let estimate = estimate_rows_per_chunk(input, target)?;
            info!(
                "Estimated ~{} rows per {:.2}MB chunk",
                estimate,
                target as f64 / BYTES_PER_MB as f64
            );
            Some(estimate)
        }
        SplitThreshold::Rows(_) => None,
    };

    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = table_reader(file);
    let header = reader
        .byte_headers()
        .with_context(|| format!("Failed to read CSV header of {}", input.display()))?
        .clone();
    if header.is_empty() {
        return Err(ShuttleError::EmptySource(input.clone()).into());
    }

    let mut driver = SplitDriver {
        config,
        output_dir: &output_dir,
        naming: &naming,
        header: config.keep_header.then_some(&header),
        progress,
        chunks: Vec::new(),
        total_rows: 0,
    };

    let outcome = match config.threshold {
        SplitThreshold::Rows(limit) => driver.run_by_rows(&mut reader, limit),
        SplitThreshold::Bytes(target) => {
            let result = driver.run_by_size(&mut reader, target);
            match remove_stale_probes(&output_dir, &naming.probe_prefix) {
                Ok(0) => {}
                Ok(n) => debug!("Removed {} leftover probe file(s)", n),
                Err(e) => warn!("Failed to clean up probe files: {}", e),
            }
            result
        }
    };
    outcome?;

    let SplitDriver {
        chunks, total_rows, ..
    } = driver;
    let report = SplitReport {
        input: input.clone(),
        output_dir,
        threshold: config.threshold,
        total_rows,
        estimated_rows_per_chunk: estimated,
        chunks,
    };

    info!(
        "Split complete! Created {} chunk files totaling {:.2}MB.",
        report.chunks.len(),
        report.total_bytes() as f64 / BYTES_PER_MB as f64
    );
    Ok(report)
}

/// Output directory: explicit, else the input's own directory.
fn resolve_output_dir(input: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(dir) => dir.to_path_buf(),
        None => match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    }
}

/// Base name, extension, and probe prefix derived from the input path.
struct ChunkNaming {
    base: String,
    ext: String,
    probe_prefix: String,
}

impl ChunkNaming {
    fn for_input(input: &Path) -> Self {
        let base = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "chunk".to_string());
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let probe_prefix = probe_prefix(&base);
        Self {
            base,
            ext,
            probe_prefix,
        }
    }

    fn chunk_name(&self, number: u32) -> String {
        chunk_file_name(&self.base, &self.ext, number)
    }
}

struct SplitDriver<'a> {
    config: &'a SplitConfig,
    output_dir: &'a Path,
    naming: &'a ChunkNaming,
    header: Option<&'a ByteRecord>,
    progress: &'a dyn ProgressReporter,
    chunks: Vec<ChunkInfo>,
    total_rows: u64,
}

impl<'a> SplitDriver<'a> {
    fn next_number(&self) -> u32 {
        self.chunks.len() as u32 + 1
    }

    fn run_by_rows<R: std::io::Read>(
        &mut self,
        reader: &mut csv::Reader<R>,
        limit: u64,
    ) -> Result<()> {
        let mut open: Vec<ByteRecord> = Vec::new();
        let mut record = ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            open.push(record.clone());
            self.total_rows += 1;
            if open.len() as u64 >= limit {
                self.seal_direct(&open)?;
                open.clear();
            }
        }
        if !open.is_empty() {
            self.seal_direct(&open)?;
        }
        Ok(())
    }

    fn run_by_size<R: std::io::Read>(
        &mut self,
        reader: &mut csv::Reader<R>,
        target: u64,
    ) -> Result<()> {
        let interval = self.config.probe_interval;
        let mut open: Vec<ByteRecord> = Vec::new();
        let mut record = ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            open.push(record.clone());
            self.total_rows += 1;
            if open.len() % interval != 0 {
                continue;
            }

            let probe = ProbeFile::write(
                self.output_dir,
                &self.naming.probe_prefix,
                &self.naming.ext,
                self.header,
                &open,
            )?;
            let size = probe.size();
            if size >= target && open.len() >= self.config.min_chunk_rows {
                let number = self.next_number();
                let path = self.output_dir.join(self.naming.chunk_name(number));
                probe.seal(&path)?;
                self.record_chunk(number, path, open.len() as u64, size);
                open.clear();
            } else {
                debug!(rows = open.len(), size, target, "Probe below target");
                probe.discard()?;
            }
        }
        if !open.is_empty() {
            self.seal_direct(&open)?;
        }
        Ok(())
    }

    fn seal_direct(&mut self, rows: &[ByteRecord]) -> Result<()> {
        let number = self.next_number();
        let path = self.output_dir.join(self.naming.chunk_name(number));
        let bytes = write_chunk(&path, self.header, rows)?;
        self.record_chunk(number, path, rows.len() as u64, bytes);
        Ok(())
    }

    fn record_chunk(&mut self, number: u32, path: PathBuf, rows: u64, bytes: u64) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!(
            "Created chunk {}: {} ({} rows, {:.2}MB)",
            number,
            name,
            rows,
            bytes as f64 / BYTES_PER_MB as f64
        );
        self.progress.report(ProgressEvent::ChunkSealed {
            index: number,
            rows,
            bytes,
        });
        self.chunks.push(ChunkInfo {
            number,
            path,
            rows,
            bytes,
        });
    }
}

/// Print the chunk list of a finished split to stdout.
pub fn print_report(report: &SplitReport) {
    println!("split {}", report.input.display());
    if let Some(estimate) = report.estimated_rows_per_chunk {
        println!("  estimated rows per chunk: {}", estimate);
    }
    println!("  data rows: {}", report.total_rows);
    println!("  chunks: {}", report.chunks.len());
    for chunk in &report.chunks {
        println!(
            "  - {} ({} rows, {:.2}MB)",
            chunk.path.display(),
            chunk.rows,
            chunk.bytes as f64 / BYTES_PER_MB as f64
        );
    }
    println!(
        "  total size: {:.2}MB",
        report.total_bytes() as f64 / BYTES_PER_MB as f64
    );
    println!("ok");
}
