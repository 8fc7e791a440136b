//! CSV reading and writing primitives.
//!
//! Uses the `csv` crate for quoting, embedded delimiters, and embedded
//! newlines. Readers run in flexible mode so ragged rows pass through.
//! [`AtomicCsvWriter`] writes to a temporary file in the destination
//! directory and persists it in one rename, so no reader ever sees a
//! half-written output.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Terminator, Writer, WriterBuilder};
use tempfile::NamedTempFile;

use csv_shuttle_core::table::{unique_columns, Table};

/// UTF-8 byte order mark as it appears after decoding.
const BOM: char = '\u{feff}';

/// Line terminator used for merged outputs.
pub const MERGE_TERMINATOR: Terminator = Terminator::Any(b'\n');

/// Line terminator used for split chunks.
pub const CHUNK_TERMINATOR: Terminator = Terminator::CRLF;

/// Build a flexible reader that treats the first row as the header.
pub fn table_reader<R: Read>(rdr: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(rdr)
}

/// Build a flexible writer with the given terminator.
pub fn table_writer<W: Write>(wtr: W, terminator: Terminator) -> Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(terminator)
        .from_writer(wtr)
}

/// Read a whole CSV document into a [`Table`].
///
/// Fails on an input without a header row or with invalid UTF-8. Blank or
/// repeated header names are renamed so each column stays addressable.
pub fn read_table<R: Read>(rdr: R) -> Result<Table> {
    let mut reader = table_reader(rdr);
    let mut columns: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(str::to_string)
        .collect();

    if columns.is_empty() {
        bail!("no columns to parse (empty file)");
    }
    if let Some(first) = columns.first_mut() {
        if let Some(stripped) = first.strip_prefix(BOM) {
            *first = stripped.to_string();
        }
    }

    let mut table = Table::new(unique_columns(&columns));
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV record {}", i + 1))?;
        table.rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Read a CSV file from disk into a [`Table`].
pub fn read_table_file(path: &Path) -> Result<Table> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_table(file)
}

/// An atomic CSV writer.
///
/// Writes to a temporary file next to the destination and persists it to
/// the final path on [`finish`](AtomicCsvWriter::finish). Dropping the
/// writer without finishing deletes the temporary file.
pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicCsvWriter {
    pub fn new(final_path: impl AsRef<Path>, terminator: Terminator) -> Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent_dir = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp_file = tempfile::Builder::new()
            .prefix(".shuttle_")
            .suffix(".part")
            .tempfile_in(&parent_dir)
            .with_context(|| {
                format!("Failed to create temporary file in {}", parent_dir.display())
            })?;

        Ok(Self {
            writer: table_writer(BufWriter::new(temp_file), terminator),
            final_path,
        })
    }

    pub fn writer_mut(&mut self) -> &mut Writer<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    /// Flush and persist to the final path; returns that path.
    pub fn finish(self) -> Result<PathBuf> {
        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))?;
        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush buffer: {}", e.error()))?;
        named_temp.persist(&self.final_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            )
        })?;
        Ok(self.final_path)
    }
}

/// Write `table` to `path` atomically.
pub fn write_table_atomic(path: &Path, table: &Table) -> Result<PathBuf> {
    let mut writer = AtomicCsvWriter::new(path, MERGE_TERMINATOR)?;
    writer.writer_mut().write_record(&table.columns)?;
    for row in &table.rows {
        writer.writer_mut().write_record(row)?;
    }
    writer.finish()
}
