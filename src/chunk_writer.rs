//! Chunk materialization.
//!
//! A chunk is written either directly to its final path, or as a private
//! *probe* file whose on-disk size is measured and which is then renamed
//! into place ([`ProbeFile::seal`]) or discarded ([`ProbeFile::discard`],
//! or just dropping it). Probe files carry a per-input hidden prefix (see
//! [`csv_shuttle_core::naming::probe_prefix`]) so leftovers can be swept
//! with [`remove_stale_probes`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::ByteRecord;
use tempfile::NamedTempFile;

use crate::csv_io::{table_writer, CHUNK_TERMINATOR};

fn write_records<W: Write>(
    out: W,
    header: Option<&ByteRecord>,
    rows: &[ByteRecord],
) -> Result<()> {
    let mut writer = table_writer(out, CHUNK_TERMINATOR);
    if let Some(header) = header {
        writer.write_byte_record(header)?;
    }
    for row in rows {
        writer.write_byte_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a chunk straight to `path`, overwriting it. Returns its size.
pub fn write_chunk(
    path: &Path,
    header: Option<&ByteRecord>,
    rows: &[ByteRecord],
) -> Result<u64> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create chunk file: {}", path.display()))?;
    let mut buf = BufWriter::new(file);
    write_records(&mut buf, header, rows)?;
    buf.flush()?;
    let file = buf
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush chunk {}: {}", path.display(), e.error()))?;
    Ok(file.metadata()?.len())
}

/// An in-progress chunk written to a private temporary path.
pub struct ProbeFile {
    file: NamedTempFile,
    size: u64,
}

impl ProbeFile {
    /// Write `rows` to a fresh probe file in `dir` named `{prefix}XXXXXX{suffix}`.
    pub fn write(
        dir: &Path,
        prefix: &str,
        suffix: &str,
        header: Option<&ByteRecord>,
        rows: &[ByteRecord],
    ) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)
            .with_context(|| format!("Failed to create probe file in {}", dir.display()))?;

        {
            let mut buf = BufWriter::new(file.as_file_mut());
            write_records(&mut buf, header, rows)?;
            buf.flush()?;
        }
        let size = file.as_file().metadata()?.len();
        Ok(Self { file, size })
    }

    /// On-disk size of the probe in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Rename the probe to `dest`, replacing anything already there.
    pub fn seal(self, dest: &Path) -> Result<PathBuf> {
        self.file.persist(dest).map_err(|e| {
            anyhow::anyhow!("Failed to move chunk into {}: {}", dest.display(), e.error)
        })?;
        Ok(dest.to_path_buf())
    }

    /// Delete the probe file now.
    pub fn discard(self) -> Result<()> {
        self.file.close()?;
        Ok(())
    }
}

/// Remove files in `dir` whose name starts with `prefix`. Returns how many
/// were removed.
pub fn remove_stale_probes(dir: &Path, prefix: &str) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(prefix) && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
