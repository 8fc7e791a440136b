//! Split and merge progress reporting.
//!
//! Reports observable progress while chunks are sealed and files are merged.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A split chunk was sealed at its final path.
    ChunkSealed { index: u32, rows: u64, bytes: u64 },
    /// A file's rows were added to a merge group.
    FileMerged {
        group: String,
        path: String,
        rows: u64,
        n: u64,
        total: u64,
    },
    /// A file could not be read and was left out of its group.
    FileFailed {
        group: String,
        path: String,
        reason: String,
    },
    /// A merge group was written to its output.
    GroupWritten { group: String, path: String, rows: u64 },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "merge merged_truth.csv  1,234 / 5,000 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::ChunkSealed { index, rows, bytes } => format!(
                "split  chunk {}  {} rows  {} bytes\n",
                index,
                format_number(*rows),
                format_number(*bytes)
            ),
            ProgressEvent::FileMerged { group, n, total, .. } => format!(
                "merge {}  {} / {} files\n",
                group,
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::FileFailed { group, path, .. } => {
                format!("merge {}  skipped {}\n", group, path)
            }
            ProgressEvent::GroupWritten { group, rows, .. } => {
                format!("merge {}  wrote {} rows\n", group, format_number(*rows))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &ProgressEvent) -> serde_json::Value {
    match event {
        ProgressEvent::ChunkSealed { index, rows, bytes } => serde_json::json!({
            "event": "progress",
            "phase": "chunk_sealed",
            "index": index,
            "rows": rows,
            "bytes": bytes
        }),
        ProgressEvent::FileMerged {
            group,
            path,
            rows,
            n,
            total,
        } => serde_json::json!({
            "event": "progress",
            "phase": "file_merged",
            "group": group,
            "path": path,
            "rows": rows,
            "n": n,
            "total": total
        }),
        ProgressEvent::FileFailed {
            group,
            path,
            reason,
        } => serde_json::json!({
            "event": "progress",
            "phase": "file_failed",
            "group": group,
            "path": path,
            "reason": reason
        }),
        ProgressEvent::GroupWritten { group, path, rows } => serde_json::json!({
            "event": "progress",
            "phase": "group_written",
            "group": group,
            "path": path,
            "rows": rows
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Auto => {
                if atty::is(atty::Stream::Stderr) {
                    Box::new(StderrProgress)
                } else {
                    Box::new(NoProgress)
                }
            }
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
