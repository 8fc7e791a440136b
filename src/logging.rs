//! Scoped log sink for one run.
//!
//! [`LogSession::start`] builds a `tracing` subscriber (stderr, plus an
//! optional log file) and installs it as the default for the current thread
//! only. Dropping the session restores the previous default, so the sink is
//! released on every exit path of a run, including `?` early returns.

use std::fs::File;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Holds the installed subscriber for the lifetime of one run.
pub struct LogSession {
    _guard: DefaultGuard,
}

impl LogSession {
    /// Install the log sink described by `config`.
    ///
    /// `verbose` raises the level to `debug` (one flag) or `trace` (two or
    /// more). `RUST_LOG` overrides both.
    pub fn start(config: &LoggingConfig, verbose: u8) -> Result<Self> {
        let level = match verbose {
            0 => config.level.to_ascii_lowercase(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };

        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(filter_directive(&level)))
            .context("Failed to create log filter")?;

        let mut layers: Vec<BoxedLayer> = vec![fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .compact()
            .boxed()];

        if let Some(ref path) = config.file {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_span_events(FmtSpan::NONE);
            layers.push(if config.json {
                file_layer.json().boxed()
            } else {
                file_layer.boxed()
            });
        }

        let subscriber = Registry::default().with(layers).with(env_filter);
        let guard = tracing::subscriber::set_default(subscriber);
        Ok(Self { _guard: guard })
    }
}

/// Filter directive applying `level` to this crate and its binary, and
/// `warn` to dependencies.
fn filter_directive(level: &str) -> String {
    format!("warn,csv_shuttle={level},shuttle={level}", level = level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_directive() {
        assert_eq!(
            filter_directive("debug"),
            "warn,csv_shuttle=debug,shuttle=debug"
        );
    }

    #[test]
    fn test_session_writes_file_and_releases() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("run.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            file: Some(log_path.clone()),
            json: false,
        };

        {
            let _session = LogSession::start(&config, 0).unwrap();
            tracing::info!("inside the session");
        }
        tracing::info!("after the session");

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.contains("inside the session"));
        assert!(!text.contains("after the session"));
    }

    #[test]
    fn test_unwritable_log_file_is_error() {
        let dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            file: Some(dir.path().join("missing").join("run.log")),
            json: false,
        };
        assert!(LogSession::start(&config, 0).is_err());
    }
}
