//! # csv-shuttle CLI (`shuttle`)
//!
//! ## Usage
//!
//! ```bash
//! shuttle [--config ./shuttle.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shuttle split <file> --rows N` | Split into chunks of N data rows |
//! | `shuttle split <file> --size-mb F` | Split into chunks of about F MB |
//! | `shuttle estimate <file> --size-mb F` | Print the rows-per-chunk estimate |
//! | `shuttle merge <dir-or-url>` | Merge CSV files into truth / other outputs |
//! | `shuttle completions <shell>` | Print a shell completion script |
//!
//! ## Exit status
//!
//! `0` on success, `1` on a fatal error, `2` when a merge group had files
//! but produced no output (none could be read, or the write failed).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use tracing::info;

use csv_shuttle::config::{self, AuthMode, Config};
use csv_shuttle::connector_azure::AzureBlobStore;
use csv_shuttle::connector_fs::LocalScanOptions;
use csv_shuttle::logging::LogSession;
use csv_shuttle::merge::{self, MergeConfig, OutputNaming, Scope};
use csv_shuttle::progress::ProgressMode;
use csv_shuttle::remote::ObjectStore;
use csv_shuttle::split::{self, SplitConfig, SplitThreshold, BYTES_PER_MB};
use csv_shuttle_core::scope::SubfolderSelection;

/// csv-shuttle: split large CSV files and merge CSV trees.
#[derive(Parser)]
#[command(
    name = "shuttle",
    about = "Split large CSV files into chunks, and merge CSV trees from disk or Azure Blob Storage",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./shuttle.toml` when that file exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress reporting on stderr.
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    /// More log output (`-v` debug, `-vv` trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split one CSV file into numbered chunks.
    ///
    /// Chunks are named `{base}_chunk_{NNN}{ext}` after the input file and
    /// carry a copy of its header unless `--no-header` is given.
    #[command(group(ArgGroup::new("threshold").required(true).args(["rows", "size_mb"])))]
    Split {
        /// CSV file to split.
        input: PathBuf,

        /// Data rows per chunk.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        rows: Option<u64>,

        /// Approximate chunk size in MB (fractions allowed).
        #[arg(long)]
        size_mb: Option<f64>,

        /// Output directory (default: the input's directory).
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Do not repeat the header in each chunk.
        #[arg(long)]
        no_header: bool,

        /// Rows between size probes (size mode).
        #[arg(long)]
        probe_interval: Option<usize>,

        /// Fewest rows a size-sealed chunk may hold.
        #[arg(long)]
        min_rows: Option<usize>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Estimate how many rows fit in a chunk of the given size.
    Estimate {
        input: PathBuf,

        #[arg(long)]
        size_mb: f64,
    },

    /// Merge CSV files into a marker group and an "other" group.
    ///
    /// The scope is a local directory, or a container URL
    /// (`https://<account>.blob.core.windows.net/<container>/<path>[?sas]`
    /// or `az://<account>/<container>/<path>`).
    Merge {
        /// Local directory or container URL.
        scope: String,

        /// Only search these subfolders (repeatable).
        #[arg(long = "subfolder")]
        subfolders: Vec<String>,

        /// With `--subfolder`, also take files directly in the scope root.
        #[arg(long)]
        include_root: bool,

        /// Basename substring that selects the truth group.
        #[arg(long)]
        marker: Option<String>,

        /// Match the marker case-sensitively.
        #[arg(long)]
        case_sensitive: bool,

        /// Add source_file / source_path (and container_name) columns.
        #[arg(long)]
        metadata: bool,

        /// Also add file_size and merge_timestamp columns.
        #[arg(long)]
        extended_metadata: bool,

        #[arg(long)]
        truth_output: Option<String>,

        #[arg(long)]
        other_output: Option<String>,

        /// Name outputs `merged_{marker}_{yyyyMMdd_HHmmss}.csv`.
        #[arg(long)]
        timestamped: bool,

        /// Where outputs are written (default: scope root, or the current
        /// directory for remote scopes).
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Remote only: upload outputs under this prefix in the container.
        #[arg(long)]
        upload_to: Option<String>,

        /// Credential source for remote scopes.
        #[arg(long, value_enum)]
        auth: Option<AuthMode>,

        /// Storage connection string (`--auth connection-string`).
        #[arg(long)]
        connection_string: Option<String>,

        /// SAS or bearer token (`--auth token`).
        #[arg(long)]
        token: Option<String>,

        /// Base64 account key (`--auth key`).
        #[arg(long)]
        account_key: Option<String>,

        /// Blob service endpoint override (e.g. Azurite).
        #[arg(long)]
        endpoint: Option<String>,

        /// List and classify files without reading or writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "shuttle", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = config::load_config(cli.config.as_deref())?;
    let _log = LogSession::start(&cfg.logging, cli.verbose)?;

    run(cli, &cfg)
}

fn run(cli: Cli, cfg: &Config) -> Result<ExitCode> {
    let progress = cli.progress.reporter();

    match cli.command {
        Commands::Split {
            input,
            rows,
            size_mb,
            output_dir,
            no_header,
            probe_interval,
            min_rows,
            json,
        } => {
            let threshold = match (rows, size_mb) {
                (Some(rows), _) => SplitThreshold::Rows(rows),
                (None, Some(mb)) => {
                    if mb.is_nan() || mb <= 0.0 {
                        bail!("--size-mb must be > 0");
                    }
                    SplitThreshold::from_megabytes(mb)
                }
                (None, None) => bail!("one of --rows or --size-mb is required"),
            };

            let mut split_config = SplitConfig::new(&input, threshold);
            split_config.output_dir = output_dir;
            split_config.keep_header = cfg.split.keep_header && !no_header;
            split_config.probe_interval = probe_interval.unwrap_or(cfg.split.probe_interval);
            split_config.min_chunk_rows = min_rows.unwrap_or(cfg.split.min_rows_per_chunk);

            info!("Splitting {}", input.display());
            let report = split::split_file(&split_config, progress.as_ref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                split::print_report(&report);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Estimate { input, size_mb } => {
            if size_mb.is_nan() || size_mb <= 0.0 {
                bail!("--size-mb must be > 0");
            }
            let target = (size_mb * BYTES_PER_MB as f64).round() as u64;
            let estimate = split::estimate_rows_per_chunk(&input, target)?;
            println!("Estimated ~{} rows per {}MB chunk", estimate, size_mb);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Merge {
            scope,
            subfolders,
            include_root,
            marker,
            case_sensitive,
            metadata,
            extended_metadata,
            truth_output,
            other_output,
            timestamped,
            output_dir,
            upload_to,
            auth,
            connection_string,
            token,
            account_key,
            endpoint,
            dry_run,
            json,
        } => {
            let scope = Scope::parse(&scope)?;
            if upload_to.is_some() && !scope.is_remote() {
                bail!("--upload-to requires a remote scope");
            }

            let settings = &cfg.merge;
            let mut merge_config = MergeConfig::new(scope);
            merge_config.selection = if subfolders.is_empty() {
                SubfolderSelection::everything()
            } else {
                SubfolderSelection::only(subfolders, include_root)
            };
            merge_config.marker = marker.unwrap_or_else(|| settings.marker.clone());
            merge_config.case_sensitive = case_sensitive || settings.case_sensitive;
            merge_config.extended_metadata = extended_metadata || settings.extended_metadata;
            merge_config.add_metadata =
                metadata || merge_config.extended_metadata || settings.add_metadata;
            merge_config.naming = if timestamped || settings.timestamped_outputs {
                OutputNaming::Timestamped
            } else {
                OutputNaming::Fixed {
                    truth: truth_output.unwrap_or_else(|| settings.truth_output.clone()),
                    other: other_output.unwrap_or_else(|| settings.other_output.clone()),
                }
            };
            merge_config.output_dir = output_dir;
            merge_config.upload_to = upload_to;
            merge_config.scan = LocalScanOptions::from(settings);
            merge_config.dry_run = dry_run;
            validate_names(&merge_config.naming)?;

            // Credentials resolve here, before anything is listed.
            let store = match &merge_config.scope {
                Scope::Remote { location } => {
                    let mut azure = cfg.azure.clone();
                    if let Some(auth) = auth {
                        azure.auth = auth;
                    }
                    azure.connection_string = connection_string.or(azure.connection_string);
                    azure.token = token.or(azure.token);
                    azure.account_key = account_key.or(azure.account_key);
                    azure.endpoint = endpoint.or(azure.endpoint);
                    Some(AzureBlobStore::connect(location, &azure)?)
                }
                Scope::Local { .. } => None,
            };

            let report = merge::run_merge(
                &merge_config,
                store.as_ref().map(|s| s as &dyn ObjectStore),
                progress.as_ref(),
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                merge::print_report(&report);
            }

            if report.has_failed_group() {
                Ok(ExitCode::from(2))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }

        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn validate_names(naming: &OutputNaming) -> Result<()> {
    if let OutputNaming::Fixed { truth, other } = naming {
        for name in [truth, other] {
            let plain =
                Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name.as_str());
            if !plain {
                bail!("output name '{}' must be a plain file name", name);
            }
            if !name.to_ascii_lowercase().ends_with(".csv") {
                bail!("output name '{}' must end in .csv", name);
            }
        }
        if truth == other {
            bail!("truth and other outputs must have different names");
        }
    }
    Ok(())
}
