//! # csv-shuttle
//!
//! Split large CSV files into bounded chunks, and merge CSV trees from a
//! local directory or an Azure Blob Storage container.
//!
//! ## Architecture
//!
//! ```text
//!  split                                   merge
//! ┌──────────┐   ┌─────────────┐          ┌───────────────┐   ┌────────────┐   ┌────────────┐
//! │ estimate │──▶│ SplitDriver │          │ connector_fs  │──▶│ Classifier │──▶│ Aggregator │
//! └──────────┘   │ rows / size │          │ connector_az  │   │  (marker)  │   │ strip+tag  │
//!                └──────┬──────┘          └───────────────┘   └────────────┘   └─────┬──────┘
//!                       ▼                                                            ▼
//!              {base}_chunk_NNN.csv                          merged_truth.csv / merged_other.csv
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shuttle split big.csv --size-mb 25
//! shuttle split big.csv --rows 100000 --output-dir chunks/
//! shuttle merge ./results --subfolder run1 --subfolder run2 --metadata
//! shuttle merge "https://acct.blob.core.windows.net/box/exports?<sas>" --upload-to merged/
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`logging`] | Scoped `tracing` subscriber |
//! | [`progress`] | Progress reporting on stderr |
//! | [`csv_io`] | CSV readers, writers, atomic output |
//! | [`chunk_writer`] | Chunk and probe files |
//! | [`split`] | Row-count and size-probe splitting |
//! | [`models`] | Candidate file types |
//! | [`connector_fs`] | Local enumeration |
//! | [`connector_azure`] | Azure Blob enumeration and object store |
//! | [`remote`] | Object store trait, credentials, in-memory store |
//! | [`aggregate`] | Per-group merge |
//! | [`merge`] | Merge runs |
//!
//! The pure table model, bookkeeping columns, classifier, and naming rules
//! live in the `csv-shuttle-core` crate.

pub mod aggregate;
pub mod chunk_writer;
pub mod config;
pub mod connector_azure;
pub mod connector_fs;
pub mod csv_io;
pub mod error;
pub mod logging;
pub mod merge;
pub mod models;
pub mod progress;
pub mod remote;
pub mod split;
