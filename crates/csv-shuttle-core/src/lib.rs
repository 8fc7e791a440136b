//! # csv-shuttle core
//!
//! Shared, I/O-free logic for csv-shuttle: the in-memory table model and
//! its union concatenation, merge bookkeeping columns, file classification,
//! chunk and merge output naming, rows-per-chunk estimation, and the
//! subfolder selection rules used by enumeration backends.
//!
//! This crate touches neither the filesystem nor the network. The
//! `csv-shuttle` crate wires it to CSV readers, writers, and object stores.

pub mod bookkeeping;
pub mod classify;
pub mod estimate;
pub mod naming;
pub mod scope;
pub mod table;
