//! ZDW: a columnar archival codec for tab-separated exports.
//!
//! A ZDW file stores row-oriented tabular data rearranged for maximal
//! post-compression ratio under generic entropy coders: a sorted string
//! dictionary shared by all text columns, per-column minimum-value
//! baselines with variable byte widths, and a bit-flagged run-elimination
//! scheme that emits a value only when it differs from the previous row.
//!
//! The [`writer`] converts TSV rows (plus a typed description side-car)
//! into the format in two passes per block; the [`reader`] streams rows
//! back out, either byte-exactly into a [`sinks::RowSink`] or as typed
//! [`Value`] rows with optional column projection.

pub mod compress;
pub mod dictionary;
pub mod error;
pub mod io;
pub mod logger;
pub mod memory;
pub mod reader;
pub mod schema;
pub mod sinks;
pub mod value;
pub mod wire;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{
    ColumnSelection, InclusionRule, ReadOptions, ZdwReader, VIRTUAL_BASENAME_COLUMN,
    VIRTUAL_ROW_COLUMN,
};
pub use schema::{Column, ColumnType, Schema};
pub use value::Value;
pub use writer::{ConvertOptions, WriterOptions};
