//! Spill store for two-pass conversion of non-seekable input.
//!
//! Pass 1 copies every row into a gzip-compressed temporary file; pass 2
//! re-reads the rows from it. The temporary file is removed on drop unless
//! it is being retained for validation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Write side of the spill: one block's rows, gzip-compressed.
pub struct SpillStore {
    temp: NamedTempFile,
    encoder: GzEncoder<BufWriter<File>>,
}

impl SpillStore {
    /// Creates a spill file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotOpenTempFile`] when the file cannot be
    /// created there.
    pub fn create_in(dir: &Path) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(".zdw-spill-")
            .suffix(".gz")
            .tempfile_in(dir)
            .map_err(|err| Error::CannotOpenTempFile {
                details: format!("{}: {err}", dir.display()).into(),
            })?;
        let handle = temp.reopen().map_err(|err| Error::CannotOpenTempFile {
            details: err.to_string().into(),
        })?;
        let encoder = GzEncoder::new(BufWriter::new(handle), flate2::Compression::fast());
        Ok(Self { temp, encoder })
    }

    /// Appends one row, reconstructed from its fields, newline-terminated.
    pub fn write_row(&mut self, row: &[u8], fields: &[Range<usize>]) -> Result<()> {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.encoder.write_all(b"\t")?;
            }
            self.encoder.write_all(&row[field.clone()])?;
        }
        self.encoder.write_all(b"\n")?;
        Ok(())
    }

    /// Completes the compressed stream and hands back the read side.
    ///
    /// # Errors
    ///
    /// Returns an error when the trailing gzip frame cannot be written.
    pub fn finish(self) -> Result<SpillFile> {
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        Ok(SpillFile { temp: self.temp })
    }
}

/// Read side of a completed spill. Kept alive through validation; the file
/// disappears when this is dropped.
pub struct SpillFile {
    temp: NamedTempFile,
}

impl SpillFile {
    /// Opens a fresh decompressing reader over the rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotOpenTempFile`] when the spill cannot be
    /// reopened.
    pub fn reader(&self) -> Result<BufReader<GzDecoder<File>>> {
        let handle = self.temp.reopen().map_err(|err| Error::CannotOpenTempFile {
            details: err.to_string().into(),
        })?;
        Ok(BufReader::new(GzDecoder::new(handle)))
    }
}
