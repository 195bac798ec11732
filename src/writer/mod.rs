//! The ZDW file writer.
//!
//! Conversion is two-pass per block: pass 1 scans rows to build the
//! dictionary and per-column ranges, pass 2 re-reads the same rows and
//! encodes them against the resulting layout. Seekable input rewinds for
//! the second pass; non-seekable input spills rows to a compressed
//! temporary file. When the dictionary reports that the memory ceiling has
//! been reached, the current block is closed (`is_final = 0`) and a new one
//! begins where the first pass stopped.

mod block;
pub mod convert;
mod spill;

pub use convert::{convert_sql_file, convert_stream, ConvertOptions, ConvertSummary};
pub use spill::{SpillFile, SpillStore};

use std::collections::BTreeMap;
use std::io::{BufRead, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::io::{split_fields, LineReader, DEFAULT_BUFFER_CAPACITY};
use crate::logger;
use crate::schema::Schema;

use block::{BlockAccumulator, BlockLayout, RowEncoder};

/// Format version emitted by default.
pub const CURRENT_VERSION: u16 = 10;
/// Format version carrying the header metadata block.
pub const METADATA_VERSION: u16 = 11;

/// Writer configuration.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    version11: bool,
    trim_trailing_spaces: bool,
    quiet: bool,
    metadata: BTreeMap<String, String>,
}

impl WriterOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits the v11 format with a metadata block in the header.
    #[must_use]
    pub const fn with_version11(mut self, enabled: bool) -> Self {
        self.version11 = enabled;
        self
    }

    /// Strips trailing ASCII spaces from every field.
    #[must_use]
    pub const fn with_trim_trailing_spaces(mut self, enabled: bool) -> Self {
        self.trim_trailing_spaces = enabled;
        self
    }

    /// Suppresses progress output.
    #[must_use]
    pub const fn with_quiet(mut self, enabled: bool) -> Self {
        self.quiet = enabled;
        self
    }

    /// Key-value pairs stored in the v11 metadata block. Implies nothing
    /// about the emitted version; combine with [`WriterOptions::with_version11`].
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub const fn version(&self) -> u16 {
        if self.version11 {
            METADATA_VERSION
        } else {
            CURRENT_VERSION
        }
    }

    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    #[must_use]
    pub const fn trims_trailing_spaces(&self) -> bool {
        self.trim_trailing_spaces
    }

    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.quiet
    }
}

/// Totals reported after a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: u64,
    pub blocks: u32,
}

/// Writes a complete ZDW byte stream from seekable row input.
///
/// # Errors
///
/// Fails on I/O errors, on a row whose field count disagrees with the
/// schema, or on invalid metadata.
pub fn write_seekable<R, W>(
    schema: &Schema,
    options: &WriterOptions,
    input: &mut R,
    out: &mut W,
) -> Result<WriteSummary>
where
    R: BufRead + Seek,
    W: Write,
{
    validate_metadata(&options.metadata)?;
    write_file_header(out, schema, options)?;

    let num_columns = schema.len();
    let trim = options.trim_trailing_spaces;
    let mut acc = BlockAccumulator::new(num_columns);
    let mut high_water = DEFAULT_BUFFER_CAPACITY;
    let mut row = Vec::new();
    let mut total_rows = 0u64;
    let mut blocks = 0u32;

    loop {
        blocks += 1;
        let block_start = input.stream_position()?;
        acc.reset();

        // Pass 1: collect the dictionary and per-column ranges.
        let mut done = true;
        {
            let progress = logger::Progress::rows(options.quiet);
            let mut lines = LineReader::with_high_water(&mut *input, high_water);
            while lines.next_row(&mut row)? {
                let fields = split_fields(&row, trim);
                check_column_count(num_columns, fields.len(), total_rows + u64::from(acc.num_rows))?;
                let headroom = acc.scan_row(schema.columns(), &row, &fields);
                acc.num_rows += 1;
                progress.tick(u64::from(acc.num_rows));
                if !headroom {
                    done = false;
                    break;
                }
            }
            progress.finish(u64::from(acc.num_rows));
            high_water = lines.longest_line();
        }

        write_block_header(out, &acc, high_water, done)?;
        let layout = BlockLayout::compute(schema.columns(), &acc);
        acc.dict.write(out)?;
        layout.write(out)?;

        // Pass 2: rewind and encode exactly the rows scanned above.
        input.seek(SeekFrom::Start(block_start))?;
        {
            let mut lines = LineReader::with_high_water(&mut *input, high_water);
            encode_rows(
                &mut lines, schema, options, &acc, &layout, &mut row, out,
            )?;
        }

        total_rows += u64::from(acc.num_rows);
        if done {
            break;
        }
    }

    Ok(WriteSummary {
        rows: total_rows,
        blocks,
    })
}

/// Writes a complete ZDW byte stream from non-seekable row input, spilling
/// each block's rows to a compressed temporary file in `spill_dir` for the
/// second pass. The spill files are returned so validation can replay them.
///
/// # Errors
///
/// Fails on I/O errors, bad rows, invalid metadata, or when a spill file
/// cannot be created.
pub fn write_streaming<R, W>(
    schema: &Schema,
    options: &WriterOptions,
    input: R,
    out: &mut W,
    spill_dir: &Path,
) -> Result<(WriteSummary, Vec<SpillFile>)>
where
    R: BufRead,
    W: Write,
{
    validate_metadata(&options.metadata)?;
    write_file_header(out, schema, options)?;

    let num_columns = schema.len();
    let trim = options.trim_trailing_spaces;
    let mut acc = BlockAccumulator::new(num_columns);
    let mut lines = LineReader::new(input);
    let mut row = Vec::new();
    let mut total_rows = 0u64;
    let mut blocks = 0u32;
    let mut spills = Vec::new();

    loop {
        blocks += 1;
        acc.reset();
        let mut spill = SpillStore::create_in(spill_dir)?;

        let mut done = true;
        let progress = logger::Progress::rows(options.quiet);
        while lines.next_row(&mut row)? {
            let fields = split_fields(&row, trim);
            check_column_count(num_columns, fields.len(), total_rows + u64::from(acc.num_rows))?;
            spill.write_row(&row, &fields)?;
            let headroom = acc.scan_row(schema.columns(), &row, &fields);
            acc.num_rows += 1;
            progress.tick(u64::from(acc.num_rows));
            if !headroom {
                done = false;
                break;
            }
        }
        progress.finish(u64::from(acc.num_rows));
        let spill = spill.finish()?;

        let high_water = lines.longest_line();
        write_block_header(out, &acc, high_water, done)?;
        let layout = BlockLayout::compute(schema.columns(), &acc);
        acc.dict.write(out)?;
        layout.write(out)?;

        {
            let mut pass2 = LineReader::with_high_water(spill.reader()?, high_water);
            encode_rows(
                &mut pass2, schema, options, &acc, &layout, &mut row, out,
            )?;
        }
        spills.push(spill);

        total_rows += u64::from(acc.num_rows);
        if done {
            break;
        }
    }

    Ok((
        WriteSummary {
            rows: total_rows,
            blocks,
        },
        spills,
    ))
}

fn encode_rows<R, W>(
    lines: &mut LineReader<R>,
    schema: &Schema,
    options: &WriterOptions,
    acc: &BlockAccumulator,
    layout: &BlockLayout,
    row: &mut Vec<u8>,
    out: &mut W,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut encoder = RowEncoder::new(schema.len());
    let progress = logger::Progress::rows(options.quiet);
    for n in 0..acc.num_rows {
        if !lines.next_row(row)? {
            return Err(Error::RowCountMismatch {
                expected: acc.num_rows,
                actual: n,
            });
        }
        let fields = split_fields(row, options.trim_trailing_spaces);
        check_column_count(schema.len(), fields.len(), u64::from(n))?;
        encoder.encode_row(schema.columns(), layout, &acc.dict, row, &fields, out)?;
        progress.tick(u64::from(n) + 1);
    }
    progress.finish(u64::from(acc.num_rows));
    Ok(())
}

fn check_column_count(expected: usize, actual: usize, rows_before: u64) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::WrongColumnCountOnRow {
            row: rows_before + 1,
            expected,
            actual,
        })
    }
}

fn write_block_header<W: Write>(
    out: &mut W,
    acc: &BlockAccumulator,
    max_row_size: usize,
    is_final: bool,
) -> Result<()> {
    out.write_all(&acc.num_rows.to_le_bytes())?;
    out.write_all(&(max_row_size as u32).to_le_bytes())?;
    out.write_all(&[u8::from(is_final)])?;
    Ok(())
}

fn write_file_header<W: Write>(out: &mut W, schema: &Schema, options: &WriterOptions) -> Result<()> {
    out.write_all(&options.version().to_le_bytes())?;

    if options.version11 {
        let mut length = 0u32;
        for (key, value) in &options.metadata {
            length += (key.len() + value.len() + 2) as u32;
        }
        out.write_all(&length.to_le_bytes())?;
        for (key, value) in &options.metadata {
            out.write_all(key.as_bytes())?;
            out.write_all(&[0])?;
            out.write_all(value.as_bytes())?;
            out.write_all(&[0])?;
        }
    }

    // Column names: NUL-terminated strings, then one empty name.
    for column in schema.columns() {
        out.write_all(column.name.as_bytes())?;
        out.write_all(&[0])?;
    }
    out.write_all(&[0])?;

    for column in schema.columns() {
        out.write_all(&[column.ty.wire_tag()])?;
    }
    for column in schema.columns() {
        out.write_all(&column.char_width.to_le_bytes())?;
    }
    Ok(())
}

/// Rejects metadata pairs whose key contains `=` or a newline, or whose
/// value contains a newline.
///
/// # Errors
///
/// Returns [`Error::BadMetadataParam`] naming the offending key.
pub fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<()> {
    for (key, value) in metadata {
        if key.contains('=') || key.contains('\n') {
            return Err(Error::BadMetadataParam {
                details: format!("key '{key}' contains a forbidden character").into(),
            });
        }
        if value.contains('\n') {
            return Err(Error::BadMetadataParam {
                details: format!("value for key '{key}' contains a newline").into(),
            });
        }
    }
    Ok(())
}

/// Loads `key=value` metadata lines from a file. Empty lines are skipped;
/// a line without `=` is an error naming its line number.
///
/// # Errors
///
/// Returns [`Error::BadMetadataFile`] on a malformed line, or the I/O
/// error from opening the file.
pub fn load_metadata_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path).map_err(|_| Error::FileOpen {
        path: PathBuf::from(path),
    })?;
    let mut metadata = BTreeMap::new();
    for (number, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let Some(eq) = line.find('=') else {
            return Err(Error::BadMetadataFile {
                path: PathBuf::from(path),
                line: number + 1,
            });
        };
        metadata.insert(line[..eq].to_owned(), line[eq + 1..].to_owned());
    }
    Ok(metadata)
}
