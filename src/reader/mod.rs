//! The ZDW file reader.
//!
//! [`ZdwReader`] wraps an already-decompressed byte stream and yields rows
//! strictly in file order, either through a [`RowSink`] (byte-exact TSV
//! emission) or as typed [`Value`] rows. Decoding follows a small state
//! machine: `Begin` → `ParseBlockHeader` → `GetNextRow` (self-looping) →
//! `Finishing` → `End`; every call after `End` reports end-of-file.

mod block;
mod projection;

pub use projection::{ColumnSelection, InclusionRule};

use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;
use serde::Serialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::error::{Error, Result, Section};
use crate::io::BufferedInput;
use crate::logger;
use crate::schema::{Column, ColumnType};
use crate::sinks::RowSink;
use crate::value::Value;

use block::BlockReader;
use projection::ProjectionPlan;

/// Name that projects the input file's basename as a synthesized column.
pub const VIRTUAL_BASENAME_COLUMN: &str = "virtual_export_basename";
/// Name that projects the 1-based row ordinal as a synthesized column.
pub const VIRTUAL_ROW_COLUMN: &str = "virtual_export_row";

const MIN_SUPPORTED_VERSION: u16 = 9;
const MAX_SUPPORTED_VERSION: u16 = 11;

const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Reader configuration.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    selection: Option<ColumnSelection>,
    encoding: Option<&'static Encoding>,
    source_name: Option<String>,
}

impl ReadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Projects a subset of columns under the given inclusion rule.
    #[must_use]
    pub fn with_selection(mut self, selection: ColumnSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Character encoding for typed text values. Unset leaves valid UTF-8
    /// borrowed and falls back to raw bytes otherwise.
    #[must_use]
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Resolves an encoding label (e.g. `latin1`) for typed text values.
    #[must_use]
    pub fn with_encoding_label(mut self, label: &str) -> Self {
        self.encoding = Encoding::for_label(label.trim().as_bytes());
        self
    }

    /// Names the input, feeding the virtual basename column. Any trailing
    /// `.zdw*` suffix is stripped.
    #[must_use]
    pub fn with_source_path(mut self, path: &Path) -> Self {
        self.source_name = Some(basename_for(path));
        self
    }
}

fn basename_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind(".zdw") {
        Some(pos) => name[..pos].to_owned(),
        None => name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    ParseBlockHeader,
    GetNextRow,
    Finishing,
    End,
}

/// Streaming reader over one ZDW file.
pub struct ZdwReader<R: Read> {
    input: BufferedInput<R>,
    options: ReadOptions,
    state: State,
    version: u16,
    metadata: Vec<(String, String)>,
    columns: Vec<Column>,
    file_columns: usize,
    plan: ProjectionPlan,
    block: Option<BlockReader>,
    blocks_read: u32,
    rows_total: u64,
    /// 1-based ordinal of the row most recently decoded.
    row_number: u64,
    source_name: String,
}

impl<R: Read> ZdwReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_options(input, ReadOptions::default())
    }

    pub fn with_options(input: R, options: ReadOptions) -> Self {
        let source_name = options
            .source_name
            .clone()
            .unwrap_or_else(|| "stdin".to_owned());
        Self {
            input: BufferedInput::new(input),
            options,
            state: State::Begin,
            version: 0,
            metadata: Vec::new(),
            columns: Vec::new(),
            file_columns: 0,
            plan: ProjectionPlan::identity(0),
            block: None,
            blocks_read: 0,
            rows_total: 0,
            row_number: 0,
            source_name,
        }
    }

    /// Parses the file header: version, optional metadata, column names,
    /// type tags and declared widths; then resolves the projection.
    ///
    /// # Errors
    ///
    /// [`Error::HeaderAlreadyRead`] on a second call,
    /// [`Error::UnsupportedVersion`] outside versions 9–11, projection
    /// errors, or corruption/I/O errors.
    pub fn read_header(&mut self) -> Result<()> {
        if self.state != State::Begin {
            return Err(Error::HeaderAlreadyRead);
        }

        self.version = self.input.read_u16()?;
        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&self.version) {
            return Err(Error::UnsupportedVersion {
                version: self.version,
            });
        }

        if self.version >= 11 {
            self.read_metadata_block()?;
        }

        // Column names: NUL-terminated, ended by an empty name.
        let mut name = Vec::new();
        let mut names: Vec<String> = Vec::new();
        loop {
            self.input.read_nul_terminated(&mut name)?;
            if name.is_empty() {
                break;
            }
            names.push(String::from_utf8_lossy(&name).into_owned());
        }
        self.file_columns = names.len();

        let mut tags = vec![0u8; self.file_columns];
        self.input.read_exact(&mut tags)?;
        let mut widths = vec![0u8; self.file_columns * 2];
        self.input.read_exact(&mut widths)?;

        self.columns = Vec::with_capacity(self.file_columns);
        for (i, name) in names.into_iter().enumerate() {
            let ty = ColumnType::from_wire_tag(tags[i]).ok_or(Error::CorruptedData {
                section: Section::Header,
                details: format!("unknown column type tag {}", tags[i]).into(),
            })?;
            let char_width = u16::from_le_bytes([widths[i * 2], widths[i * 2 + 1]]);
            self.columns.push(Column {
                name,
                ty,
                char_width,
            });
        }

        self.append_virtual_columns();
        self.plan = match &self.options.selection {
            Some(selection) => ProjectionPlan::resolve(&self.columns, selection)?,
            None => ProjectionPlan::identity(self.columns.len()),
        };

        self.state = State::ParseBlockHeader;
        Ok(())
    }

    fn read_metadata_block(&mut self) -> Result<()> {
        let length = self.input.read_u32()? as usize;
        let mut bytes = vec![0u8; length];
        self.input.read_exact(&mut bytes)?;
        let mut rest = &bytes[..];
        while !rest.is_empty() {
            let key_end = rest.iter().position(|&b| b == 0).ok_or(Error::CorruptedData {
                section: Section::Metadata,
                details: "unterminated metadata key".into(),
            })?;
            let value_start = key_end + 1;
            let value_len = rest[value_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or(Error::CorruptedData {
                    section: Section::Metadata,
                    details: "unterminated metadata value".into(),
                })?;
            let key = String::from_utf8_lossy(&rest[..key_end]).into_owned();
            let value =
                String::from_utf8_lossy(&rest[value_start..value_start + value_len]).into_owned();
            self.metadata.push((key, value));
            rest = &rest[value_start + value_len + 1..];
        }
        Ok(())
    }

    /// Appends the virtual columns when the projection requests them by
    /// name (never under the exclusion rule).
    fn append_virtual_columns(&mut self) {
        let Some(selection) = &self.options.selection else {
            return;
        };
        if selection.rule() == InclusionRule::Exclude {
            return;
        }
        if selection.contains(VIRTUAL_BASENAME_COLUMN) {
            let width = (self.source_name.len() + 1).min(u16::MAX as usize) as u16;
            self.columns.push(
                Column::new(VIRTUAL_BASENAME_COLUMN, ColumnType::VirtualBasename)
                    .with_char_width(width),
            );
        }
        if selection.contains(VIRTUAL_ROW_COLUMN) {
            self.columns
                .push(Column::new(VIRTUAL_ROW_COLUMN, ColumnType::VirtualRow));
        }
    }

    /// File format version, valid after [`ZdwReader::read_header`].
    #[must_use]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Metadata pairs from a v11 header, in file order.
    #[must_use]
    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    /// All columns, including any synthesized virtual columns.
    ///
    /// # Errors
    ///
    /// [`Error::HeaderNotReadYet`] before [`ZdwReader::read_header`].
    pub fn columns(&self) -> Result<&[Column]> {
        if self.state == State::Begin {
            return Err(Error::HeaderNotReadYet);
        }
        Ok(&self.columns)
    }

    /// Output columns in caller order, blanks rendered as `text`; the
    /// schema of the emitted rows and of the description side-car.
    ///
    /// # Errors
    ///
    /// [`Error::HeaderNotReadYet`] before [`ZdwReader::read_header`].
    pub fn output_columns(&self) -> Result<Vec<Column>> {
        if self.state == State::Begin {
            return Err(Error::HeaderNotReadYet);
        }
        let mut out: Vec<Option<Column>> = vec![None; self.plan.num_outputs];
        for (c, slot) in self.plan.out_index.iter().enumerate() {
            if let Some(slot) = slot {
                out[*slot] = Some(self.columns[c].clone());
            }
        }
        for (slot, name) in &self.plan.blanks {
            out[*slot] = Some(Column::new(name.clone(), ColumnType::Text));
        }
        Ok(out
            .into_iter()
            .map(|c| c.expect("projection slots are gapless"))
            .collect())
    }

    /// The reordering permutation for [`crate::sinks::OrderedTsvSink`],
    /// or `None` when rows already emit in file order.
    #[must_use]
    pub fn output_order(&self) -> Option<Vec<Option<usize>>> {
        if self.options.selection.is_some() {
            Some(self.plan.output_order())
        } else {
            None
        }
    }

    /// Decodes the next row and emits it into `sink`. Returns `false` at a
    /// clean end of file.
    ///
    /// # Errors
    ///
    /// Format errors abort the current file; no partial row is emitted.
    pub fn next_row_into<S: RowSink>(&mut self, sink: &mut S) -> Result<bool> {
        if !self.advance_row()? {
            return Ok(false);
        }
        self.emit_current(sink)?;
        sink.end_row()?;
        Ok(true)
    }

    /// Decodes the next row as typed values, in output order.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ZdwReader::next_row_into`].
    pub fn try_next(&mut self) -> Result<Option<Vec<Value<'_>>>> {
        if !self.advance_row()? {
            return Ok(None);
        }
        Ok(Some(self.current_values()?))
    }

    /// Iterator over owned typed rows.
    pub fn rows(&mut self) -> RowsIter<'_, R> {
        RowsIter { reader: self }
    }

    /// Decodes every remaining row, validating dictionary offsets and row
    /// counts, emitting nothing.
    ///
    /// # Errors
    ///
    /// Any format error the full decode would surface.
    pub fn test_integrity(&mut self) -> Result<u64> {
        let mut sink = NullSink;
        let mut rows = 0u64;
        while self.next_row_into(&mut sink)? {
            rows += 1;
        }
        Ok(rows)
    }

    /// Releases the current block (dictionary blob included) and pins the
    /// reader at end of file. Idempotent.
    pub fn close(&mut self) {
        self.block = None;
        self.state = State::End;
    }

    /// Advances the state machine until one row is decoded (true) or the
    /// file ends cleanly (false).
    fn advance_row(&mut self) -> Result<bool> {
        loop {
            match self.state {
                State::Begin => {
                    self.read_header()?;
                }
                State::ParseBlockHeader => {
                    let block = BlockReader::parse(
                        &mut self.input,
                        &self.columns,
                        self.file_columns,
                        self.blocks_read,
                        false,
                    )?;
                    self.blocks_read += 1;
                    self.block = Some(block);
                    self.state = State::GetNextRow;
                }
                State::GetNextRow => {
                    let block = self.block.as_mut().expect("a block is being decoded");
                    if block.rows_read < block.num_rows {
                        if self.input.probe_eof()? {
                            return Err(Error::RowCountMismatch {
                                expected: block.num_rows,
                                actual: block.rows_read,
                            });
                        }
                        block.next_row(&mut self.input, &self.columns)?;
                        self.rows_total += 1;
                        self.row_number = self.rows_total;
                        return Ok(true);
                    }
                    let is_final = block.is_final;
                    self.block = None;
                    self.state = if is_final {
                        State::Finishing
                    } else {
                        State::ParseBlockHeader
                    };
                }
                State::Finishing => {
                    let mut probe = [0u8; 1];
                    let extra = self.input.read_some(&mut probe)?;
                    self.state = State::End;
                    if extra > 0 {
                        return Err(Error::TruncatedOrLonger);
                    }
                    return Ok(false);
                }
                State::End => return Ok(false),
            }
        }
    }

    /// Emits the already-decoded current row into a sink, column by
    /// column, raw dictionary bytes passing through untouched.
    fn emit_current<S: RowSink>(&self, sink: &mut S) -> Result<()> {
        let block = self.block.as_ref().expect("a row has been decoded");
        let mut itoa_buf = itoa::Buffer::new();
        let mut written = false;
        for (c, column) in self.columns.iter().enumerate() {
            if self.plan.out_index[c].is_none() {
                continue;
            }
            if written {
                sink.write_separator()?;
            }
            written = true;

            if block.widths[c] == 0 {
                self.emit_default(column.ty, sink, &mut itoa_buf)?;
                continue;
            }
            let decoded = block.finals()[c];
            match column.ty {
                ty if ty.uses_dictionary() => match block.dictionary.lookup(decoded)? {
                    Some(bytes) => sink.write(bytes)?,
                    None => self.emit_default(ty, sink, &mut itoa_buf)?,
                },
                ColumnType::Char => {
                    let low = (decoded & 0xFF) as u8;
                    if low == b'\\' {
                        sink.write(&[b'\\', ((decoded >> 8) & 0xFF) as u8])?;
                    } else if low == 0 {
                        sink.write_empty()?;
                    } else {
                        sink.write(&[low])?;
                    }
                }
                ty if ty.is_signed() => {
                    sink.write(itoa_buf.format(decoded as i64).as_bytes())?;
                }
                _ => {
                    sink.write(itoa_buf.format(decoded).as_bytes())?;
                }
            }
        }
        for _ in &self.plan.blanks {
            if written {
                sink.write_separator()?;
            }
            written = true;
            sink.write_empty()?;
        }
        Ok(())
    }

    fn emit_default<S: RowSink>(
        &self,
        ty: ColumnType,
        sink: &mut S,
        itoa_buf: &mut itoa::Buffer,
    ) -> Result<()> {
        match ty {
            ColumnType::VirtualBasename => sink.write(self.source_name.as_bytes()),
            ColumnType::VirtualRow => sink.write(itoa_buf.format(self.row_number).as_bytes()),
            _ => {
                let default = ty.default_text();
                if default.is_empty() {
                    sink.write_empty()
                } else {
                    sink.write(default)
                }
            }
        }
    }

    /// Builds the typed values of the current row in output order.
    fn current_values(&self) -> Result<Vec<Value<'_>>> {
        let block = self.block.as_ref().expect("a row has been decoded");
        let mut slots: Vec<Option<Value<'_>>> = vec![None; self.plan.num_outputs];
        for (c, column) in self.columns.iter().enumerate() {
            let Some(slot) = self.plan.out_index[c] else {
                continue;
            };
            let value = if block.widths[c] == 0 {
                self.default_value(column.ty)
            } else {
                self.typed_value(column, block, c)?
            };
            slots[slot] = Some(value);
        }
        for &slot in self.plan.blanks.keys() {
            slots[slot] = Some(Value::Null);
        }
        Ok(slots
            .into_iter()
            .map(|v| v.expect("projection slots are gapless"))
            .collect())
    }

    fn default_value(&self, ty: ColumnType) -> Value<'_> {
        match ty {
            ColumnType::VirtualBasename => Value::Str(Cow::Borrowed(&self.source_name)),
            ColumnType::VirtualRow => Value::UInt(self.row_number),
            ColumnType::Decimal => Value::Decimal(0.0),
            ty if ty.is_signed() => Value::Int(0),
            ty if ty.is_integer() => Value::UInt(0),
            _ => Value::Null,
        }
    }

    fn typed_value<'a>(
        &'a self,
        column: &Column,
        block: &'a BlockReader,
        c: usize,
    ) -> Result<Value<'a>> {
        let decoded = block.finals()[c];
        Ok(match column.ty {
            ColumnType::Decimal => match block.dictionary.lookup(decoded)? {
                Some(bytes) => parse_decimal(bytes, &column.name),
                None => Value::Decimal(0.0),
            },
            ColumnType::Datetime => match block.dictionary.lookup(decoded)? {
                Some(bytes) => parse_datetime(bytes, &column.name),
                None => Value::Null,
            },
            ty if ty.uses_dictionary() => match block.dictionary.lookup(decoded)? {
                Some(bytes) => decode_text(bytes, self.options.encoding),
                None => Value::Null,
            },
            ColumnType::Char => {
                let low = (decoded & 0xFF) as u8;
                if low == 0 {
                    Value::Null
                } else if low == b'\\' {
                    let pair = vec![b'\\', ((decoded >> 8) & 0xFF) as u8];
                    decode_text_owned(pair, self.options.encoding)
                } else {
                    decode_text_owned(vec![low], self.options.encoding)
                }
            }
            ty if ty.is_signed() => Value::Int(decoded as i64),
            _ => Value::UInt(decoded),
        })
    }

    /// Scans the whole file for per-block statistics without materializing
    /// rows or loading dictionary blobs.
    ///
    /// # Errors
    ///
    /// Fails on the same header/format errors as a full decode.
    pub fn read_statistics(mut self) -> Result<FileStatistics> {
        if self.state != State::Begin {
            return Err(Error::UnsupportedOperation {
                details: "statistics scan requires a fresh reader".into(),
            });
        }
        self.read_header()?;

        let mut blocks = Vec::new();
        let mut rows = 0u64;
        loop {
            let mut block = BlockReader::parse(
                &mut self.input,
                &self.columns,
                self.file_columns,
                self.blocks_read,
                true,
            )?;
            self.blocks_read += 1;
            while block.rows_read < block.num_rows {
                if self.input.probe_eof()? {
                    return Err(Error::RowCountMismatch {
                        expected: block.num_rows,
                        actual: block.rows_read,
                    });
                }
                block.next_row(&mut self.input, &self.columns)?;
            }
            rows += u64::from(block.num_rows);
            let is_final = block.is_final;
            blocks.push(BlockStatistics {
                rows: block.num_rows,
                max_row_size: block.max_row_size,
                dictionary_size: block.dictionary_size,
                used_columns: block.used_columns().len(),
                delta_bits_set: block.delta_bits_set,
                delta_bits_per_column: block.delta_bits_per_used.clone(),
                is_final,
            });
            if is_final {
                break;
            }
        }

        let mut probe = [0u8; 1];
        if self.input.read_some(&mut probe)? > 0 {
            return Err(Error::TruncatedOrLonger);
        }
        Ok(FileStatistics {
            version: self.version,
            column_count: self.file_columns,
            rows,
            blocks,
        })
    }
}

/// Owned-row iterator returned by [`ZdwReader::rows`].
pub struct RowsIter<'a, R: Read> {
    reader: &'a mut ZdwReader<R>,
}

impl<R: Read> Iterator for RowsIter<'_, R> {
    type Item = Result<Vec<Value<'static>>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.try_next() {
            Ok(Some(row)) => Some(Ok(row.into_iter().map(Value::into_owned).collect())),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Sink that discards every row; used by integrity testing.
pub struct NullSink;

impl RowSink for NullSink {
    fn write(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn write_empty(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_separator(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Per-block scan results from [`ZdwReader::read_statistics`].
#[derive(Debug, Clone, Serialize)]
pub struct BlockStatistics {
    pub rows: u32,
    pub max_row_size: u32,
    pub dictionary_size: u64,
    pub used_columns: usize,
    pub delta_bits_set: u64,
    /// Bit population per used column, in declaration order.
    pub delta_bits_per_column: Vec<u64>,
    pub is_final: bool,
}

/// Whole-file scan results.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatistics {
    pub version: u16,
    pub column_count: usize,
    pub rows: u64,
    pub blocks: Vec<BlockStatistics>,
}

fn decode_text<'a>(bytes: &'a [u8], encoding: Option<&'static Encoding>) -> Value<'a> {
    if let Ok(text) = simdutf8::basic::from_utf8(bytes) {
        return Value::Str(Cow::Borrowed(text));
    }
    match encoding {
        Some(enc) => {
            let (decoded, _, _) = enc.decode(bytes);
            Value::Str(Cow::Owned(decoded.into_owned()))
        }
        None => Value::Bytes(Cow::Borrowed(bytes)),
    }
}

fn decode_text_owned(bytes: Vec<u8>, encoding: Option<&'static Encoding>) -> Value<'static> {
    match decode_text(&bytes, encoding) {
        Value::Str(s) => Value::Str(Cow::Owned(s.into_owned())),
        _ => Value::Bytes(Cow::Owned(bytes)),
    }
}

/// DECIMAL dictionary text parsed as a double. Parse failures are
/// non-fatal: the column default is substituted and a warning logged.
fn parse_decimal(bytes: &[u8], column: &str) -> Value<'static> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .map_or_else(
            || {
                logger::log_warn(&format!(
                    "column {column}: unparseable decimal '{}', substituting default",
                    String::from_utf8_lossy(bytes)
                ));
                Value::Decimal(0.0)
            },
            Value::Decimal,
        )
}

/// DATETIME dictionary text parsed as `YYYY-MM-DD HH:MM:SS` in UTC. Parse
/// failures are non-fatal: null is substituted and a warning logged.
fn parse_datetime(bytes: &[u8], column: &str) -> Value<'static> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| PrimitiveDateTime::parse(text.trim(), DATETIME_FORMAT).ok())
        .map_or_else(
            || {
                logger::log_warn(&format!(
                    "column {column}: unparseable datetime '{}', substituting default",
                    String::from_utf8_lossy(bytes)
                ));
                Value::Null
            },
            |dt| Value::DateTime(dt.assume_utc()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::sinks::TsvSink;
    use crate::writer::{write_seekable, WriterOptions};
    use std::io::Cursor;

    fn encode(desc: &str, rows: &str) -> Vec<u8> {
        let schema = Schema::parse_desc(Cursor::new(desc.as_bytes())).unwrap();
        let mut input = Cursor::new(rows.as_bytes().to_vec());
        let mut out = Vec::new();
        let options = WriterOptions::new().with_quiet(true);
        write_seekable(&schema, &options, &mut input, &mut out).unwrap();
        out
    }

    fn decode_tsv(bytes: &[u8], options: ReadOptions) -> String {
        let mut reader = ZdwReader::with_options(Cursor::new(bytes.to_vec()), options);
        reader.read_header().unwrap();
        let mut out = Vec::new();
        match reader.output_order() {
            Some(order) => {
                let mut sink = crate::sinks::OrderedTsvSink::new(&mut out, &order).unwrap();
                while reader.next_row_into(&mut sink).unwrap() {}
            }
            None => {
                let mut sink = TsvSink::new(&mut out);
                while reader.next_row_into(&mut sink).unwrap() {}
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn round_trips_text_rows() {
        let bytes = encode("first\tvarchar(10)\nsecond\tvarchar(10)\n", "a\tb\na\tc\n");
        assert_eq!(decode_tsv(&bytes, ReadOptions::new()), "a\tb\na\tc\n");
    }

    #[test]
    fn header_cannot_be_read_twice() {
        let bytes = encode("a\tvarchar(4)\n", "x\n");
        let mut reader = ZdwReader::new(Cursor::new(bytes));
        reader.read_header().unwrap();
        assert!(matches!(
            reader.read_header(),
            Err(Error::HeaderAlreadyRead)
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut bytes = encode("a\tvarchar(4)\n", "x\n");
        bytes[0] = 8;
        bytes[1] = 0;
        let mut reader = ZdwReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_header(),
            Err(Error::UnsupportedVersion { version: 8 })
        ));
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let mut bytes = encode("a\tvarchar(4)\n", "x\n");
        bytes.push(0xAB);
        let mut reader = ZdwReader::new(Cursor::new(bytes));
        reader.read_header().unwrap();
        let mut sink = NullSink;
        assert!(reader.next_row_into(&mut sink).unwrap());
        assert!(matches!(
            reader.next_row_into(&mut sink),
            Err(Error::TruncatedOrLonger)
        ));
    }

    #[test]
    fn typed_rows_carry_integer_and_null_values() {
        let bytes = encode("name\tvarchar(8)\nn\tint\n", "ada\t-3\n\t\n");
        let mut reader = ZdwReader::new(Cursor::new(bytes));
        reader.read_header().unwrap();

        let row = reader.try_next().unwrap().unwrap();
        assert_eq!(row[0], Value::Str(Cow::Borrowed("ada")));
        assert_eq!(row[1], Value::Int(-3));

        let row = reader.try_next().unwrap().unwrap();
        assert_eq!(row[0], Value::Null);
        assert_eq!(row[1], Value::Int(0));

        assert!(reader.try_next().unwrap().is_none());
    }

    #[test]
    fn projection_reorders_and_fills_missing() {
        let bytes = encode("a\tvarchar(4)\nb\tvarchar(4)\n", "1\t2\n");
        let selection =
            ColumnSelection::new(["a", "c", "b"], InclusionRule::FillMissing);
        let options = ReadOptions::new().with_selection(selection);
        assert_eq!(decode_tsv(&bytes, options), "1\t\t2\n");
    }

    #[test]
    fn virtual_columns_synthesize_basename_and_ordinal() {
        let bytes = encode("a\tvarchar(4)\n", "x\ny\n");
        let selection = ColumnSelection::new(
            ["a", VIRTUAL_ROW_COLUMN, VIRTUAL_BASENAME_COLUMN],
            InclusionRule::FailOnInvalid,
        );
        let options = ReadOptions::new()
            .with_selection(selection)
            .with_source_path(Path::new("/data/export.zdw.gz"));
        assert_eq!(decode_tsv(&bytes, options), "x\t1\texport\ny\t2\texport\n");
    }

    #[test]
    fn statistics_scan_counts_delta_bits() {
        let bytes = encode("a\tvarchar(4)\nn\tint unsigned\n", "x\t1\nx\t2\ny\t2\n");
        let reader = ZdwReader::new(Cursor::new(bytes));
        let stats = reader.read_statistics().unwrap();
        assert_eq!(stats.version, 10);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.blocks.len(), 1);
        // Row 1 sets both bits, row 2 sets n's, row 3 sets a's.
        assert_eq!(stats.blocks[0].delta_bits_set, 4);
        assert!(stats.blocks[0].is_final);
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let bytes = encode("a\tvarchar(4)\n", "x\n");
        let mut reader = ZdwReader::new(Cursor::new(bytes));
        reader.read_header().unwrap();
        reader.close();
        reader.close();
        assert!(reader.try_next().unwrap().is_none());
    }

    #[test]
    fn output_columns_render_blanks_as_text() {
        let bytes = encode("a\tvarchar(4)\n", "x\n");
        let selection = ColumnSelection::new(["missing", "a"], InclusionRule::FillMissing);
        let mut reader =
            ZdwReader::with_options(Cursor::new(bytes), ReadOptions::new().with_selection(selection));
        reader.read_header().unwrap();
        let columns = reader.output_columns().unwrap();
        assert_eq!(columns[0].name, "missing");
        assert_eq!(columns[0].ty, ColumnType::Text);
        assert_eq!(columns[1].name, "a");
    }

    #[test]
    fn basename_strips_zdw_suffixes() {
        assert_eq!(basename_for(Path::new("/x/file.zdw")), "file");
        assert_eq!(basename_for(Path::new("file.zdw.gz")), "file");
        assert_eq!(basename_for(Path::new("weird.zdw.b.zdw.xz")), "weird.zdw.b");
        assert_eq!(basename_for(Path::new("plain.sql")), "plain.sql");
    }

    #[test]
    fn datetime_and_decimal_parse_into_typed_values() {
        let bytes = encode(
            "stamp\tdatetime\nprice\tdecimal(24,12)\n",
            "2023-04-05 06:07:08\t12.5\n",
        );
        let mut reader = ZdwReader::new(Cursor::new(bytes));
        reader.read_header().unwrap();
        let row = reader.try_next().unwrap().unwrap();
        match &row[0] {
            Value::DateTime(dt) => {
                assert_eq!(dt.year(), 2023);
                assert_eq!(dt.hour(), 6);
            }
            other => panic!("expected datetime, got {other:?}"),
        }
        assert_eq!(row[1], Value::Decimal(12.5));
    }
}
