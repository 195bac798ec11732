//! Per-block accumulation and row encoding.
//!
//! Pass 1 scans rows into a [`BlockAccumulator`]: distinct strings go to the
//! dictionary, numeric and CHAR columns track their min/max. Pass 2 encodes
//! rows against the [`BlockLayout`] derived from those statistics.

use std::io::Write;
use std::ops::Range;

use smallvec::SmallVec;

use crate::dictionary::DictionaryBuilder;
use crate::error::Result;
use crate::schema::{Column, ColumnType};
use crate::wire;

/// Per-column statistics gathered during the first pass over a block.
pub(crate) struct BlockAccumulator {
    pub dict: DictionaryBuilder,
    minmax_set: Vec<bool>,
    min: Vec<u64>,
    max: Vec<u64>,
    pub num_rows: u32,
}

impl BlockAccumulator {
    pub fn new(num_columns: usize) -> Self {
        Self {
            dict: DictionaryBuilder::new(),
            minmax_set: vec![false; num_columns],
            min: vec![0; num_columns],
            max: vec![0; num_columns],
            num_rows: 0,
        }
    }

    pub fn reset(&mut self) {
        self.dict.clear();
        self.minmax_set.fill(false);
        self.min.fill(0);
        self.max.fill(0);
        self.num_rows = 0;
    }

    /// Scans one row's fields, updating the dictionary and min/max ranges.
    ///
    /// Returns whether memory headroom remains; `false` asks the driver to
    /// close the block after this row.
    pub fn scan_row(&mut self, columns: &[Column], row: &[u8], fields: &[Range<usize>]) -> bool {
        let mut headroom = true;
        for (c, column) in columns.iter().enumerate() {
            let bytes = &row[fields[c].clone()];
            if bytes.is_empty() {
                continue;
            }
            if column.ty.uses_dictionary() {
                self.minmax_set[c] = true;
                headroom &= self.dict.insert(bytes);
            } else {
                let value = raw_numeric_value(column.ty, bytes);
                if value > 0 {
                    if self.minmax_set[c] {
                        if value > self.max[c] {
                            self.max[c] = value;
                        } else if value < self.min[c] {
                            self.min[c] = value;
                        }
                    } else {
                        self.min[c] = value;
                        self.max[c] = value;
                        self.minmax_set[c] = true;
                    }
                }
            }
        }
        headroom
    }
}

/// Per-block wire layout: byte widths and baselines per column, plus the
/// dense list of used columns whose bits appear in the delta-flag array.
pub(crate) struct BlockLayout {
    pub widths: Vec<u8>,
    pub baselines: Vec<u64>,
    pub used: Vec<usize>,
}

impl BlockLayout {
    /// Derives the layout from first-pass statistics.
    ///
    /// Baselines are arranged so the smallest actual value encodes as
    /// stored value 1; zero on the wire always means "default".
    pub fn compute(columns: &[Column], acc: &BlockAccumulator) -> Self {
        let mut widths = vec![0u8; columns.len()];
        let mut baselines = vec![0u64; columns.len()];
        let mut used = Vec::new();
        for (c, column) in columns.iter().enumerate() {
            if !acc.minmax_set[c] {
                continue;
            }
            if column.ty.uses_dictionary() {
                widths[c] = acc.dict.offset_width();
            } else {
                let baseline = acc.min[c].wrapping_sub(1);
                baselines[c] = baseline;
                widths[c] = wire::width_for(acc.max[c].wrapping_sub(baseline));
            }
            used.push(c);
        }
        Self {
            widths,
            baselines,
            used,
        }
    }

    pub fn flag_bytes(&self) -> usize {
        self.used.len().div_ceil(8)
    }

    /// Emits the layout section of the block header: one width byte per
    /// file column, then a baseline u64 for each used column.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.widths)?;
        for &c in &self.used {
            out.write_all(&self.baselines[c].to_le_bytes())?;
        }
        Ok(())
    }
}

/// Encodes rows against a fixed layout, tracking previous stored values for
/// the delta flags. Prior values start at zero, so every first-row value
/// that differs from zero sets its bit.
pub(crate) struct RowEncoder {
    prev: Vec<u64>,
    flags: SmallVec<[u8; 8]>,
    values: Vec<u8>,
}

impl RowEncoder {
    pub fn new(num_columns: usize) -> Self {
        Self {
            prev: vec![0; num_columns],
            flags: SmallVec::new(),
            values: Vec::new(),
        }
    }

    pub fn encode_row<W: Write>(
        &mut self,
        columns: &[Column],
        layout: &BlockLayout,
        dict: &DictionaryBuilder,
        row: &[u8],
        fields: &[Range<usize>],
        out: &mut W,
    ) -> Result<()> {
        self.flags.clear();
        self.flags.resize(layout.flag_bytes(), 0);
        self.values.clear();

        for (u, &c) in layout.used.iter().enumerate() {
            let bytes = &row[fields[c].clone()];
            let stored = stored_value(columns[c].ty, bytes, layout.baselines[c], dict);
            if stored != self.prev[c] {
                self.flags[u / 8] |= 1u8 << (u % 8);
                wire::append_var(&mut self.values, stored, layout.widths[c]);
                self.prev[c] = stored;
            }
        }

        out.write_all(&self.flags)?;
        out.write_all(&self.values)?;
        Ok(())
    }
}

/// The on-wire stored value for one field under the block layout.
fn stored_value(ty: ColumnType, bytes: &[u8], baseline: u64, dict: &DictionaryBuilder) -> u64 {
    if ty.uses_dictionary() {
        if bytes.is_empty() {
            return 0;
        }
        return dict.offset_of(bytes);
    }
    let value = raw_numeric_value(ty, bytes);
    if value > 0 {
        value.wrapping_sub(baseline)
    } else {
        0
    }
}

/// The raw unsigned value of a CHAR or numeric field before baselining.
fn raw_numeric_value(ty: ColumnType, bytes: &[u8]) -> u64 {
    if ty == ColumnType::Char {
        char_value(bytes)
    } else {
        parse_u64_wrapping(bytes)
    }
}

/// CHAR fields hold one character, or a two-byte escape pair whose second
/// byte rides in bits 8..16.
fn char_value(bytes: &[u8]) -> u64 {
    match bytes {
        [] => 0,
        [b'\\', escaped, ..] => u64::from(b'\\') | (u64::from(*escaped) << 8),
        [ch, ..] => u64::from(*ch),
    }
}

/// Base-10 unsigned parse with `strtoull` semantics: leading whitespace is
/// skipped, an optional sign is honored with wrap-around, parsing stops at
/// the first non-digit. Signed column values deliberately wrap; the type
/// tag reverses this on read.
fn parse_u64_wrapping(bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    let mut negative = false;
    if i < bytes.len() && (bytes[i] == b'-' || bytes[i] == b'+') {
        negative = bytes[i] == b'-';
        i += 1;
    }
    let mut value = 0u64;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value
            .wrapping_mul(10)
            .wrapping_add(u64::from(bytes[i] - b'0'));
        i += 1;
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}
