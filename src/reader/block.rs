//! Block-level decoding: header parse and the bit-flagged row stream.

use std::io::Read;

use smallvec::SmallVec;

use crate::dictionary::DictionaryBlob;
use crate::error::{Error, Result, Section};
use crate::io::BufferedInput;
use crate::schema::Column;

/// One block's decoding state.
///
/// Previous-row state lives in `stored`: the last on-wire value per column.
/// A cleared delta bit reuses that value; the decoded `finals` are the
/// stored values plus the column baseline (zero staying zero to mean
/// "default").
pub(crate) struct BlockReader {
    pub num_rows: u32,
    pub max_row_size: u32,
    pub is_final: bool,
    pub dictionary: DictionaryBlob,
    pub dictionary_size: u64,
    pub widths: Vec<u8>,
    pub baselines: Vec<u64>,
    used: Vec<usize>,
    flag_bytes: usize,
    stored: Vec<u64>,
    finals: Vec<u64>,
    flags: SmallVec<[u8; 8]>,
    pub rows_read: u32,
    pub delta_bits_set: u64,
    pub delta_bits_per_used: Vec<u64>,
    block_index: u32,
}

impl BlockReader {
    /// Parses a block header: row counts, the dictionary, per-column byte
    /// widths and baselines.
    ///
    /// With `skip_dictionary`, the blob bytes are skipped instead of
    /// loaded; offsets can still be range-checked against its size.
    ///
    /// # Errors
    ///
    /// Fails on a truncated stream or a malformed dictionary.
    pub fn parse<R: Read>(
        input: &mut BufferedInput<R>,
        columns: &[Column],
        file_columns: usize,
        block_index: u32,
        skip_dictionary: bool,
    ) -> Result<Self> {
        let num_rows = input.read_u32()?;
        let max_row_size = input.read_u32()?;
        let is_final = input.read_u8()? != 0;

        let offset_width = input.read_u8()?;
        let dictionary_size = if offset_width == 0 {
            0
        } else {
            if offset_width > 8 {
                return Err(Error::CorruptedData {
                    section: Section::Dictionary { block: block_index },
                    details: format!("offset width {offset_width} exceeds 8 bytes").into(),
                });
            }
            input.read_var(offset_width)?
        };
        let dictionary = if skip_dictionary {
            input.skip(dictionary_size)?;
            DictionaryBlob::default()
        } else {
            DictionaryBlob::read_from(input, dictionary_size, block_index)?
        };

        // Widths cover persisted columns only; virtual columns never carry
        // wire bytes and decode through the default path.
        let mut widths = vec![0u8; columns.len()];
        input.read_exact(&mut widths[..file_columns])?;
        let mut baselines = vec![0u64; columns.len()];
        let mut used = Vec::new();
        for (c, width) in widths.iter().copied().enumerate().take(file_columns) {
            if width > 8 {
                return Err(Error::CorruptedData {
                    section: Section::BlockHeader { block: block_index },
                    details: format!("column {c} declares byte width {width}").into(),
                });
            }
            if width > 0 {
                baselines[c] = input.read_u64()?;
                used.push(c);
            }
        }
        let flag_bytes = used.len().div_ceil(8);
        let delta_bits_per_used = vec![0; used.len()];

        Ok(Self {
            num_rows,
            max_row_size,
            is_final,
            dictionary,
            dictionary_size,
            widths,
            baselines,
            used,
            flag_bytes,
            stored: vec![0; columns.len()],
            finals: vec![0; columns.len()],
            flags: SmallVec::new(),
            rows_read: 0,
            delta_bits_set: 0,
            delta_bits_per_used,
            block_index,
        })
    }

    #[must_use]
    pub fn used_columns(&self) -> &[usize] {
        &self.used
    }

    /// Decodes the next row into the per-column finals.
    ///
    /// # Errors
    ///
    /// Fails on a truncated stream or an out-of-range dictionary offset.
    pub fn next_row<R: Read>(
        &mut self,
        input: &mut BufferedInput<R>,
        columns: &[Column],
    ) -> Result<()> {
        self.flags.clear();
        self.flags.resize(self.flag_bytes, 0);
        input.read_exact(&mut self.flags)?;

        for (u, &c) in self.used.iter().enumerate() {
            if self.flags[u / 8] & (1u8 << (u % 8)) != 0 {
                self.stored[c] = input.read_var(self.widths[c])?;
                self.delta_bits_set += 1;
                self.delta_bits_per_used[u] += 1;
            }
            let stored = self.stored[c];
            let decoded = if stored == 0 {
                0
            } else {
                stored.wrapping_add(self.baselines[c])
            };
            if columns[c].ty.uses_dictionary() && decoded > self.dictionary_size {
                return Err(Error::CorruptedData {
                    section: Section::Row {
                        block: self.block_index,
                        row: self.rows_read,
                    },
                    details: format!(
                        "column {c} offset {decoded} exceeds dictionary size {}",
                        self.dictionary_size
                    )
                    .into(),
                });
            }
            self.finals[c] = decoded;
        }
        self.rows_read += 1;
        Ok(())
    }

    /// Decoded per-column values of the current row: dictionary offsets for
    /// text-family columns, baselined integers otherwise; zero means the
    /// column default.
    #[must_use]
    pub fn finals(&self) -> &[u64] {
        &self.finals
    }
}
