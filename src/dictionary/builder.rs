use std::collections::BTreeMap;
use std::io::Write;

use crate::error::Result;
use crate::memory;
use crate::wire;

/// Heap growth stride at which the process memory budget is re-probed.
const HEAP_CHECK_STRIDE: u64 = 64 * 1024 * 1024;

/// Writer-side insert-only dictionary.
///
/// Entries are kept sorted by byte content; offsets are assigned when the
/// dictionary is serialized and remain valid until [`DictionaryBuilder::clear`].
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    entries: BTreeMap<Box<[u8]>, u64>,
    heap_bytes: u64,
    next_check: u64,
    low_memory: bool,
}

impl DictionaryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            heap_bytes: 0,
            next_check: HEAP_CHECK_STRIDE,
            low_memory: false,
        }
    }

    /// Registers `bytes` as a dictionary entry. Duplicate insertions are
    /// idempotent.
    ///
    /// Returns whether memory headroom remains; `false` tells the block
    /// writer to close the current block after the row in progress.
    pub fn insert(&mut self, bytes: &[u8]) -> bool {
        if !self.entries.contains_key(bytes) {
            self.entries.insert(bytes.to_vec().into_boxed_slice(), 0);
            self.heap_bytes += bytes.len() as u64 + 1;
            if self.heap_bytes >= self.next_check {
                self.next_check = self.heap_bytes + HEAP_CHECK_STRIDE;
                if !memory::can_allocate(self.heap_bytes, HEAP_CHECK_STRIDE) {
                    self.low_memory = true;
                }
            }
        }
        !self.low_memory
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Serialized blob size: every entry plus its terminator, plus the
    /// origin byte.
    #[must_use]
    pub fn blob_size(&self) -> u64 {
        self.heap_bytes + 1
    }

    /// Byte width required to express any offset into the blob.
    #[must_use]
    pub fn offset_width(&self) -> u8 {
        wire::width_for(self.blob_size())
    }

    /// Serializes the dictionary and assigns every entry its offset.
    ///
    /// Wire form: `offset_width` byte, then `blob_size` in that many LE
    /// bytes, then the origin NUL, then each entry NUL-terminated in
    /// ascending byte order. An empty dictionary is the single byte 0.
    ///
    /// # Errors
    ///
    /// Returns an error when the output stream fails.
    pub fn write<W: Write>(&mut self, out: &mut W) -> Result<()> {
        if self.entries.is_empty() {
            out.write_all(&[0u8])?;
            return Ok(());
        }

        let width = self.offset_width();
        out.write_all(&[width])?;
        out.write_all(&self.blob_size().to_le_bytes()[..width as usize])?;

        // Origin byte: only nonzero offsets are recognized by the reader.
        out.write_all(&[0u8])?;
        let mut offset = 1u64;
        for (bytes, slot) in &mut self.entries {
            *slot = offset;
            out.write_all(bytes)?;
            out.write_all(&[0u8])?;
            offset += bytes.len() as u64 + 1;
        }
        debug_assert_eq!(offset, self.heap_bytes + 1);
        Ok(())
    }

    /// Offset previously assigned by [`DictionaryBuilder::write`].
    ///
    /// # Panics
    ///
    /// Panics if `bytes` was never inserted; the two-pass writer only asks
    /// for values it registered during the first pass.
    #[must_use]
    pub fn offset_of(&self, bytes: &[u8]) -> u64 {
        *self
            .entries
            .get(bytes)
            .expect("dictionary offset requested for unregistered entry")
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.heap_bytes = 0;
        self.next_check = HEAP_CHECK_STRIDE;
        self.low_memory = false;
    }
}
