//! Buffered byte input for the reader side and logical-line input for the
//! writer side.

use std::io::Read;

use crate::error::Result;
use crate::wire;

pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Buffered reader over the (already decompressed) ZDW byte stream.
///
/// Tracks EOF explicitly: [`BufferedInput::eof`] only reports true once a
/// read has actually observed the end of the underlying stream.
pub struct BufferedInput<R: Read> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    saw_eof: bool,
}

impl<R: Read> BufferedInput<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            buf: vec![0; capacity.max(1)],
            pos: 0,
            len: 0,
            saw_eof: false,
        }
    }

    /// Whether the end of the stream has been observed and the buffer is
    /// drained.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.saw_eof && self.pos == self.len
    }

    /// Like [`BufferedInput::eof`], but reads ahead when the buffer is
    /// drained so an exhausted stream is detected before the next parse.
    pub fn probe_eof(&mut self) -> Result<bool> {
        if self.pos == self.len && !self.saw_eof {
            self.fill()?;
        }
        Ok(self.eof())
    }

    fn fill(&mut self) -> Result<usize> {
        debug_assert_eq!(self.pos, self.len);
        self.pos = 0;
        self.len = 0;
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => {
                    self.saw_eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.len = n;
                    return Ok(n);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads exactly `out.len()` bytes. A short read is a fatal
    /// `UnexpectedEof`.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let n = self.read_some(out)?;
        if n < out.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("needed {} bytes, stream ended after {n}", out.len()),
            )
            .into());
        }
        Ok(())
    }

    /// Reads up to `out.len()` bytes, returning the count actually read.
    /// Used for the trailing-garbage probe after the final block.
    pub fn read_some(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < out.len() {
            if self.pos == self.len && !self.saw_eof {
                self.fill()?;
            }
            if self.pos == self.len {
                break;
            }
            let take = (self.len - self.pos).min(out.len() - copied);
            out[copied..copied + take].copy_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
            copied += take;
        }
        Ok(copied)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(wire::read_u16(&b))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(wire::read_u32(&b))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(wire::read_u64(&b))
    }

    /// Reads a `width`-byte little-endian unsigned value, zero-extended.
    pub fn read_var(&mut self, width: u8) -> Result<u64> {
        debug_assert!(width as usize <= 8);
        let mut b = [0u8; 8];
        self.read_exact(&mut b[..width as usize])?;
        Ok(wire::read_var(&b[..width as usize]))
    }

    /// Reads bytes up to (and consuming) the next NUL terminator. The
    /// terminator is not included in `out`.
    pub fn read_nul_terminated(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(());
            }
            out.push(byte);
        }
    }

    /// Skips `n` bytes, erroring on a short stream.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            if self.pos == self.len {
                if self.saw_eof || self.fill()? == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("stream ended with {remaining} bytes left to skip"),
                    )
                    .into());
                }
            }
            let take = ((self.len - self.pos) as u64).min(remaining);
            self.pos += take as usize;
            remaining -= take;
        }
        Ok(())
    }
}

/// Line reader for the writer's TSV input.
///
/// A newline preceded by an odd number of backslashes is escaped and belongs
/// to the current row; bare empty lines are skipped. The trailing newline is
/// stripped from the returned row.
pub struct LineReader<R: std::io::BufRead> {
    inner: R,
    longest: usize,
}

impl<R: std::io::BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_high_water(inner, DEFAULT_BUFFER_CAPACITY)
    }

    /// Continues tracking the longest-row high-water mark from a previous
    /// pass over the same data.
    pub fn with_high_water(inner: R, high_water: usize) -> Self {
        Self {
            inner,
            longest: high_water.max(1),
        }
    }

    /// Capacity-style high-water mark of the longest row seen, starting at
    /// 16 KiB and doubling. Recorded in each block header as the maximum
    /// row size.
    #[must_use]
    pub fn longest_line(&self) -> usize {
        self.longest
    }

    /// Reads the next logical row into `row`, returning false at EOF.
    pub fn next_row(&mut self, row: &mut Vec<u8>) -> Result<bool> {
        row.clear();
        loop {
            let n = self.inner.read_until(b'\n', row)?;
            if n == 0 {
                if row.is_empty() {
                    return Ok(false);
                }
                // Unterminated final row: accept it as-is.
                break;
            }
            if row.last() == Some(&b'\n') {
                if row.len() == 1 {
                    // Blank line: skip it entirely.
                    row.clear();
                    continue;
                }
                if trailing_backslashes(&row[..row.len() - 1]) % 2 == 1 {
                    // Escaped newline: keep reading this row.
                    continue;
                }
                row.pop();
                break;
            }
        }
        while self.longest < row.len() + 1 {
            self.longest *= 2;
        }
        Ok(true)
    }
}

fn trailing_backslashes(bytes: &[u8]) -> usize {
    bytes.iter().rev().take_while(|&&b| b == b'\\').count()
}

/// Splits a row into field ranges on unescaped tabs.
///
/// A tab preceded by an odd number of backslashes is part of the field.
/// With `trim`, trailing ASCII spaces are removed from every field.
pub fn split_fields(row: &[u8], trim: bool) -> Vec<std::ops::Range<usize>> {
    let mut fields = Vec::new();
    let mut start = 0usize;
    for (i, &b) in row.iter().enumerate() {
        if b == b'\t' && trailing_backslashes(&row[start..i]) % 2 == 0 {
            fields.push(start..i);
            start = i + 1;
        }
    }
    fields.push(start..row.len());
    if trim {
        for field in &mut fields {
            let mut end = field.end;
            while end > field.start && row[end - 1] == b' ' {
                end -= 1;
            }
            field.end = end;
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_exact_and_eof() {
        let mut input = BufferedInput::with_capacity(Cursor::new(vec![1u8, 2, 3]), 2);
        let mut buf = [0u8; 3];
        input.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert!(!input.eof());
        assert!(input.probe_eof().unwrap());
        assert!(input.eof());
    }

    #[test]
    fn short_read_is_fatal() {
        let mut input = BufferedInput::new(Cursor::new(vec![1u8, 2]));
        let mut buf = [0u8; 4];
        assert!(input.read_exact(&mut buf).is_err());
    }

    #[test]
    fn nul_terminated_reads() {
        let mut input = BufferedInput::new(Cursor::new(b"abc\0\0xy".to_vec()));
        let mut name = Vec::new();
        input.read_nul_terminated(&mut name).unwrap();
        assert_eq!(name, b"abc");
        input.read_nul_terminated(&mut name).unwrap();
        assert!(name.is_empty());
    }

    #[test]
    fn skip_advances_past_buffered_and_unbuffered_bytes() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut input = BufferedInput::with_capacity(Cursor::new(data), 8);
        input.skip(90).unwrap();
        assert_eq!(input.read_u8().unwrap(), 90);
        assert!(input.skip(20).is_err());
    }

    #[test]
    fn line_reader_skips_blank_lines_and_strips_newline() {
        let mut lines = LineReader::new(Cursor::new(b"a\tb\n\nc\td\n".to_vec()));
        let mut row = Vec::new();
        assert!(lines.next_row(&mut row).unwrap());
        assert_eq!(row, b"a\tb");
        assert!(lines.next_row(&mut row).unwrap());
        assert_eq!(row, b"c\td");
        assert!(!lines.next_row(&mut row).unwrap());
    }

    #[test]
    fn line_reader_keeps_escaped_newlines() {
        let mut lines = LineReader::new(Cursor::new(b"a\\\nb\tc\nd\n".to_vec()));
        let mut row = Vec::new();
        assert!(lines.next_row(&mut row).unwrap());
        assert_eq!(row, b"a\\\nb\tc");
        assert!(lines.next_row(&mut row).unwrap());
        assert_eq!(row, b"d");
    }

    #[test]
    fn split_respects_escaped_tabs() {
        let row = b"a\\\tb\tc";
        let fields = split_fields(row, false);
        assert_eq!(fields.len(), 2);
        assert_eq!(&row[fields[0].clone()], b"a\\\tb");
        assert_eq!(&row[fields[1].clone()], b"c");
    }

    #[test]
    fn double_backslash_before_tab_separates() {
        let row = b"a\\\\\tb";
        let fields = split_fields(row, false);
        assert_eq!(fields.len(), 2);
        assert_eq!(&row[fields[0].clone()], b"a\\\\");
    }

    #[test]
    fn trim_removes_trailing_spaces_per_field() {
        let row = b"a  \tb\t  ";
        let fields = split_fields(row, true);
        assert_eq!(&row[fields[0].clone()], b"a");
        assert_eq!(&row[fields[1].clone()], b"b");
        assert_eq!(&row[fields[2].clone()], b"");
    }
}
