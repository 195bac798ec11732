use std::io::Write;

use crate::error::Result;
use crate::sinks::{accept_output_order, RowSink};

/// Pass-through TSV sink: columns arrive in output order and are streamed
/// straight to the writer, tab-separated and newline-terminated.
pub struct TsvSink<W: Write> {
    out: W,
}

impl<W: Write> TsvSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> RowSink for TsvSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    fn write_empty(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_separator(&mut self) -> Result<()> {
        self.out.write_all(b"\t")?;
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

/// Column-reordering TSV sink.
///
/// Each incoming column is buffered at its target output position; on
/// `end_row` the buffers are joined with tabs and written as one line.
pub struct OrderedTsvSink<W: Write> {
    out: W,
    targets: Vec<usize>,
    buffers: Vec<Vec<u8>>,
    cur: usize,
    line: Vec<u8>,
}

impl<W: Write> OrderedTsvSink<W> {
    /// Builds the sink from the caller's permutation, where `order[i]` is
    /// the output slot of the `i`-th written column and `None` marks a
    /// dropped column (never written).
    ///
    /// Returns `None` if the non-dropped entries are not a bijection onto
    /// `0..k`.
    pub fn new(out: W, order: &[Option<usize>]) -> Option<Self> {
        let targets = accept_output_order(order)?;
        let buffers = vec![Vec::new(); targets.len()];
        Some(Self {
            out,
            targets,
            buffers,
            cur: 0,
            line: Vec::new(),
        })
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> RowSink for OrderedTsvSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let slot = self.targets[self.cur];
        self.cur += 1;
        let buf = &mut self.buffers[slot];
        buf.clear();
        buf.extend_from_slice(bytes);
        Ok(())
    }

    fn write_empty(&mut self) -> Result<()> {
        let slot = self.targets[self.cur];
        self.cur += 1;
        self.buffers[slot].clear();
        Ok(())
    }

    fn write_separator(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        self.cur = 0;
        // One write per line is markedly faster than one per column.
        self.line.clear();
        for (i, buf) in self.buffers.iter().enumerate() {
            if i > 0 {
                self.line.push(b'\t');
            }
            self.line.extend_from_slice(buf);
        }
        self.line.push(b'\n');
        self.out.write_all(&self.line)?;
        for buf in &mut self.buffers {
            buf.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_sink_joins_columns_with_tabs() {
        let mut sink = TsvSink::new(Vec::new());
        sink.write(b"a").unwrap();
        sink.write_separator().unwrap();
        sink.write(b"b").unwrap();
        sink.end_row().unwrap();
        sink.write_empty().unwrap();
        sink.write_separator().unwrap();
        sink.write(b"c").unwrap();
        sink.end_row().unwrap();
        let out = sink.finish().unwrap();
        assert_eq!(out, b"a\tb\n\tc\n");
    }

    #[test]
    fn ordered_sink_reorders_columns() {
        let order = [Some(1), Some(0)];
        let mut sink = OrderedTsvSink::new(Vec::new(), &order).unwrap();
        sink.write(b"first").unwrap();
        sink.write(b"second").unwrap();
        sink.end_row().unwrap();
        let out = sink.finish().unwrap();
        assert_eq!(out, b"second\tfirst\n");
    }

    #[test]
    fn ordered_sink_rejects_bad_permutations() {
        assert!(OrderedTsvSink::new(Vec::new(), &[Some(0), Some(0)]).is_none());
        assert!(OrderedTsvSink::new(Vec::new(), &[Some(1)]).is_none());
    }

    #[test]
    fn ordered_sink_clears_buffers_between_rows() {
        let order = [Some(0), Some(1)];
        let mut sink = OrderedTsvSink::new(Vec::new(), &order).unwrap();
        sink.write(b"x").unwrap();
        sink.write(b"y").unwrap();
        sink.end_row().unwrap();
        sink.write_empty().unwrap();
        sink.write(b"z").unwrap();
        sink.end_row().unwrap();
        let out = sink.finish().unwrap();
        assert_eq!(out, b"x\ty\n\tz\n");
    }
}
