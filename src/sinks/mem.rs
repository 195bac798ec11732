use crate::error::Result;
use crate::sinks::{accept_output_order, RowSink};

/// In-memory row sink: fields are written NUL-terminated into one growable
/// buffer and exposed as per-column slices after `end_row`.
///
/// Used by the in-process row API and by the writer's validation mode.
#[derive(Debug, Default)]
pub struct MemoryRowSink {
    buf: Vec<u8>,
    bounds: Vec<(usize, usize)>,
    targets: Option<Vec<usize>>,
    cur: usize,
    complete: bool,
}

impl MemoryRowSink {
    #[must_use]
    pub fn new(num_columns: usize) -> Self {
        Self {
            buf: Vec::new(),
            bounds: vec![(0, 0); num_columns],
            targets: None,
            cur: 0,
            complete: false,
        }
    }

    /// Installs a reordering permutation (see [`OrderedTsvSink`] for the
    /// acceptance rule).
    ///
    /// [`OrderedTsvSink`]: crate::sinks::OrderedTsvSink
    pub fn with_output_order(mut self, order: &[Option<usize>]) -> Option<Self> {
        let targets = accept_output_order(order)?;
        self.bounds = vec![(0, 0); targets.len()];
        self.targets = Some(targets);
        Some(self)
    }

    fn slot(&mut self) -> usize {
        let slot = match &self.targets {
            Some(targets) => targets[self.cur],
            None => self.cur,
        };
        self.cur += 1;
        slot
    }

    /// Whether a full row is available.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.bounds.len()
    }

    /// The completed row's field at `index`.
    #[must_use]
    pub fn field(&self, index: usize) -> &[u8] {
        let (start, end) = self.bounds[index];
        &self.buf[start..end]
    }

    /// All fields of the completed row in output order.
    #[must_use]
    pub fn fields(&self) -> Vec<&[u8]> {
        (0..self.bounds.len()).map(|i| self.field(i)).collect()
    }

    /// Length in bytes of the completed row's payload (fields plus one
    /// terminator each).
    #[must_use]
    pub fn row_length(&self) -> usize {
        self.buf.len()
    }
}

impl RowSink for MemoryRowSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let slot = self.slot();
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        self.bounds[slot] = (start, self.buf.len());
        self.buf.push(0);
        Ok(())
    }

    fn write_empty(&mut self) -> Result<()> {
        let slot = self.slot();
        let start = self.buf.len();
        self.bounds[slot] = (start, start);
        self.buf.push(0);
        Ok(())
    }

    fn write_separator(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        self.cur = 0;
        self.complete = true;
        Ok(())
    }
}

impl MemoryRowSink {
    /// Prepares the sink for the next row.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.cur = 0;
        self.complete = false;
        for bound in &mut self.bounds {
            *bound = (0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_fields_in_declaration_order() {
        let mut sink = MemoryRowSink::new(3);
        sink.write(b"a").unwrap();
        sink.write_empty().unwrap();
        sink.write(b"xyz").unwrap();
        sink.end_row().unwrap();
        assert!(sink.is_complete());
        assert_eq!(sink.fields(), vec![&b"a"[..], &b""[..], &b"xyz"[..]]);
    }

    #[test]
    fn reorders_when_an_output_order_is_installed() {
        let mut sink = MemoryRowSink::new(2)
            .with_output_order(&[Some(1), None, Some(0)])
            .unwrap();
        sink.write(b"to-end").unwrap();
        sink.write(b"to-front").unwrap();
        sink.end_row().unwrap();
        assert_eq!(sink.fields(), vec![&b"to-front"[..], &b"to-end"[..]]);
    }

    #[test]
    fn reset_clears_the_previous_row() {
        let mut sink = MemoryRowSink::new(1);
        sink.write(b"one").unwrap();
        sink.end_row().unwrap();
        sink.reset();
        assert!(!sink.is_complete());
        sink.write(b"two").unwrap();
        sink.end_row().unwrap();
        assert_eq!(sink.field(0), b"two");
    }
}
