//! Row output sinks.
//!
//! The block decoder emits each output column of a row through a [`RowSink`]:
//! one `write`/`write_empty` call per column, `write_separator` between
//! columns, `end_row` to finish. Reordering sinks buffer the columns and
//! concatenate them in the caller's requested order on `end_row`.

mod mem;
mod tsv;

pub use mem::MemoryRowSink;
pub use tsv::{OrderedTsvSink, TsvSink};

use crate::error::Result;

/// Receives one decoded row, column by column, in file-declaration order.
pub trait RowSink {
    /// Emits the current column's value. Called exactly once per
    /// non-dropped column.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Emits an empty value for the current column.
    fn write_empty(&mut self) -> Result<()>;

    /// Emits the column separator. Reordering sinks ignore this.
    fn write_separator(&mut self) -> Result<()>;

    /// Completes the current row.
    fn end_row(&mut self) -> Result<()>;
}

/// Validates a reordering permutation: the non-dropped entries must form a
/// bijection onto `0..k`. Returns the dense target list on success.
pub(crate) fn accept_output_order(order: &[Option<usize>]) -> Option<Vec<usize>> {
    let targets: Vec<usize> = order.iter().copied().flatten().collect();
    let k = targets.len();
    let mut seen = vec![false; k];
    for &t in &targets {
        if t >= k || seen[t] {
            return None;
        }
        seen[t] = true;
    }
    Some(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_permutation_with_drops() {
        let order = [Some(2), None, Some(0), Some(1)];
        assert_eq!(accept_output_order(&order), Some(vec![2, 0, 1]));
    }

    #[test]
    fn rejects_gaps_and_repeats() {
        assert!(accept_output_order(&[Some(0), Some(2)]).is_none());
        assert!(accept_output_order(&[Some(1), Some(1)]).is_none());
        assert!(accept_output_order(&[Some(2), Some(2), Some(2)]).is_none());
    }

    #[test]
    fn empty_order_is_the_empty_bijection() {
        assert_eq!(accept_output_order(&[None, None]), Some(vec![]));
    }
}
