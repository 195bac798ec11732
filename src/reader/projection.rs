//! Column projection: selection by name, the four inclusion rules, and the
//! output-position plan handed to reordering sinks.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schema::Column;

/// How a list of requested column names is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InclusionRule {
    /// Every name must exist exactly once in the file; absent names and
    /// duplicate requests are errors.
    #[default]
    FailOnInvalid,
    /// Absent names and duplicate requests are ignored.
    SkipInvalid,
    /// The list is a deny list; output is the remaining columns in
    /// file-declaration order.
    Exclude,
    /// Absent names are emitted as empty text columns.
    FillMissing,
}

/// A caller-supplied projection: names plus their inclusion rule.
#[derive(Debug, Clone, Default)]
pub struct ColumnSelection {
    names: Vec<String>,
    rule: InclusionRule,
}

impl ColumnSelection {
    #[must_use]
    pub fn new<I, S>(names: I, rule: InclusionRule) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            rule,
        }
    }

    /// Parses a comma- (or space-) separated list of names.
    #[must_use]
    pub fn from_csv(csv: &str, rule: InclusionRule) -> Self {
        let names = csv
            .split([',', ' '])
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();
        Self { names, rule }
    }

    #[must_use]
    pub const fn rule(&self) -> InclusionRule {
        self.rule
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether `name` appears in the selection (case-insensitively).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Resolved projection: where each file column lands in the output row, and
/// which output slots are blank padding columns.
#[derive(Debug, Clone)]
pub(crate) struct ProjectionPlan {
    /// Per file column (including virtual columns): output slot, or `None`
    /// when dropped.
    pub out_index: Vec<Option<usize>>,
    /// Output slot -> requested name, for absent columns under
    /// [`InclusionRule::FillMissing`].
    pub blanks: BTreeMap<usize, String>,
    pub num_outputs: usize,
}

impl ProjectionPlan {
    /// Identity plan: every column at its declaration position.
    pub fn identity(num_columns: usize) -> Self {
        Self {
            out_index: (0..num_columns).map(Some).collect(),
            blanks: BTreeMap::new(),
            num_outputs: num_columns,
        }
    }

    /// Resolves a selection against the file's columns.
    ///
    /// Name matching is case-insensitive; an included column's output slot
    /// is the position of its first occurrence in the request list.
    ///
    /// # Errors
    ///
    /// [`Error::BadRequestedColumn`] for duplicates or absent names under
    /// [`InclusionRule::FailOnInvalid`]; [`Error::NoColumnsToOutput`] when
    /// nothing remains to emit.
    pub fn resolve(columns: &[Column], selection: &ColumnSelection) -> Result<Self> {
        // Deduplicate requested names, keeping first-occurrence positions.
        let mut requested: Vec<String> = Vec::new();
        for name in &selection.names {
            if requested.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                if selection.rule == InclusionRule::FailOnInvalid {
                    return Err(Error::BadRequestedColumn {
                        details: format!("column '{name}' requested more than once").into(),
                    });
                }
                continue;
            }
            requested.push(name.clone());
        }

        if selection.rule == InclusionRule::Exclude {
            return Self::resolve_exclusion(columns, &requested);
        }

        let mut out_index = vec![None; columns.len()];
        let mut matched = vec![false; requested.len()];
        for (c, column) in columns.iter().enumerate() {
            let hit = requested
                .iter()
                .enumerate()
                .find(|(r, name)| !matched[*r] && name.eq_ignore_ascii_case(&column.name));
            if let Some((r, _)) = hit {
                out_index[c] = Some(r);
                matched[r] = true;
            }
        }

        let mut blanks = BTreeMap::new();
        for (r, name) in requested.iter().enumerate() {
            if matched[r] {
                continue;
            }
            match selection.rule {
                InclusionRule::FailOnInvalid => {
                    return Err(Error::BadRequestedColumn {
                        details: format!("column '{name}' does not exist in the file").into(),
                    });
                }
                InclusionRule::FillMissing => {
                    blanks.insert(r, name.clone());
                }
                InclusionRule::SkipInvalid => {}
                InclusionRule::Exclude => unreachable!("handled above"),
            }
        }

        let mut plan = Self {
            out_index,
            blanks,
            num_outputs: requested.len(),
        };
        if selection.rule == InclusionRule::SkipInvalid {
            plan.compact();
        }
        if plan.num_outputs == 0 {
            return Err(Error::NoColumnsToOutput);
        }
        Ok(plan)
    }

    fn resolve_exclusion(columns: &[Column], denied: &[String]) -> Result<Self> {
        let mut out_index = vec![None; columns.len()];
        let mut next = 0usize;
        for (c, column) in columns.iter().enumerate() {
            if !denied.iter().any(|d| d.eq_ignore_ascii_case(&column.name)) {
                out_index[c] = Some(next);
                next += 1;
            }
        }
        if next == 0 {
            return Err(Error::NoColumnsToOutput);
        }
        Ok(Self {
            out_index,
            blanks: BTreeMap::new(),
            num_outputs: next,
        })
    }

    /// Closes the gaps left by ignored request entries, preserving relative
    /// order. Given surviving slots `[2, 1, 3, 5]` the remap yields
    /// `[1, 0, 2, 3]`.
    fn compact(&mut self) {
        let mut survivors: Vec<usize> = self.out_index.iter().copied().flatten().collect();
        survivors.sort_unstable();
        let remap = |slot: usize| survivors.binary_search(&slot).expect("slot is a survivor");
        for entry in &mut self.out_index {
            if let Some(slot) = entry.as_mut() {
                *slot = remap(*slot);
            }
        }
        self.num_outputs = survivors.len();
    }

    /// The write-call permutation for reordering sinks: one entry per file
    /// column (Nones for dropped columns), then the blank slots.
    #[must_use]
    pub fn output_order(&self) -> Vec<Option<usize>> {
        let mut order = self.out_index.clone();
        order.extend(self.blanks.keys().map(|&slot| Some(slot)));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn columns(names: &[&str]) -> Vec<Column> {
        names
            .iter()
            .map(|n| Column::new(*n, ColumnType::Varchar))
            .collect()
    }

    #[test]
    fn identity_plan_preserves_positions() {
        let plan = ProjectionPlan::identity(3);
        assert_eq!(plan.out_index, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(plan.num_outputs, 3);
    }

    #[test]
    fn fail_on_invalid_requires_every_name() {
        let cols = columns(&["a", "b"]);
        let ok = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["b", "a"], InclusionRule::FailOnInvalid),
        )
        .unwrap();
        assert_eq!(ok.out_index, vec![Some(1), Some(0)]);

        let missing = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["a", "zzz"], InclusionRule::FailOnInvalid),
        );
        assert!(matches!(missing, Err(Error::BadRequestedColumn { .. })));

        let duplicate = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["a", "A"], InclusionRule::FailOnInvalid),
        );
        assert!(matches!(duplicate, Err(Error::BadRequestedColumn { .. })));
    }

    #[test]
    fn skip_invalid_compacts_gaps() {
        let cols = columns(&["a", "b", "c"]);
        // "nope" would have taken slot 1; surviving slots compact to 0..2.
        let plan = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["c", "nope", "a"], InclusionRule::SkipInvalid),
        )
        .unwrap();
        assert_eq!(plan.num_outputs, 2);
        assert_eq!(plan.out_index, vec![Some(1), None, Some(0)]);
    }

    #[test]
    fn skip_invalid_with_no_hits_is_an_error() {
        let cols = columns(&["a"]);
        let plan = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["x", "y"], InclusionRule::SkipInvalid),
        );
        assert!(matches!(plan, Err(Error::NoColumnsToOutput)));
    }

    #[test]
    fn fill_missing_pads_absent_names() {
        let cols = columns(&["a", "b"]);
        let plan = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["a", "c", "b"], InclusionRule::FillMissing),
        )
        .unwrap();
        assert_eq!(plan.num_outputs, 3);
        assert_eq!(plan.out_index, vec![Some(0), Some(2)]);
        assert_eq!(plan.blanks.get(&1).map(String::as_str), Some("c"));
        assert_eq!(plan.output_order(), vec![Some(0), Some(2), Some(1)]);
    }

    #[test]
    fn exclusion_keeps_declaration_order() {
        let cols = columns(&["a", "b", "c"]);
        let plan = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["B"], InclusionRule::Exclude),
        )
        .unwrap();
        assert_eq!(plan.out_index, vec![Some(0), None, Some(1)]);

        let all_gone = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["a", "b", "c"], InclusionRule::Exclude),
        );
        assert!(matches!(all_gone, Err(Error::NoColumnsToOutput)));
    }

    #[test]
    fn csv_selection_splits_on_commas_and_spaces() {
        let selection = ColumnSelection::from_csv("a, b,c", InclusionRule::SkipInvalid);
        assert_eq!(selection.names(), ["a", "b", "c"]);
        assert!(selection.contains("B"));
    }

    #[test]
    fn duplicate_file_columns_match_the_request_once() {
        let cols = columns(&["a", "a"]);
        let plan = ProjectionPlan::resolve(
            &cols,
            &ColumnSelection::new(["a"], InclusionRule::FailOnInvalid),
        )
        .unwrap();
        assert_eq!(plan.out_index, vec![Some(0), None]);
    }
}
