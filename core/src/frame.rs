//! Feature frames: fetched rows arranged as a named-column table.
//!
//! The frame is the unit every pipeline stage hands to the next:
//!   fetch → assemble → preprocess → align → encode → scale.

use crate::{
    error::{ScoringError, ScoringResult},
    types::Value,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One fetched source row, kept for reconciliation and event forwarding.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    /// Primary key value, `None` when the key column is absent or NULL.
    pub key: Option<Value>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Result of aligning a frame to a training schema.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub frame: FeatureFrame,
    pub added: Vec<String>,
    pub dropped: Vec<String>,
}

impl FeatureFrame {
    /// Build a frame from a header and row values. Duplicate column names and
    /// ragged rows are rejected.
    pub fn assemble(columns: Vec<String>, rows: Vec<Vec<Value>>) -> ScoringResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(ScoringError::DuplicateColumn { column: c.clone() });
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ScoringError::RowWidthMismatch {
                    row: i,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Snapshot every row as a `PendingRecord` keyed by `key_column`.
    pub fn records(&self, key_column: &str) -> Vec<PendingRecord> {
        let key_idx = self.column_index(key_column);
        self.rows
            .iter()
            .map(|row| {
                let key = key_idx
                    .map(|i| row[i].clone())
                    .filter(|v| !v.is_null());
                let fields = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect();
                PendingRecord { key, fields }
            })
            .collect()
    }

    // ── Preprocessing ──────────────────────────────────────────

    /// Remove the named columns where present.
    pub fn drop_columns(&mut self, names: &[String]) {
        let drop: HashSet<&str> = names.iter().map(String::as_str).collect();
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !drop.contains(self.columns[i].as_str()))
            .collect();
        if keep.len() == self.columns.len() {
            return;
        }
        self.columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = keep.iter().map(|&i| row[i].clone()).collect();
        }
    }

    /// Replace NULL cells of the named columns with `fill`.
    pub fn fill_nulls(&mut self, names: &[String], fill: &str) {
        for name in names {
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            for row in &mut self.rows {
                if row[idx].is_null() {
                    row[idx] = Value::Text(fill.to_string());
                }
            }
        }
    }

    /// Rewrite yes/no style flag columns as 1/0. Matching is on the
    /// lowercased cell label, untrimmed; anything else becomes 0.
    pub fn map_flags(&mut self, names: &[String]) {
        for name in names {
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            for row in &mut self.rows {
                row[idx] = Value::Int(i64::from(flag_value(&row[idx])));
            }
        }
    }

    /// Expand each named categorical column into `<col>_<value>` indicator
    /// columns, appended at the end in sorted value order. Missing cells are
    /// read as `fill`.
    pub fn one_hot(&mut self, names: &[String], fill: &str) {
        for name in names {
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            let labels: Vec<String> = self
                .rows
                .iter()
                .map(|r| match &r[idx] {
                    Value::Null => fill.to_string(),
                    v => v.label(),
                })
                .collect();
            let categories: BTreeSet<&str> = labels.iter().map(String::as_str).collect();

            let new_columns: Vec<String> =
                categories.iter().map(|c| format!("{name}_{c}")).collect();
            let positions: HashMap<&str, usize> = categories
                .iter()
                .enumerate()
                .map(|(i, c)| (*c, i))
                .collect();

            // Indicator columns replace any same-named input columns.
            self.drop_columns(&new_columns);
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            self.columns.remove(idx);
            self.columns.extend(new_columns.iter().cloned());
            for (row, label) in self.rows.iter_mut().zip(&labels) {
                row.remove(idx);
                let hot = positions[label.as_str()];
                row.extend((0..new_columns.len()).map(|i| Value::Int(i64::from(i == hot))));
            }
        }
    }

    // ── Alignment ──────────────────────────────────────────────

    /// Reshape to exactly `expected`, in order. Missing columns are filled
    /// with `0`, extra columns dropped.
    pub fn align(&self, expected: &[String]) -> Alignment {
        let index: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let wanted: HashSet<&str> = expected.iter().map(String::as_str).collect();

        let added = expected
            .iter()
            .filter(|c| !index.contains_key(c.as_str()))
            .cloned()
            .collect();
        let dropped = self
            .columns
            .iter()
            .filter(|c| !wanted.contains(c.as_str()))
            .cloned()
            .collect();

        let sources: Vec<Option<usize>> =
            expected.iter().map(|c| index.get(c.as_str()).copied()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.map_or(Value::Int(0), |i| row[i].clone()))
                    .collect()
            })
            .collect();

        Alignment {
            frame: FeatureFrame { columns: expected.to_vec(), rows },
            added,
            dropped,
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }
}

fn flag_value(v: &Value) -> u8 {
    match v.label().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        FeatureFrame::assemble(
            vec!["id".into(), "contract".into(), "churn".into()],
            vec![
                vec![Value::Int(1), Value::Text("Monthly".into()), Value::Text("Yes".into())],
                vec![Value::Int(2), Value::Null, Value::Text("no".into())],
                vec![Value::Int(3), Value::Text("Yearly".into()), Value::Bool(true)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn assemble_rejects_duplicate_header() {
        let err = FeatureFrame::assemble(vec!["a".into(), "a".into()], vec![]).unwrap_err();
        assert!(matches!(err, ScoringError::DuplicateColumn { column } if column == "a"));
    }

    #[test]
    fn assemble_rejects_ragged_rows() {
        let err = FeatureFrame::assemble(vec!["a".into()], vec![vec![]]).unwrap_err();
        assert!(matches!(err, ScoringError::RowWidthMismatch { row: 0, .. }));
    }

    #[test]
    fn one_hot_expands_with_fill_for_missing() {
        let mut f = frame();
        f.one_hot(&["contract".into()], "Unknown");
        assert_eq!(
            f.columns(),
            ["id", "churn", "contract_Monthly", "contract_Unknown", "contract_Yearly"]
        );
        assert_eq!(f.rows()[1][3], Value::Int(1));
        assert_eq!(f.rows()[1][2], Value::Int(0));
    }

    #[test]
    fn flags_map_to_zero_one() {
        let mut f = frame();
        f.map_flags(&["churn".into()]);
        let col: Vec<_> = f.column("churn").unwrap().cloned().collect();
        assert_eq!(col, vec![Value::Int(1), Value::Int(0), Value::Int(1)]);
    }

    #[test]
    fn flags_match_exact_labels_only() {
        let mut f = FeatureFrame::assemble(
            vec!["churn".into()],
            vec![
                vec![Value::Text(" yes ".into())],
                vec![Value::Float(1.0)],
                vec![Value::Int(1)],
                vec![Value::Text("TRUE".into())],
                vec![Value::Null],
            ],
        )
        .unwrap();
        f.map_flags(&["churn".into()]);
        let col: Vec<_> = f.column("churn").unwrap().cloned().collect();
        assert_eq!(
            col,
            vec![Value::Int(0), Value::Int(0), Value::Int(1), Value::Int(1), Value::Int(0)]
        );
    }

    #[test]
    fn fill_nulls_touches_only_missing_cells() {
        let mut f = frame();
        f.fill_nulls(&["contract".into(), "absent".into()], "No");
        let col: Vec<_> = f.column("contract").unwrap().cloned().collect();
        assert_eq!(
            col,
            vec![
                Value::Text("Monthly".into()),
                Value::Text("No".into()),
                Value::Text("Yearly".into()),
            ]
        );
    }

    #[test]
    fn records_skip_null_keys() {
        let f = FeatureFrame::assemble(
            vec!["k".into()],
            vec![vec![Value::Text("a".into())], vec![Value::Null]],
        )
        .unwrap();
        let recs = f.records("k");
        assert_eq!(recs[0].key, Some(Value::Text("a".into())));
        assert_eq!(recs[1].key, None);
        assert!(f.records("missing")[0].key.is_none());
    }
}
