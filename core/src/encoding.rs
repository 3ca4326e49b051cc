//! Categorical encoding and numeric coercion.
//!
//! RULE: encoders are immutable once loaded. The `"unknown"` code is fixed
//! at construction, so no inference call ever touches shared vocabulary.

use crate::{frame::FeatureFrame, types::Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Placeholder category every unseen value resolves to.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// A fitted label encoder: code = position in the trained class list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CategoricalEncoder {
    classes: Vec<String>,
    codes: HashMap<String, usize>,
    unknown_code: usize,
}

impl CategoricalEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        let codes: HashMap<String, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        // Trained without an "unknown" class: reserve the next free code.
        let unknown_code = codes.get(UNKNOWN_CATEGORY).copied().unwrap_or(classes.len());
        Self { classes, codes, unknown_code }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn unknown_code(&self) -> usize {
        self.unknown_code
    }

    /// Whether the trained vocabulary already contained `"unknown"`.
    pub fn has_trained_unknown(&self) -> bool {
        self.unknown_code < self.classes.len()
    }

    pub fn encode(&self, label: &str) -> usize {
        self.codes.get(label).copied().unwrap_or(self.unknown_code)
    }
}

impl From<Vec<String>> for CategoricalEncoder {
    fn from(classes: Vec<String>) -> Self {
        Self::new(classes)
    }
}

impl From<CategoricalEncoder> for Vec<String> {
    fn from(e: CategoricalEncoder) -> Self {
        e.classes
    }
}

/// Column name → fitted encoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncoderRegistry {
    encoders: BTreeMap<String, CategoricalEncoder>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, encoder: CategoricalEncoder) {
        self.encoders.insert(column.into(), encoder);
    }

    pub fn get(&self, column: &str) -> Option<&CategoricalEncoder> {
        self.encoders.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CategoricalEncoder)> {
        self.encoders.iter()
    }

    /// Replace every governed column's cells with their integer codes.
    /// Columns without an encoder are left untouched.
    pub fn encode_frame(&self, frame: &mut FeatureFrame) {
        let governed: Vec<(usize, &CategoricalEncoder)> = self
            .encoders
            .iter()
            .filter_map(|(col, enc)| frame.column_index(col).map(|i| (i, enc)))
            .collect();
        if governed.is_empty() {
            return;
        }
        for row in frame.rows_mut() {
            for &(idx, enc) in &governed {
                let code = enc.encode(&row[idx].label());
                row[idx] = Value::Int(code as i64);
            }
        }
    }
}

/// A fully numeric feature matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Cells that were missing, non-numeric or infinite and were set to 0.
    pub filled_cells: usize,
}

/// Coerce every cell to `f64`. Infinities and unparseable values are treated
/// as missing; all missing cells are filled with 0.
pub fn coerce_numeric(frame: &FeatureFrame) -> NumericMatrix {
    let mut filled_cells = 0;
    let rows = frame
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| {
                    v.as_f64().unwrap_or_else(|| {
                        filled_cells += 1;
                        0.0
                    })
                })
                .collect()
        })
        .collect();
    NumericMatrix {
        columns: frame.columns().to_vec(),
        rows,
        filled_cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_value_resolves_to_unknown_code() {
        let enc = CategoricalEncoder::new(vec!["A".into(), "B".into()]);
        assert_eq!(enc.encode("B"), 1);
        assert_eq!(enc.encode("Z"), enc.encode(UNKNOWN_CATEGORY));
        assert_eq!(enc.unknown_code(), 2);
        assert!(!enc.has_trained_unknown());
    }

    #[test]
    fn trained_unknown_code_is_reused() {
        let enc = CategoricalEncoder::new(vec!["A".into(), "unknown".into(), "Z".into()]);
        assert_eq!(enc.encode("never-seen"), 1);
        assert!(enc.has_trained_unknown());
    }

    #[test]
    fn registry_deserializes_from_plain_vocabularies() {
        let reg: EncoderRegistry =
            serde_json::from_str(r#"{"card_type": ["credit", "debit"]}"#).unwrap();
        assert_eq!(reg.get("card_type").unwrap().encode("debit"), 1);
    }
}
