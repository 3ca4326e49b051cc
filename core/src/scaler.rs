//! Pre-fitted standard scaler.

use crate::{
    encoding::NumericMatrix,
    error::{ScoringError, ScoringResult},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Fit-time column order.
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn validate(&self) -> Result<(), String> {
        let n = self.columns.len();
        if self.mean.len() != n || self.scale.len() != n {
            return Err(format!(
                "{} columns but {} means and {} scales",
                n,
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err("non-finite mean or scale".into());
        }
        Ok(())
    }

    /// Standardize every row. The matrix must carry the scaler's columns in
    /// fit-time order; a zero scale is treated as 1.
    pub fn transform(&self, matrix: &NumericMatrix) -> ScoringResult<Vec<Vec<f64>>> {
        if matrix.columns != self.columns {
            return Err(ScoringError::ScalerMismatch);
        }
        Ok(matrix
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(x, (m, s))| {
                        let s = if *s == 0.0 { 1.0 } else { *s };
                        (x - m) / s
                    })
                    .collect()
            })
            .collect())
    }
}
