//! Serialized estimators: linear models and tree ensembles.
//!
//! Trees are stored flat, root at index 0, with every child index strictly
//! greater than its parent's. That ordering is checked at load time and is
//! what guarantees evaluation terminates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classification,
    Regression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split { feature, threshold, left, right } => {
                    if *feature >= n_features {
                        return Err(format!("node {i} splits on feature {feature} of {n_features}"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {i} has NaN threshold"));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {i} has invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } if !value.is_finite() => {
                    return Err(format!("leaf {i} is not finite"));
                }
                TreeNode::Leaf { .. } => {}
            }
        }
        Ok(())
    }

    /// Walk from the root; go left when `x <= threshold`.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    i = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    LinearRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    /// Leaves hold the positive-class probability (classification) or the
    /// regression value; the forest averages them.
    RandomForest {
        task: Task,
        trees: Vec<DecisionTree>,
    },
    /// `init + learning_rate * Σ leaf`; classification applies a sigmoid.
    GradientBoosting {
        task: Task,
        init: f64,
        learning_rate: f64,
        trees: Vec<DecisionTree>,
    },
}

impl Estimator {
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::LogisticRegression { .. } => "logistic_regression",
            Estimator::LinearRegression { .. } => "linear_regression",
            Estimator::RandomForest { .. } => "random_forest",
            Estimator::GradientBoosting { .. } => "gradient_boosting",
        }
    }

    /// Check the estimator can score rows of width `n_features`.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        match self {
            Estimator::LogisticRegression { coefficients, intercept }
            | Estimator::LinearRegression { coefficients, intercept } => {
                if coefficients.len() != n_features {
                    return Err(format!(
                        "{} coefficients for {n_features} features",
                        coefficients.len()
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("non-finite coefficient".into());
                }
                Ok(())
            }
            Estimator::RandomForest { trees, .. } => {
                if trees.is_empty() {
                    return Err("forest has no trees".into());
                }
                trees.iter().try_for_each(|t| t.validate(n_features))
            }
            Estimator::GradientBoosting { init, learning_rate, trees, .. } => {
                if !init.is_finite() || !learning_rate.is_finite() {
                    return Err("non-finite init or learning rate".into());
                }
                trees.iter().try_for_each(|t| t.validate(n_features))
            }
        }
    }

    /// Positive-class probability; `None` for regressors.
    pub fn predict_proba(&self, x: &[f64]) -> Option<f64> {
        match self {
            Estimator::LogisticRegression { coefficients, intercept } => {
                Some(sigmoid(dot(coefficients, x) + intercept))
            }
            Estimator::LinearRegression { .. } => None,
            Estimator::RandomForest { task: Task::Classification, trees } => {
                Some(forest_mean(trees, x))
            }
            Estimator::GradientBoosting { task: Task::Classification, .. } => {
                Some(sigmoid(self.boosted_raw(x)))
            }
            _ => None,
        }
    }

    /// Class label (0/1) for classifiers, the regression value otherwise.
    pub fn predict(&self, x: &[f64]) -> f64 {
        if let Some(p) = self.predict_proba(x) {
            return if p > 0.5 { 1.0 } else { 0.0 };
        }
        match self {
            Estimator::LinearRegression { coefficients, intercept } => {
                dot(coefficients, x) + intercept
            }
            Estimator::RandomForest { trees, .. } => forest_mean(trees, x),
            Estimator::GradientBoosting { .. } => self.boosted_raw(x),
            // Classifiers returned above.
            Estimator::LogisticRegression { .. } => 0.0,
        }
    }

    fn boosted_raw(&self, x: &[f64]) -> f64 {
        match self {
            Estimator::GradientBoosting { init, learning_rate, trees, .. } => {
                init + learning_rate * trees.iter().map(|t| t.evaluate(x)).sum::<f64>()
            }
            _ => 0.0,
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn forest_mean(trees: &[DecisionTree], x: &[f64]) -> f64 {
    trees.iter().map(|t| t.evaluate(x)).sum::<f64>() / trees.len() as f64
}
