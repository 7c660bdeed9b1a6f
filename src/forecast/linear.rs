//! Least-squares linear regression.
//!
//! Columns are standardised first, then the normal equations
//! `(ZᵀZ + λI) w = Zᵀ(y - ȳ)` are solved and mapped back to the original
//! scale. The small ridge term `λ = ridge · n` keeps the system solvable
//! when indicator columns are collinear. Columns that never vary in the
//! training window get a zero coefficient.

use serde::{Deserialize, Serialize};

use super::artifact::Predictor;
use super::trainer::{Trainer, TrainingSet};
use crate::error::TrainError;

// ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    // ---
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    // ---
    pub fn predict(&self, features: &[f64]) -> f64 {
        // ---
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearRegressionTrainer {
    // ---
    /// Ridge strength relative to the number of rows.
    pub ridge: f64,
}

impl Default for LinearRegressionTrainer {
    fn default() -> Self {
        Self { ridge: 1e-6 }
    }
}

impl Trainer for LinearRegressionTrainer {
    // ---
    fn name(&self) -> &'static str {
        "linear_regression"
    }

    fn fit(&self, set: &TrainingSet) -> Result<Predictor, TrainError> {
        // ---
        let n = set.rows.len();
        let width = set.schema.len();
        if n == 0 {
            return Err(TrainError::Degenerate("no rows to fit".into()));
        }

        let y_mean = set.targets.iter().sum::<f64>() / n as f64;
        let mut means = vec![0.0; width];
        for row in &set.rows {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x / n as f64;
            }
        }
        let mut stds = vec![0.0; width];
        for row in &set.rows {
            for ((s, x), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (x - m).powi(2) / n as f64;
            }
        }
        stds.iter_mut().for_each(|s| *s = s.sqrt());

        let active: Vec<usize> = (0..width).filter(|&j| stds[j] > 1e-12).collect();
        let k = active.len();

        let mut gram = vec![vec![0.0; k]; k];
        let mut rhs = vec![0.0; k];
        let mut z = vec![0.0; k];
        for (row, target) in set.rows.iter().zip(&set.targets) {
            for (slot, &j) in z.iter_mut().zip(&active) {
                *slot = (row[j] - means[j]) / stds[j];
            }
            for a in 0..k {
                rhs[a] += z[a] * (target - y_mean);
                for b in a..k {
                    gram[a][b] += z[a] * z[b];
                }
            }
        }
        let lambda = self.ridge * n as f64;
        for a in 0..k {
            for b in 0..a {
                gram[a][b] = gram[b][a];
            }
            gram[a][a] += lambda;
        }

        let w = solve(gram, rhs)?;

        let mut coefficients = vec![0.0; width];
        for (wa, &j) in w.iter().zip(&active) {
            coefficients[j] = wa / stds[j];
        }
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&means)
                .map(|(c, m)| c * m)
                .sum::<f64>();

        Ok(Predictor::Linear(LinearModel {
            intercept,
            coefficients,
        }))
    }
}

/// Gaussian elimination with partial pivoting. Pivots below a tolerance
/// relative to the largest entry count as singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, TrainError> {
    // ---
    let n = b.len();
    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = scale.max(1.0) * 1e-12;

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < tolerance {
            return Err(TrainError::Degenerate(format!(
                "normal equations are singular at column {col}"
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
