use crate::error::EvaluateError;
use crate::model::Model;
use crate::preprocess::Subset;
use log::info;
use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use std::collections::BTreeMap;

/// Scores of a fitted model on held out rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub metrics: BTreeMap<String, f64>,
    /// (predicted, actual) for each evaluation row, in evaluation order
    pub pairs: Vec<(f64, f64)>,
}

impl EvaluationReport {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// One line per metric, e.g. `rmse = 0.1234`
    pub fn summary(&self) -> String {
        self.metrics
            .iter()
            .map(|(name, value)| format!("{} = {:.4}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Score `model` on the evaluation subset
pub fn evaluate<M: Model>(model: &M, eval: &Subset) -> Result<EvaluationReport, EvaluateError> {
    if eval.is_empty() {
        return Err(EvaluateError::EmptyEvalSet);
    }
    if eval.num_features() != model.num_features() {
        return Err(EvaluateError::ShapeMismatch {
            expected: model.num_features(),
            found: eval.num_features(),
        });
    }
    if eval.target.len() != eval.num_rows() {
        return Err(EvaluateError::LengthMismatch {
            rows: eval.num_rows(),
            targets: eval.target.len(),
        });
    }

    let predictions = model.predict(&eval.data.view());
    let metrics = regression_metrics(&predictions.view(), &eval.target.view());

    info!(
        "evaluated {} rows: {}",
        eval.num_rows(),
        metrics
            .iter()
            .map(|(k, v)| format!("{}={:.4}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let pairs = predictions
        .iter()
        .zip(eval.target.iter())
        .map(|(&p, &a)| (p, a))
        .collect();

    Ok(EvaluationReport { metrics, pairs })
}

/// Mean squared error, its root, mean absolute error and the coefficient
/// of determination. R² is left out when the actual values are constant
pub fn regression_metrics(
    predicted: &ArrayView1<f64>,
    actual: &ArrayView1<f64>,
) -> BTreeMap<String, f64> {
    let n = actual.len() as f64;
    let residuals: Array1<f64> = actual - predicted;

    let sse = residuals.dot(&residuals);
    let mse = sse / n;
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / n;

    let mut metrics = BTreeMap::new();
    metrics.insert("mse".to_string(), mse);
    metrics.insert("rmse".to_string(), mse.sqrt());
    metrics.insert("mae".to_string(), mae);

    let mean = actual.sum() / n;
    let sst: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if sst > 0f64 {
        metrics.insert("r2".to_string(), 1f64 - sse / sst);
    }

    metrics
}
