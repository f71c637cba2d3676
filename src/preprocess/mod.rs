use crate::error::PreprocessError;
use crate::parsing::{ColumnKind, Dataset, Value};
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod encoding;
pub mod split;

pub use encoding::{CategoryEncoder, EncodingState, FeatureEncoding};

/// What to do with records that have missing cells
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Remove incomplete records
    #[default]
    Drop,
    /// Fill missing features with the column mean (numeric) or mode (categorical)
    Impute,
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingPolicy::Drop => f.write_str("drop"),
            MissingPolicy::Impute => f.write_str("impute"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub target: String,
    pub split_ratio: f64,
    pub seed: u64,
    pub policy: MissingPolicy,
}

/// Feature matrix and target vector for a subset of the cleaned rows
#[derive(Debug, Clone)]
pub struct Subset {
    pub data: Array2<f64>,
    pub target: Array1<f64>,
    /// Index of each row in the cleaned table
    pub rows: Vec<usize>,
}

impl Subset {
    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub train: Subset,
    pub eval: Subset,
}

/// Output of preprocessing: the split data plus the fitted encoding
#[derive(Debug, Clone)]
pub struct Prepared {
    pub split: Split,
    pub encoding: EncodingState,
    /// Records removed by the missing-value policy
    pub dropped: usize,
}

/// Clean, encode and split a dataset
pub fn preprocess(dataset: &Dataset, config: &PreprocessConfig) -> Result<Prepared, PreprocessError> {
    if dataset.columns().is_empty() {
        return Err(PreprocessError::NoColumns);
    }
    let target_idx = dataset
        .column_index(&config.target)
        .ok_or_else(|| PreprocessError::MissingTarget(config.target.clone()))?;
    let feature_idx: Vec<usize> = (0..dataset.columns().len())
        .filter(|&idx| idx != target_idx)
        .collect();

    // The target is never imputed
    let kept: Vec<&Vec<Value>> = dataset
        .records()
        .iter()
        .filter(|record| !record[target_idx].is_missing())
        .filter(|record| match config.policy {
            MissingPolicy::Drop => feature_idx.iter().all(|&idx| !record[idx].is_missing()),
            MissingPolicy::Impute => true,
        })
        .collect();

    let dropped = dataset.num_records() - kept.len();
    if kept.is_empty() {
        return Err(PreprocessError::NoRows {
            policy: config.policy.to_string(),
        });
    }
    debug!("{} policy removed {} of {} records", config.policy, dropped, dataset.num_records());

    let features = feature_idx
        .iter()
        .map(|&idx| fit_feature(dataset, &kept, idx, config.policy))
        .collect::<Result<Vec<_>, _>>()?;

    let target_encoder = match dataset.kinds()[target_idx] {
        ColumnKind::Categorical => Some(fit_encoder(dataset, target_idx)),
        ColumnKind::Numeric => None,
    };
    let target_feature = FeatureEncoding {
        name: config.target.clone(),
        kind: dataset.kinds()[target_idx],
        fill: None,
        encoder: target_encoder.clone(),
    };

    let encoding = EncodingState {
        target: config.target.clone(),
        features,
        target_encoder,
    };

    let mut data = Array2::zeros((kept.len(), feature_idx.len()));
    let mut target = Array1::zeros(kept.len());

    for (row, record) in kept.iter().enumerate() {
        let values: Vec<Value> = feature_idx.iter().map(|&idx| record[idx].clone()).collect();
        let encoded = encoding.transform_record(&values)?;
        for (col, x) in encoded.into_iter().enumerate() {
            data[[row, col]] = x;
        }
        target[row] = target_feature.transform(&record[target_idx])?;
    }

    let (train_rows, eval_rows) = split::split_indices(kept.len(), config.split_ratio, config.seed)?;
    info!(
        "prepared {} rows x {} features, split {} train / {} eval",
        kept.len(),
        feature_idx.len(),
        train_rows.len(),
        eval_rows.len()
    );

    let split = Split {
        train: subset(&data, &target, train_rows),
        eval: subset(&data, &target, eval_rows),
    };

    Ok(Prepared {
        split,
        encoding,
        dropped,
    })
}

fn subset(data: &Array2<f64>, target: &Array1<f64>, rows: Vec<usize>) -> Subset {
    Subset {
        data: data.select(Axis(0), &rows),
        target: target.select(Axis(0), &rows),
        rows,
    }
}

/// Codes are fitted on every observed label of the column, including
/// labels from records the policy later drops
fn fit_encoder(dataset: &Dataset, idx: usize) -> CategoryEncoder {
    CategoryEncoder::fit(dataset.records().iter().filter_map(|r| match &r[idx] {
        Value::Category(label) => Some(label.as_str()),
        _ => None,
    }))
}

fn fit_feature(
    dataset: &Dataset,
    kept: &[&Vec<Value>],
    idx: usize,
    policy: MissingPolicy,
) -> Result<FeatureEncoding, PreprocessError> {
    let name = dataset.columns()[idx].clone();
    let kind = dataset.kinds()[idx];

    let encoder = match kind {
        ColumnKind::Categorical => Some(fit_encoder(dataset, idx)),
        ColumnKind::Numeric => None,
    };

    let fill = match policy {
        MissingPolicy::Drop => None,
        MissingPolicy::Impute => {
            let observed: Vec<&Value> = kept
                .iter()
                .map(|r| &r[idx])
                .filter(|v| !v.is_missing())
                .collect();
            let needs_fill = observed.len() < kept.len();

            match kind {
                _ if observed.is_empty() && needs_fill => {
                    return Err(PreprocessError::NothingToImpute(name))
                }
                _ if observed.is_empty() => None,
                ColumnKind::Numeric => Some(Value::Number(column_mean(&observed))),
                ColumnKind::Categorical => column_mode(&observed).map(Value::Category),
            }
        }
    };

    if let Some(fill) = &fill {
        debug!("column '{}' imputes missing cells with {}", name, fill);
    }

    Ok(FeatureEncoding {
        name,
        kind,
        fill,
        encoder,
    })
}

fn column_mean(values: &[&Value]) -> f64 {
    let numbers: Vec<f64> = values
        .iter()
        .filter_map(|v| match v {
            Value::Number(x) => Some(*x),
            _ => None,
        })
        .collect();

    numbers.iter().sum::<f64>() / numbers.len() as f64
}

/// Most frequent label, ties broken by the lexicographically smallest
fn column_mode(values: &[&Value]) -> Option<String> {
    let mut counts = BTreeMap::<&str, usize>::new();
    for value in values {
        if let Value::Category(label) = value {
            *counts.entry(label.as_str()).or_default() += 1;
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }

    best.map(|(label, _)| label.to_string())
}
