use crate::error::PreprocessError;
use crate::parsing::{ColumnKind, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Ordinal codes for the labels of one categorical column.
/// Labels are numbered in lexicographic order, so the same label always
/// gets the same code regardless of where it first appears
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryEncoder {
    labels: Vec<String>,
    codes: BTreeMap<String, usize>,
}

impl CategoryEncoder {
    pub fn fit<'a, I: IntoIterator<Item = &'a str>>(labels: I) -> CategoryEncoder {
        let labels: Vec<String> = labels
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let codes = labels
            .iter()
            .enumerate()
            .map(|(code, label)| (label.clone(), code))
            .collect();

        CategoryEncoder { labels, codes }
    }

    pub fn encode(&self, label: &str) -> Option<f64> {
        self.codes.get(label).map(|&code| code as f64)
    }

    /// Code of the label that reads as the number `x`, so `7.0` finds "007"
    /// when that is how the column spelled it. The smallest matching label wins
    pub fn encode_number(&self, x: f64) -> Option<f64> {
        self.labels
            .iter()
            .position(|label| label.parse::<f64>().map_or(false, |y| y == x))
            .map(|code| code as f64)
    }

    /// Map a code back to its label. Non-integral or out of range codes have no label
    pub fn decode(&self, code: f64) -> Option<&str> {
        if code.fract() != 0.0 || code < 0.0 {
            return None;
        }
        self.labels.get(code as usize).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// How one feature column is cleaned and turned into a number
#[derive(Debug, Clone)]
pub struct FeatureEncoding {
    pub name: String,
    pub kind: ColumnKind,
    /// Replacement for missing cells, only present under the impute policy
    pub fill: Option<Value>,
    pub encoder: Option<CategoryEncoder>,
}

impl FeatureEncoding {
    pub fn transform(&self, value: &Value) -> Result<f64, PreprocessError> {
        let value = match (value, &self.fill) {
            (Value::Missing, Some(fill)) => fill,
            (Value::Missing, None) => return Err(PreprocessError::MissingValue(self.name.clone())),
            (value, _) => value,
        };

        match (value, &self.encoder) {
            (Value::Number(x), None) => Ok(*x),
            (Value::Category(label), Some(encoder)) => {
                encoder
                    .encode(label)
                    .ok_or_else(|| PreprocessError::UnknownCategory {
                        column: self.name.clone(),
                        category: label.clone(),
                    })
            }
            (Value::Number(x), Some(encoder)) => {
                encoder
                    .encode_number(*x)
                    .ok_or_else(|| PreprocessError::UnknownCategory {
                        column: self.name.clone(),
                        category: x.to_string(),
                    })
            }
            (Value::Category(label), None) => Err(PreprocessError::UnknownCategory {
                column: self.name.clone(),
                category: label.clone(),
            }),
            (Value::Missing, _) => Err(PreprocessError::MissingValue(self.name.clone())),
        }
    }
}

/// Everything needed to turn a new record into a model input row the
/// same way the training data was
#[derive(Debug, Clone)]
pub struct EncodingState {
    pub target: String,
    pub features: Vec<FeatureEncoding>,
    pub target_encoder: Option<CategoryEncoder>,
}

impl EncodingState {
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn encoder(&self, column: &str) -> Option<&CategoryEncoder> {
        if column == self.target {
            return self.target_encoder.as_ref();
        }
        self.features
            .iter()
            .find(|f| f.name == column)
            .and_then(|f| f.encoder.as_ref())
    }

    /// Impute and encode the feature values of one record, given in feature order
    pub fn transform_record(&self, values: &[Value]) -> Result<Vec<f64>, PreprocessError> {
        if values.len() != self.features.len() {
            return Err(PreprocessError::RecordWidth {
                expected: self.features.len(),
                found: values.len(),
            });
        }

        self.features
            .iter()
            .zip(values)
            .map(|(feature, value)| feature.transform(value))
            .collect()
    }
}
