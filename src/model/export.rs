use super::LinearRegression;
use crate::error::ExportError;
use crate::preprocess::EncodingState;
use json::{object, JsonValue};
use std::path::Path;

/// Write the fitted model in JSON format.
/// Coefficients are given in raw feature units, keyed by feature name order;
/// categorical features list their labels in code order
pub fn write_model(
    path: &Path,
    model: &LinearRegression,
    encoding: &EncodingState,
    losses: &[(usize, f64)],
) -> Result<(), ExportError> {
    let (weights, bias) = model.coefficients();
    let weights: Vec<f64> = weights.iter().copied().collect();

    let mut data = object! {};
    data["target"] = encoding.target.as_str().into();
    data["bias"] = bias.into();
    data["features"] = encoding
        .feature_names()
        .into_iter()
        .map(JsonValue::from)
        .collect::<Vec<_>>()
        .into();
    data["weights"] = weights.into();

    let mut categories = object! {};
    for feature in &encoding.features {
        if let Some(encoder) = &feature.encoder {
            categories[feature.name.as_str()] = encoder.labels().to_vec().into();
        }
    }
    if let Some(encoder) = &encoding.target_encoder {
        categories[encoding.target.as_str()] = encoder.labels().to_vec().into();
    }
    data["categories"] = categories;

    data["losses"] = losses
        .iter()
        .map(|&(epoch, loss)| JsonValue::from(vec![epoch as f64, loss]))
        .collect::<Vec<_>>()
        .into();

    std::fs::write(path, data.pretty(2)).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}
