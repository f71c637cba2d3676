use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Preprocess,
    Train,
    Evaluate,
    Render,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Preprocess => "preprocess",
            Stage::Train => "train",
            Stage::Evaluate => "evaluate",
            Stage::Render => "render",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed record on line {line}: {source}")]
    Malformed { line: u64, source: csv::Error },
    #[error("{path} has no header row")]
    MissingHeader { path: PathBuf },
    #[error("header has an empty column name at position {position}")]
    EmptyColumnName { position: usize },
    #[error("column '{0}' appears more than once in the header")]
    DuplicateColumn(String),
    #[error("line {line} has {found} fields, expected {expected}")]
    Ragged {
        line: u64,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("target column '{0}' is not present in the dataset")]
    MissingTarget(String),
    #[error("dataset has no columns")]
    NoColumns,
    #[error("no rows remain after applying the '{policy}' missing-value policy")]
    NoRows { policy: String },
    #[error("split ratio {0} must lie in (0, 1]")]
    InvalidRatio(f64),
    #[error("split ratio {ratio} on {rows} rows leaves {train} training and {eval} evaluation rows")]
    EmptyPartition {
        ratio: f64,
        rows: usize,
        train: usize,
        eval: usize,
    },
    #[error("column '{0}' has no observed values to impute from")]
    NothingToImpute(String),
    #[error("column '{column}' has no code for category '{category}'")]
    UnknownCategory { column: String, category: String },
    #[error("record has {found} values, expected {expected}")]
    RecordWidth { expected: usize, found: usize },
    #[error("record has a missing value in column '{0}'")]
    MissingValue(String),
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("training set is empty")]
    Empty,
    #[error("training set has {rows} rows for {features} features")]
    Underdetermined { rows: usize, features: usize },
    #[error("training set contains non-finite values")]
    NonFinite,
    #[error("normal equations are singular; features are linearly dependent")]
    Singular,
    #[error("gradient descent diverged at epoch {0}")]
    Diverged(usize),
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("evaluation set is empty")]
    EmptyEvalSet,
    #[error("evaluation set has {found} feature columns, the model expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("evaluation set has {rows} rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("evaluation report has no (predicted, actual) pairs")]
    NoPairs,
    #[error("evaluation report contains non-finite values")]
    NonFinite,
    #[error("cannot encode plot: {0}")]
    Encode(#[from] image::ImageError),
    #[error("cannot write plot to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write model to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The first stage failure of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Load(_) => Stage::Load,
            PipelineError::Preprocess(_) => Stage::Preprocess,
            PipelineError::Train(_) => Stage::Train,
            PipelineError::Evaluate(_) => Stage::Evaluate,
            PipelineError::Render(_) => Stage::Render,
            PipelineError::Export(_) => Stage::Export,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_match_wire_format() {
        let err = PipelineError::from(TrainError::Empty);
        assert_eq!(err.stage(), Stage::Train);
        assert_eq!(err.stage().to_string(), "train");
        assert_eq!(serde_json::to_string(&Stage::Preprocess).unwrap(), "\"preprocess\"");
    }

    #[test]
    fn pipeline_error_keeps_stage_message() {
        let err = PipelineError::from(PreprocessError::MissingTarget("price".into()));
        assert_eq!(
            err.to_string(),
            "target column 'price' is not present in the dataset"
        );
    }
}
