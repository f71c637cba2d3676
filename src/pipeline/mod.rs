//! Runs load → preprocess → train → evaluate → render for one request.
//!
//! Every call works on its own data; the only thing shared between
//! concurrent calls is the plot file, whose write is serialized in
//! [`crate::plot`]. Give each caller its own `output_path` when the plots
//! should not overwrite each other.

use crate::error::{PipelineError, PreprocessError, Stage};
use crate::evaluate::{evaluate, EvaluationReport};
use crate::model::{self, write_model, LinearRegression, TrainConfig};
use crate::parsing::tabular::load_dataset;
use crate::plot::{render_scatter, PlotArtifact};
use crate::preprocess::{preprocess, EncodingState, MissingPolicy, PreprocessConfig};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Inputs of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source: PathBuf,
    /// Target column, the last column of the file when absent
    pub target: Option<String>,
    pub split_ratio: f64,
    pub seed: u64,
    pub output_path: PathBuf,
    pub policy: MissingPolicy,
    pub train: TrainConfig,
    /// Where to write the fitted model, if anywhere
    pub export_path: Option<PathBuf>,
}

impl PipelineRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        split_ratio: f64,
        seed: u64,
        output_path: impl Into<PathBuf>,
    ) -> PipelineRequest {
        PipelineRequest {
            source: source.into(),
            target: None,
            split_ratio,
            seed,
            output_path: output_path.into(),
            policy: MissingPolicy::default(),
            train: TrainConfig::default(),
            export_path: None,
        }
    }
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: EvaluationReport,
    pub artifact: PlotArtifact,
    pub model: LinearRegression,
    pub encoding: EncodingState,
    pub losses: Vec<(usize, f64)>,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub dropped_rows: usize,
}

/// Run every stage in order, stopping at the first failure
pub fn run(request: &PipelineRequest) -> Result<PipelineRun, PipelineError> {
    info!("pipeline run on {}", request.source.display());

    let dataset = load_dataset(&request.source)?;

    let target = match &request.target {
        Some(target) => target.clone(),
        None => dataset
            .columns()
            .last()
            .cloned()
            .ok_or(PreprocessError::NoColumns)?,
    };
    let config = PreprocessConfig {
        target,
        split_ratio: request.split_ratio,
        seed: request.seed,
        policy: request.policy,
    };
    let prepared = preprocess(&dataset, &config)?;
    let split = prepared.split;

    let (model, losses) = model::train(&split.train, &request.train)?;

    let report = evaluate(&model, &split.eval)?;
    let artifact = render_scatter(&report, &request.output_path)?;

    // Only a run that got all the way through leaves a model behind
    if let Some(path) = &request.export_path {
        write_model(path, &model, &prepared.encoding, &losses)?;
        info!("exported model to {}", path.display());
    }

    Ok(PipelineRun {
        report,
        artifact,
        model,
        encoding: prepared.encoding,
        losses,
        train_rows: split.train.num_rows(),
        eval_rows: split.eval.num_rows(),
        dropped_rows: prepared.dropped,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

/// Flat result handed to callers such as the chat front end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<&Result<PipelineRun, PipelineError>> for PipelineResponse {
    fn from(result: &Result<PipelineRun, PipelineError>) -> Self {
        match result {
            Ok(run) => PipelineResponse {
                status: Status::Success,
                metrics: Some(run.report.metrics.clone()),
                artifact_path: Some(run.artifact.path.clone()),
                failed_stage: None,
                error_detail: None,
            },
            Err(e) => PipelineResponse {
                status: Status::Failure,
                metrics: None,
                artifact_path: None,
                failed_stage: Some(e.stage()),
                error_detail: Some(e.to_string()),
            },
        }
    }
}

/// Entry point for callers that only need the flat response
pub fn handle(request: &PipelineRequest) -> PipelineResponse {
    let result = run(request);
    if let Err(e) = &result {
        warn!("{} stage failed: {}", e.stage(), e);
    }

    PipelineResponse::from(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_source_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let request = PipelineRequest::new(
            dir.path().join("nope.csv"),
            0.8,
            1,
            dir.path().join("plot.png"),
        );

        let response = handle(&request);
        assert_eq!(response.status, Status::Failure);
        assert_eq!(response.failed_stage, Some(Stage::Load));
        assert!(response.error_detail.unwrap().contains("nope.csv"));
    }

    #[test]
    fn explicit_target_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(&dir, "d.csv", "a,b\n1,2\n2,4\n3,6\n");
        let mut request = PipelineRequest::new(source, 0.5, 1, dir.path().join("plot.png"));
        request.target = Some("c".into());

        let err = run(&request).unwrap_err();
        assert_eq!(err.stage(), Stage::Preprocess);
    }

    #[test]
    fn underdetermined_training_fails_at_train() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(&dir, "d.csv", "a,b,c,y\n1,2,3,4\n2,3,1,5\n3,1,2,6\n4,4,4,7\n");
        let request = PipelineRequest::new(source, 0.5, 3, dir.path().join("plot.png"));

        let err = run(&request).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Train(crate::error::TrainError::Underdetermined { rows: 2, features: 3 })
        ));
        assert!(!dir.path().join("plot.png").exists());
    }

    #[test]
    fn export_writes_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(&dir, "d.csv", "x,y\n1,3\n2,5\n3,7\n4,9\n5,11\n6,13\n");
        let mut request = PipelineRequest::new(source, 0.5, 9, dir.path().join("plot.png"));
        request.export_path = Some(dir.path().join("model.json"));

        let run = run(&request).unwrap();
        assert_eq!(run.train_rows, 3);
        assert_eq!(run.eval_rows, 3);
        assert!(dir.path().join("model.json").exists());
        assert!(run.report.metric("rmse").unwrap() < 1e-9);
    }

    #[test]
    fn failed_run_exports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(&dir, "d.csv", "x,y\n1,3\n2,5\n3,7\n4,9\n");
        let export = dir.path().join("model.json");

        let mut request = PipelineRequest::new(&source, 1.0, 9, dir.path().join("plot.png"));
        request.export_path = Some(export.clone());
        let err = run(&request).unwrap_err();
        assert_eq!(err.stage(), Stage::Evaluate);
        assert!(!export.exists());

        let mut request =
            PipelineRequest::new(&source, 0.5, 9, dir.path().join("missing").join("plot.png"));
        request.export_path = Some(export.clone());
        let err = run(&request).unwrap_err();
        assert_eq!(err.stage(), Stage::Render);
        assert!(!export.exists());
    }

    #[test]
    fn success_response_serializes_without_failure_fields() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_csv(&dir, "d.csv", "x,y\n1,3\n2,5\n3,7\n4,9\n");
        let request = PipelineRequest::new(source, 0.5, 2, dir.path().join("plot.png"));

        let value = serde_json::to_value(handle(&request)).unwrap();
        assert_eq!(value["status"], "success");
        assert!(value["metrics"]["mse"].is_number());
        assert!(value.get("failed_stage").is_none());
        assert!(value.get("error_detail").is_none());
    }
}
