//! End-to-end runs of the pipeline on generated datasets.

use rust_pipeline::error::EvaluateError;
use rust_pipeline::parsing::tabular::load_dataset;
use rust_pipeline::parsing::Value;
use rust_pipeline::pipeline::{handle, run, PipelineRequest, Status};
use rust_pipeline::preprocess::{preprocess, MissingPolicy, PreprocessConfig};
use rust_pipeline::{PipelineError, Stage};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// `rows` records of y = 3 a - 2 b + 5 plus a small deterministic wobble
fn linear_csv(dir: &Path, rows: usize) -> PathBuf {
    let mut csv = String::from("a,b,y\n");
    for i in 0..rows {
        let a = (i % 10) as f64 * 0.5;
        let b = (i / 10) as f64 - 4.0;
        let y = 3.0 * a - 2.0 * b + 5.0 + 0.01 * (i as f64).sin();
        writeln!(csv, "{},{},{}", a, b, y).unwrap();
    }

    let path = dir.join("linear.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

#[test]
fn hundred_rows_eighty_twenty() {
    let dir = tempfile::tempdir().unwrap();
    let source = linear_csv(dir.path(), 100);
    let output = dir.path().join("plot.png");

    let run = run(&PipelineRequest::new(source, 0.8, 42, &output)).unwrap();

    assert_eq!(run.train_rows, 80);
    assert_eq!(run.eval_rows, 20);
    assert_eq!(run.dropped_rows, 0);
    assert_eq!(run.report.pairs.len(), 20);
    assert!(run.report.metric("rmse").unwrap() < 0.05);
    assert!(run.report.metric("r2").unwrap() > 0.99);
    assert_eq!(run.artifact.path, output);
    assert!(output.exists());

    let (weights, bias) = run.model.coefficients();
    assert!((weights[0] - 3.0).abs() < 0.05);
    assert!((weights[1] + 2.0).abs() < 0.05);
    assert!((bias - 5.0).abs() < 0.05);
}

#[test]
fn all_targets_missing_fails_in_preprocess() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("blank.csv");
    std::fs::write(&source, "a,b,y\n1,2,\n3,4,NA\n5,6,\n").unwrap();
    let output = dir.path().join("plot.png");

    let response = handle(&PipelineRequest::new(source, 0.8, 42, &output));

    assert_eq!(response.status, Status::Failure);
    assert_eq!(response.failed_stage, Some(Stage::Preprocess));
    assert!(response.metrics.is_none());
    assert!(response.artifact_path.is_none());
    assert!(!output.exists());
}

#[test]
fn full_training_ratio_fails_in_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tiny.csv");
    std::fs::write(&source, "x,y\n1,2\n2,4\n3,6\n").unwrap();
    let output = dir.path().join("plot.png");

    let err = run(&PipelineRequest::new(source, 1.0, 42, &output)).unwrap_err();

    assert_eq!(err.stage(), Stage::Evaluate);
    assert!(matches!(err, PipelineError::Evaluate(EvaluateError::EmptyEvalSet)));
    assert!(!output.exists());
}

#[test]
fn reruns_write_identical_plots() {
    let dir = tempfile::tempdir().unwrap();
    let source = linear_csv(dir.path(), 60);
    let output = dir.path().join("plot.png");
    let request = PipelineRequest::new(source, 0.7, 11, &output);

    let first_run = run(&request).unwrap();
    let first = std::fs::read(&output).unwrap();
    let second_run = run(&request).unwrap();
    let second = std::fs::read(&output).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_run.report, second_run.report);
}

#[test]
fn same_seed_same_split_different_seed_different_split() {
    let dir = tempfile::tempdir().unwrap();
    let source = linear_csv(dir.path(), 50);
    let output = dir.path().join("plot.png");

    let a = run(&PipelineRequest::new(&source, 0.6, 5, &output)).unwrap();
    let b = run(&PipelineRequest::new(&source, 0.6, 5, &output)).unwrap();
    let c = run(&PipelineRequest::new(&source, 0.6, 6, &output)).unwrap();

    assert_eq!(a.report.pairs, b.report.pairs);
    assert_ne!(a.report.pairs, c.report.pairs);
}

#[test]
fn concurrent_runs_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let source = linear_csv(dir.path(), 100);
    let shared = dir.path().join("shared.png");

    let reference = {
        let run = run(&PipelineRequest::new(&source, 0.8, 42, &shared)).unwrap();
        (run.report, std::fs::read(&shared).unwrap())
    };

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let source = source.clone();
                let own = dir.path().join(format!("plot_{}.png", i));
                let shared = shared.clone();
                scope.spawn(move || {
                    let own_run = run(&PipelineRequest::new(&source, 0.8, 42, &own)).unwrap();
                    let shared_run = run(&PipelineRequest::new(&source, 0.8, 42, &shared)).unwrap();
                    (own_run.report, shared_run.report, std::fs::read(own).unwrap())
                })
            })
            .collect();

        for handle in handles {
            let (own, shared_report, bytes) = handle.join().unwrap();
            assert_eq!(own, reference.0);
            assert_eq!(shared_report, reference.0);
            assert_eq!(bytes, reference.1);
        }
    });

    // The gate keeps the shared file whole
    assert_eq!(std::fs::read(&shared).unwrap(), reference.1);
}

#[test]
fn unwritable_plot_location_fails_in_render() {
    let dir = tempfile::tempdir().unwrap();
    let source = linear_csv(dir.path(), 40);
    let output = dir.path().join("no_such_dir").join("plot.png");

    let response = handle(&PipelineRequest::new(source, 0.8, 42, &output));

    assert_eq!(response.status, Status::Failure);
    assert_eq!(response.failed_stage, Some(Stage::Render));
    assert!(response.error_detail.unwrap().starts_with("cannot write plot"));
    assert!(response.artifact_path.is_none());
}

#[test]
fn mixed_labels_decode_to_the_text_in_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("codes.csv");
    std::fs::write(
        &source,
        "code,x,y\n007,1,2\nabc,2,4\n1.50,3,7\n1e2,4,8\n007,5,11\nabc,6,12\n",
    )
    .unwrap();

    let dataset = load_dataset(&source).unwrap();
    let config = PreprocessConfig {
        target: "y".into(),
        split_ratio: 0.5,
        seed: 42,
        policy: MissingPolicy::Drop,
    };
    let prepared = preprocess(&dataset, &config).unwrap();
    let encoder = prepared.encoding.encoder("code").unwrap();
    assert_eq!(encoder.labels(), &["007", "1.50", "1e2", "abc"]);

    // Nothing is dropped, so subset rows index the file's records directly
    for subset in [&prepared.split.train, &prepared.split.eval] {
        for (i, &row) in subset.rows.iter().enumerate() {
            let decoded = encoder.decode(subset.data[[i, 0]]).unwrap();
            assert_eq!(dataset.records()[row][0], Value::Category(decoded.to_string()));
        }
    }
}
