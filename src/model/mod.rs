use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::preprocess::Subset;

pub mod export;
pub mod linear;

pub use export::write_model;
pub use linear::LinearRegression;

pub trait Model {
    /// Fit the model to the training subset.
    /// Returns the training loss per epoch
    fn fit(&mut self, train: &Subset) -> Result<Vec<(usize, f64)>, TrainError>;
    fn predict(&self, inputs: &ArrayView2<f64>) -> Array1<f64>;
    /// Number of feature columns the model expects
    fn num_features(&self) -> usize;
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Solver {
    /// Closed-form least squares
    #[default]
    NormalEquation,
    /// Mini-batch gradient descent on the squared error
    GradientDescent,
}

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub solver: Solver,
    /// L2 penalty on the weights (not the bias)
    pub l2: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Number of epochs to run. If absent, stop once the loss changes by less than `epsilon`
    pub num_epochs: Option<usize>,
    pub epsilon: f64,
    /// Upper bound on epochs when stopping early
    pub max_epochs: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            solver: Solver::NormalEquation,
            l2: 0.0,
            learning_rate: 0.05,
            batch_size: 32,
            num_epochs: None,
            epsilon: 1e-9,
            max_epochs: 5000,
        }
    }
}

/// Fit a fresh linear model on the training subset
pub fn train(
    train: &Subset,
    config: &TrainConfig,
) -> Result<(LinearRegression, Vec<(usize, f64)>), TrainError> {
    let mut model = LinearRegression::new(train.num_features(), config.clone());
    let losses = model.fit(train)?;

    Ok((model, losses))
}
