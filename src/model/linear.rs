use super::{Model, Solver, TrainConfig};
use crate::error::TrainError;
use crate::preprocess::Subset;
use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Standard deviations below this mark a feature as constant
const CONSTANT_TOLERANCE: f64 = 1e-12;
/// Relative size of the smallest usable pivot in the normal equations
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Least-squares linear regression with an intercept.
/// Inputs are standardized with the training means and deviations
/// before they meet the weights
#[derive(Debug, Clone)]
pub struct LinearRegression {
    pub weights: Array1<f64>, // In standardized units
    pub bias: f64,
    means: Array1<f64>,
    scales: Array1<f64>,
    pub config: TrainConfig,
}

impl LinearRegression {
    pub fn new(num_features: usize, config: TrainConfig) -> LinearRegression {
        LinearRegression {
            weights: Array1::zeros(num_features),
            bias: 0f64,
            means: Array1::zeros(num_features),
            scales: Array1::ones(num_features),
            config,
        }
    }

    /// Weights and bias expressed in the units of the raw features
    pub fn coefficients(&self) -> (Array1<f64>, f64) {
        let weights = &self.weights / &self.scales;
        let bias = self.bias - weights.dot(&self.means);

        (weights, bias)
    }

    fn standardize(&self, inputs: &ArrayView2<f64>) -> Array2<f64> {
        (inputs - &self.means) / &self.scales
    }

    fn validate(&self, train: &Subset) -> Result<(), TrainError> {
        let rows = train.num_rows();
        let features = train.num_features();

        if rows == 0 {
            return Err(TrainError::Empty);
        }
        if rows < features {
            return Err(TrainError::Underdetermined { rows, features });
        }
        if features != self.weights.len() {
            return Err(TrainError::InvalidConfig(format!(
                "model built for {} features, got {}",
                self.weights.len(),
                features
            )));
        }
        if train.target.len() != rows {
            return Err(TrainError::InvalidConfig(format!(
                "{} rows but {} targets",
                rows,
                train.target.len()
            )));
        }
        if !train.data.iter().chain(train.target.iter()).all(|x| x.is_finite()) {
            return Err(TrainError::NonFinite);
        }
        if !self.config.l2.is_finite() || self.config.l2 < 0f64 {
            return Err(TrainError::InvalidConfig(format!(
                "l2 penalty must be a non-negative number, got {}",
                self.config.l2
            )));
        }

        Ok(())
    }

    fn fit_scaling(&mut self, data: &Array2<f64>) {
        let features = data.ncols();
        self.means = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features));
        self.scales = data
            .std_axis(Axis(0), 0f64)
            .mapv(|s| if s > CONSTANT_TOLERANCE { s } else { 1f64 });
    }

    /// Solve the (optionally ridge penalized) normal equations in one shot.
    /// Constant columns are left out of the system and keep a zero weight
    fn solve_normal(&mut self, inputs: &Array2<f64>, target: &Array1<f64>) -> Result<(), TrainError> {
        let rows = inputs.nrows();
        let active: Vec<usize> = (0..inputs.ncols())
            .filter(|&j| inputs.column(j).iter().any(|x| x.abs() > CONSTANT_TOLERANCE))
            .collect();
        let p = active.len() + 1;

        // Design matrix with a trailing column of ones for the bias
        let mut design = Array2::<f64>::ones((rows, p));
        for (k, &j) in active.iter().enumerate() {
            design.column_mut(k).assign(&inputs.column(j));
        }

        let mut gram = design.t().dot(&design);
        for k in 0..active.len() {
            gram[[k, k]] += rows as f64 * self.config.l2;
        }
        let rhs = design.t().dot(target);

        let theta = solve_linear_system(gram, rhs).ok_or(TrainError::Singular)?;

        self.weights.fill(0f64);
        for (k, &j) in active.iter().enumerate() {
            self.weights[j] = theta[k];
        }
        self.bias = theta[p - 1];

        Ok(())
    }

    /// Run mini-batch gradient descent, returning the loss after every epoch
    fn solve_gradient(
        &mut self,
        inputs: &Array2<f64>,
        target: &Array1<f64>,
    ) -> Result<Vec<(usize, f64)>, TrainError> {
        let config = &self.config;
        if !(config.learning_rate.is_finite() && config.learning_rate > 0f64) {
            return Err(TrainError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                config.learning_rate
            )));
        }
        if config.batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch size must be positive".into()));
        }

        let num_epochs = config.num_epochs.unwrap_or(config.max_epochs);
        let early_stopping = config.num_epochs.is_none();
        let (learning_rate, l2, epsilon) = (config.learning_rate, config.l2, config.epsilon);
        let batch_size = config.batch_size;

        let mut losses = vec![];
        let mut prev_loss = f64::INFINITY;

        for num_epoch in 0..num_epochs {
            for (input_batch, target_batch) in inputs
                .axis_chunks_iter(Axis(0), batch_size)
                .zip(target.axis_chunks_iter(Axis(0), batch_size))
            {
                let batch_len = input_batch.nrows() as f64;
                // Gradient of the squared error WRT the predictions
                let grad = input_batch.dot(&self.weights) + self.bias - target_batch;

                let weight_grad = input_batch.t().dot(&grad) / batch_len + l2 * &self.weights;
                let bias_grad = grad.sum() / batch_len;

                // Perform GD step
                self.weights = &self.weights - learning_rate * weight_grad;
                self.bias -= learning_rate * bias_grad;
            }

            let loss = mean_squared_error(&(inputs.dot(&self.weights) + self.bias).view(), &target.view());
            if !loss.is_finite() {
                return Err(TrainError::Diverged(num_epoch));
            }
            losses.push((num_epoch, loss));

            if early_stopping && (prev_loss - loss).abs() < epsilon {
                debug!("early stopping after epoch {}", num_epoch);
                break;
            }
            prev_loss = loss;
        }

        Ok(losses)
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, train: &Subset) -> Result<Vec<(usize, f64)>, TrainError> {
        self.validate(train)?;
        self.fit_scaling(&train.data);

        let inputs = self.standardize(&train.data.view());
        self.weights = Array1::zeros(train.num_features());
        self.bias = 0f64;

        let losses = match self.config.solver {
            Solver::NormalEquation => {
                self.solve_normal(&inputs, &train.target)?;
                let predictions = inputs.dot(&self.weights) + self.bias;
                vec![(0, mean_squared_error(&predictions.view(), &train.target.view()))]
            }
            Solver::GradientDescent => self.solve_gradient(&inputs, &train.target)?,
        };

        if let Some((epochs, loss)) = losses.last() {
            info!(
                "fitted {:?} on {} rows, training mse {:.6} after {} epoch(s)",
                self.config.solver,
                train.num_rows(),
                loss,
                epochs + 1
            );
        }

        Ok(losses)
    }

    fn predict(&self, inputs: &ArrayView2<f64>) -> Array1<f64> {
        self.standardize(inputs).dot(&self.weights) + self.bias
    }

    fn num_features(&self) -> usize {
        self.weights.len()
    }
}

pub fn mean_squared_error(predictions: &ArrayView1<f64>, target: &ArrayView1<f64>) -> f64 {
    let diff = predictions - target;
    diff.dot(&diff) / predictions.len() as f64
}

/// Gaussian elimination with partial pivoting.
/// Returns None when the system is (numerically) singular
fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let scale = a
        .diag()
        .iter()
        .fold(0f64, |acc, x| acc.max(x.abs()))
        .max(1f64);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < PIVOT_TOLERANCE * scale {
            return None;
        }

        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0f64 {
                continue;
            }
            let pivot_row = a.slice(s![col, col..]).to_owned();
            a.slice_mut(s![row, col..]).scaled_add(-factor, &pivot_row);
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let sum: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - sum) / a[[row, row]];
    }

    Some(x)
}
