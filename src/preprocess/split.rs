use crate::error::PreprocessError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Partition `0..num_rows` into training and evaluation indices.
///
/// The rows are shuffled with a generator seeded by `seed`, the first
/// `round(ratio * num_rows)` go to training and the rest to evaluation.
/// Below a ratio of 1 the training count is clamped to `1..num_rows - 1`,
/// so both halves are non-empty whenever there are at least two rows.
/// A ratio of exactly 1 puts every row in training. Both halves come back sorted
pub fn split_indices(
    num_rows: usize,
    ratio: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), PreprocessError> {
    if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
        return Err(PreprocessError::InvalidRatio(ratio));
    }

    let mut indices: Vec<usize> = (0..num_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let num_train = if ratio < 1.0 {
        if num_rows < 2 {
            return Err(PreprocessError::EmptyPartition {
                ratio,
                rows: num_rows,
                train: num_rows,
                eval: 0,
            });
        }
        ((num_rows as f64 * ratio).round() as usize).clamp(1, num_rows - 1)
    } else {
        num_rows
    };

    if num_train == 0 {
        return Err(PreprocessError::EmptyPartition {
            ratio,
            rows: num_rows,
            train: 0,
            eval: 0,
        });
    }

    let mut eval = indices.split_off(num_train);
    let mut train = indices;
    train.sort_unstable();
    eval.sort_unstable();

    Ok((train, eval))
}
