use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{ForecastError, Result};

/// Standardizes features to zero mean and unit variance.
///
/// The parameters are learned once by `fit` and retained; transforming with
/// a vector width that disagrees with what was fit is a schema mismatch, not
/// a silent truncation.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Result<Self> {
        let rows = x.len();
        if rows == 0 {
            return Err(ForecastError::Internal(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        let width = x[0].len();

        let mut mean = vec![0.0; width];
        for row in x {
            if row.len() != width {
                return Err(ForecastError::SchemaMismatch(format!(
                    "ragged feature matrix: expected width {width}, found {}",
                    row.len()
                )));
            }
            for (sum, value) in mean.iter_mut().zip(row) {
                *sum += value;
            }
        }
        for sum in mean.iter_mut() {
            *sum /= rows as f64;
        }

        let mut scale = vec![0.0; width];
        for row in x {
            for (column, value) in row.iter().enumerate() {
                scale[column] += (value - mean[column]).powi(2);
            }
        }
        for variance in scale.iter_mut() {
            let std = (*variance / rows as f64).sqrt();
            // A constant column scales by 1 so it passes through unchanged.
            *variance = if std > 0.0 { std } else { 1.0 };
        }

        Ok(Self { mean, scale })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        x.iter()
            .map(|row| {
                if row.len() != self.width() {
                    return Err(ForecastError::SchemaMismatch(format!(
                        "feature vector has width {}, model was fit with width {}",
                        row.len(),
                        self.width()
                    )));
                }
                Ok(row
                    .iter()
                    .enumerate()
                    .map(|(column, value)| (value - self.mean[column]) / self.scale[column])
                    .collect())
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A single variance-reduction regression tree.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], indices: &[usize], config: &ForestConfig) -> Self {
        Self {
            root: grow(x, y, indices, 0, config),
        }
    }

    pub fn predict_one(&self, vector: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if vector[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn mean_of(y: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn grow(x: &[Vec<f64>], y: &[f64], indices: &[usize], depth: usize, config: &ForestConfig) -> Node {
    if depth >= config.max_depth || indices.len() < 2 * config.min_samples_leaf {
        return Node::Leaf(mean_of(y, indices));
    }

    let Some((feature, threshold)) = best_split(x, y, indices, config.min_samples_leaf) else {
        return Node::Leaf(mean_of(y, indices));
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(x, y, &left, depth + 1, config)),
        right: Box::new(grow(x, y, &right, depth + 1, config)),
    }
}

/// Best (feature, threshold) by sum-of-squares reduction, or `None` when no
/// split leaves `min_samples_leaf` rows on each side.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let width = x[indices[0]].len();
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let n = indices.len() as f64;
    let parent_sse = total_sq - total * total / n;

    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..width {
        let mut ordered: Vec<(f64, f64)> =
            indices.iter().map(|&i| (x[i][feature], y[i])).collect();
        ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for split_at in 1..ordered.len() {
            let (value, target) = ordered[split_at - 1];
            left_sum += target;
            left_sq += target * target;

            if ordered[split_at].0 <= value {
                continue;
            }
            if split_at < min_samples_leaf || ordered.len() - split_at < min_samples_leaf {
                continue;
            }

            let left_n = split_at as f64;
            let right_n = n - left_n;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if parent_sse - sse > 1e-12 && best.map_or(true, |(_, _, b)| sse < b) {
                let threshold = (value + ordered[split_at].0) / 2.0;
                best = Some((feature, threshold, sse));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Bootstrap-bagging behavior of the forest.
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 12,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

/// Bootstrap-bagged ensemble of regression trees; the prediction is the mean
/// of the per-tree outputs. Seeded, so a given training set always produces
/// the same forest.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForestConfig) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ForecastError::Internal(format!(
                "cannot fit forest on {} feature rows against {} targets",
                x.len(),
                y.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let sample: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
            trees.push(RegressionTree::fit(x, y, &sample, config));
        }

        Ok(Self { trees })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|vector| {
                let sum: f64 = self.trees.iter().map(|tree| tree.predict_one(vector)).sum();
                sum / self.trees.len() as f64
            })
            .collect()
    }
}

/// Shuffled 80/20-style index split. Whenever there are at least two rows,
/// both slices are non-empty, so the held-out score is never computed over
/// nothing.
pub fn train_test_split(rows: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut test_len = ((rows as f64) * test_fraction).round() as usize;
    if rows >= 2 {
        test_len = test_len.clamp(1, rows - 1);
    }
    let train = indices[test_len..].to_vec();
    let test = indices[..test_len].to_vec();
    (train, test)
}

/// Coefficient of determination. Constant actuals score 1.0 when predicted
/// perfectly and 0.0 otherwise, never NaN.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y jumps at x = 5; any variance-reducing tree finds this split.
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 5 { 1.0 } else { 9.0 }).collect();
        (x, y)
    }

    #[test]
    fn scaler_centers_and_scales() {
        let x = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let transformed = scaler.transform(&x).unwrap();
        assert!((transformed[0][0] + 1.0).abs() < 1e-9);
        assert!((transformed[1][0] - 1.0).abs() < 1e-9);
        // Constant column passes through centered.
        assert!((transformed[0][1]).abs() < 1e-9);
    }

    #[test]
    fn scaler_rejects_mismatched_width() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let result = scaler.transform(&[vec![1.0]]);
        assert!(matches!(result, Err(ForecastError::SchemaMismatch(_))));
    }

    #[test]
    fn forest_learns_a_step_function() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_estimators: 20,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, &config).unwrap();
        let predictions = forest.predict(&[vec![1.0], vec![8.0]]);
        assert!(predictions[0] < 4.0, "low side predicted {}", predictions[0]);
        assert!(predictions[1] > 6.0, "high side predicted {}", predictions[1]);
    }

    #[test]
    fn forest_is_deterministic_under_a_fixed_seed() {
        let (x, y) = step_data();
        let config = ForestConfig::default();
        let first = RandomForest::fit(&x, &y, &config).unwrap().predict(&x);
        let second = RandomForest::fit(&x, &y, &config).unwrap().predict(&x);
        assert_eq!(first, second);
    }

    #[test]
    fn split_keeps_both_slices_non_empty() {
        for rows in 2..20 {
            let (train, test) = train_test_split(rows, 0.2, 42);
            assert!(!train.is_empty());
            assert!(!test.is_empty());
            assert_eq!(train.len() + test.len(), rows);
        }
    }

    #[test]
    fn r_squared_matches_known_values() {
        assert!((r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-9);
        // Predicting the mean scores zero.
        assert!(r_squared(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).abs() < 1e-9);
        // Constant actuals never produce NaN.
        assert_eq!(r_squared(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r_squared(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
    }
}
