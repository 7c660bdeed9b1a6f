//! Bagged regression trees.
//!
//! Each tree is grown on a bootstrap sample of the rows and considers a
//! random subset of features at every split. The RNG is a seeded
//! `ChaCha8Rng`, so the same data and seed always give the same forest.

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::artifact::Predictor;
use super::trainer::{Trainer, TrainingSet};
use crate::error::TrainError;

// ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, features: &[f64]) -> f64 {
        // ---
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = features.get(*feature).copied().unwrap_or(0.0);
                    node = if x <= *threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    // ---
    pub trees: Vec<Node>,
}

impl ForestModel {
    /// Mean of the tree predictions; 0.0 for an empty forest.
    pub fn predict(&self, features: &[f64]) -> f64 {
        // ---
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomForestTrainer {
    // ---
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for RandomForestTrainer {
    fn default() -> Self {
        Self {
            n_trees: 60,
            max_depth: 10,
            min_samples_split: 4,
            seed: 42,
        }
    }
}

impl Trainer for RandomForestTrainer {
    // ---
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&self, set: &TrainingSet) -> Result<Predictor, TrainError> {
        // ---
        let n = set.rows.len();
        if n == 0 || self.n_trees == 0 {
            return Err(TrainError::Degenerate("nothing to grow a forest from".into()));
        }

        let width = set.schema.len();
        let max_features = width.div_ceil(3).max(1).min(width.max(1));
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let trees = (0..self.n_trees)
            .map(|_| {
                let bag: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let grower = Grower {
                    set,
                    max_features,
                    max_depth: self.max_depth,
                    min_samples_split: self.min_samples_split.max(2),
                };
                grower.grow(bag, 0, &mut rng)
            })
            .collect();

        Ok(Predictor::Forest(ForestModel { trees }))
    }
}

struct Grower<'a> {
    // ---
    set: &'a TrainingSet,
    max_features: usize,
    max_depth: usize,
    min_samples_split: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl Grower<'_> {
    // ---
    fn mean(&self, rows: &[usize]) -> f64 {
        rows.iter().map(|&i| self.set.targets[i]).sum::<f64>() / rows.len() as f64
    }

    fn grow(&self, rows: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> Node {
        // ---
        let value = self.mean(&rows);
        let width = self.set.schema.len();
        if depth >= self.max_depth || rows.len() < self.min_samples_split || width == 0 {
            return Node::Leaf { value };
        }

        let candidates = sample(rng, width, self.max_features.min(width));
        let best = candidates
            .iter()
            .filter_map(|feature| self.best_split(&rows, feature))
            .min_by(|a, b| a.sse.total_cmp(&b.sse));

        let Some(best) = best else {
            return Node::Leaf { value };
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.set.rows[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left, depth + 1, rng)),
            right: Box::new(self.grow(right, depth + 1, rng)),
        }
    }

    /// Lowest total squared error split on `feature`, thresholded halfway
    /// between adjacent distinct values. `None` if the feature is constant
    /// over `rows` or no split reduces the error.
    fn best_split(&self, rows: &[usize], feature: usize) -> Option<BestSplit> {
        // ---
        let mut pairs: Vec<(f64, f64)> = rows
            .iter()
            .map(|&i| (self.set.rows[i][feature], self.set.targets[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
        let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        let mut best: Option<BestSplit> = None;
        for k in 1..n {
            let (x, y) = pairs[k - 1];
            left_sum += y;
            left_sq += y * y;
            if pairs[k].0 <= x {
                continue;
            }

            let (nl, nr) = (k as f64, (n - k) as f64);
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / nl) + (right_sq - right_sum * right_sum / nr);

            if best.as_ref().map_or(true, |b| sse < b.sse) {
                best = Some(BestSplit {
                    feature,
                    threshold: (x + pairs[k].0) / 2.0,
                    sse,
                });
            }
        }

        best.filter(|b| b.sse < parent_sse - 1e-12)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn step_set() -> TrainingSet {
        // ---
        let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64, (i % 5) as f64]).collect();
        let targets = rows.iter().map(|r| if r[0] < 50.0 { 20.0 } else { 180.0 }).collect();
        TrainingSet {
            schema: vec!["pm25".into(), "noise".into()],
            rows,
            targets,
        }
    }

    #[test]
    fn learns_a_step_function() {
        // ---
        let trainer = RandomForestTrainer {
            n_trees: 20,
            ..Default::default()
        };
        let predictor = trainer.fit(&step_set()).unwrap();

        assert!(predictor.predict(&[10.0, 0.0]) < 60.0);
        assert!(predictor.predict(&[90.0, 0.0]) > 140.0);
    }

    #[test]
    fn same_seed_grows_the_same_forest() {
        // ---
        let trainer = RandomForestTrainer {
            n_trees: 5,
            ..Default::default()
        };

        let a = trainer.fit(&step_set()).unwrap();
        let b = trainer.fit(&step_set()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn constant_targets_give_leaves() {
        // ---
        let mut set = step_set();
        set.targets = vec![42.0; set.rows.len()];

        let Predictor::Forest(forest) = RandomForestTrainer::default().fit(&set).unwrap() else {
            panic!("expected a forest");
        };

        assert!(forest.trees.iter().all(|t| matches!(t, Node::Leaf { .. })));
        assert_eq!(forest.predict(&[7.0, 1.0]), 42.0);
    }

    #[test]
    fn empty_forest_predicts_zero() {
        // ---
        assert_eq!(ForestModel { trees: vec![] }.predict(&[1.0]), 0.0);
    }
}
