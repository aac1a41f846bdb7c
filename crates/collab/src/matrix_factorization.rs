//! Matrix Factorization using Stochastic Gradient Descent
//!
//! Learns user factors P (users × K) and item factors Q (items × K) so that
//! P[u]·Q[i] approximates every known rating. Training runs over the known
//! ratings only, in a seeded shuffle order per epoch.
//!
//! Trained factors are published as an immutable `Arc` snapshot. Retraining
//! builds fresh buffers and swaps the snapshot in when the run ends, so a
//! reader never sees a partially updated pair.

use crate::error::{CollabError, MatrixAxis, Result};
use crate::store::{KnownRating, RatingMatrix};
use crate::surface::{NumericWarning, PredictionSurface};
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Epoch interval between debug loss lines
const LOSS_LOG_INTERVAL: usize = 100;

/// SGD configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    /// Number of latent factors (K)
    pub latent_dim: usize,
    /// Step size (alpha)
    pub learning_rate: f64,
    /// L2 regularization (beta)
    pub regularization: f64,
    /// Number of passes over the known ratings
    pub epochs: usize,
    /// RNG seed for initialisation and shuffling
    pub seed: u64,
    /// Factors start uniform in [0, init_scale)
    pub init_scale: f64,
    /// Stop once the epoch-over-epoch loss change drops below this
    pub min_loss_delta: Option<f64>,
    /// Stop at the first epoch boundary after this much wall-clock time
    pub max_training_time: Option<Duration>,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            latent_dim: 2,
            learning_rate: 0.01,
            regularization: 0.02,
            epochs: 5000,
            seed: 42,
            init_scale: 0.1,
            min_loss_delta: None,
            max_training_time: None,
        }
    }
}

impl SgdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.latent_dim == 0 {
            return Err(CollabError::invalid_config(
                "latent_dim must be greater than 0",
                "latent_dim",
            ));
        }
        if self.epochs == 0 {
            return Err(CollabError::invalid_config(
                "epochs must be greater than 0",
                "epochs",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CollabError::invalid_config(
                format!(
                    "learning_rate must be positive and finite, got {}",
                    self.learning_rate
                ),
                "learning_rate",
            ));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(CollabError::invalid_config(
                format!(
                    "regularization must be non-negative, got {}",
                    self.regularization
                ),
                "regularization",
            ));
        }
        if !(self.init_scale.is_finite() && self.init_scale > 0.0) {
            return Err(CollabError::invalid_config(
                format!("init_scale must be positive, got {}", self.init_scale),
                "init_scale",
            ));
        }
        if let Some(delta) = self.min_loss_delta {
            if !(delta.is_finite() && delta >= 0.0) {
                return Err(CollabError::invalid_config(
                    format!("min_loss_delta must be non-negative, got {}", delta),
                    "min_loss_delta",
                ));
            }
        }
        Ok(())
    }
}

/// Trained user and item factors
#[derive(Debug, Clone)]
pub struct LatentFactors {
    /// User latent factors: [num_users x latent_dim]
    pub user_factors: Array2<f64>,
    /// Item latent factors: [num_items x latent_dim]
    pub item_factors: Array2<f64>,
}

impl LatentFactors {
    pub fn predict(&self, user: usize, item: usize) -> f64 {
        self.user_factors.row(user).dot(&self.item_factors.row(item))
    }

    /// Reconstructed rating matrix P·Qᵗ
    pub fn reconstruct(&self) -> Array2<f64> {
        self.user_factors.dot(&self.item_factors.t())
    }
}

/// Why a training run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// All configured epochs ran
    Completed,
    /// Loss change fell below `min_loss_delta`
    Converged,
    /// `max_training_time` elapsed
    TimeBudget,
    /// Loss became NaN or infinite
    Diverged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    /// Mean squared error over the known ratings after each epoch
    pub loss_history: Vec<f64>,
    pub stop_reason: StopReason,
    pub warnings: Vec<NumericWarning>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

/// SGD-based matrix factorization
pub struct MatrixFactorization {
    config: SgdConfig,
    factors: Option<Arc<LatentFactors>>,
    shape: (usize, usize),
}

impl MatrixFactorization {
    pub fn new(config: SgdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factors: None,
            shape: (0, 0),
        })
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    /// Train on the known ratings of `store`, replacing any earlier factors.
    #[instrument(skip(self, store), fields(latent_dim = self.config.latent_dim, epochs = self.config.epochs))]
    pub fn fit(&mut self, store: &RatingMatrix) -> Result<TrainingReport> {
        let mut triples = store.known_entries();
        if triples.is_empty() {
            return Err(CollabError::InsufficientData(
                "cannot factorize a rating matrix with no known ratings".to_string(),
            ));
        }

        let k = self.config.latent_dim;
        let alpha = self.config.learning_rate;
        let beta = self.config.regularization;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        // Initialize user and item factors randomly
        let mut user_factors = self.random_factors(store.n_users(), &mut rng);
        let mut item_factors = self.random_factors(store.n_items(), &mut rng);

        let started = Instant::now();
        let mut loss_history = Vec::with_capacity(self.config.epochs);
        let mut warnings = Vec::new();
        let mut stop_reason = StopReason::Completed;

        for epoch in 0..self.config.epochs {
            triples.shuffle(&mut rng);

            for rating in &triples {
                let (u, i) = (rating.user, rating.item);
                let error = rating.value
                    - user_factors.row(u).dot(&item_factors.row(i));

                for f in 0..k {
                    let p = user_factors[[u, f]];
                    let q = item_factors[[i, f]];
                    user_factors[[u, f]] += alpha * (2.0 * error * q - beta * p);
                    item_factors[[i, f]] += alpha * (2.0 * error * p - beta * q);
                }
            }

            let loss = Self::compute_loss(&triples, &user_factors, &item_factors);
            let previous = loss_history.last().copied();
            loss_history.push(loss);

            if epoch % LOSS_LOG_INTERVAL == 0 {
                tracing::debug!("SGD epoch {}: loss = {:.6}", epoch, loss);
            }

            if !loss.is_finite() {
                let warning = NumericWarning::NonFiniteLoss { epoch };
                tracing::warn!(%warning, "stopping SGD training");
                warnings.push(warning);
                stop_reason = StopReason::Diverged;
                break;
            }

            if let (Some(delta), Some(previous)) = (self.config.min_loss_delta, previous) {
                if (previous - loss).abs() < delta {
                    stop_reason = StopReason::Converged;
                    break;
                }
            }

            if let Some(budget) = self.config.max_training_time {
                if started.elapsed() >= budget {
                    stop_reason = StopReason::TimeBudget;
                    break;
                }
            }
        }

        let report = TrainingReport {
            epochs_run: loss_history.len(),
            loss_history,
            stop_reason,
            warnings,
        };

        tracing::info!(
            epochs_run = report.epochs_run,
            final_loss = report.final_loss(),
            ?stop_reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "matrix factorization trained"
        );

        self.factors = Some(Arc::new(LatentFactors {
            user_factors,
            item_factors,
        }));
        self.shape = store.shape();

        Ok(report)
    }

    fn random_factors(&self, rows: usize, rng: &mut StdRng) -> Array2<f64> {
        let scale = self.config.init_scale;
        Array2::from_shape_simple_fn((rows, self.config.latent_dim), || {
            rng.gen_range(0.0..scale)
        })
    }

    /// Mean squared reconstruction error over the known ratings
    fn compute_loss(
        triples: &[KnownRating],
        user_factors: &Array2<f64>,
        item_factors: &Array2<f64>,
    ) -> f64 {
        let total: f64 = triples
            .iter()
            .map(|r| {
                let prediction = user_factors.row(r.user).dot(&item_factors.row(r.item));
                (r.value - prediction).powi(2)
            })
            .sum();
        total / triples.len() as f64
    }

    /// Current trained factors. The snapshot stays valid across retraining.
    pub fn snapshot(&self) -> Result<Arc<LatentFactors>> {
        self.factors.clone().ok_or(CollabError::NotTrained)
    }

    /// Predict rating for user-item pair
    pub fn predict(&self, user: usize, item: usize) -> Result<f64> {
        let factors = self.trained()?;
        self.check(user, item)?;
        Ok(factors.predict(user, item))
    }

    /// Dense P·Qᵗ surface, scanned against the store's rating scale
    pub fn predicted_surface(&self, store: &RatingMatrix) -> Result<PredictionSurface> {
        let factors = self.trained()?;
        if store.shape() != self.shape {
            return Err(CollabError::ShapeMismatch {
                expected: self.shape,
                actual: store.shape(),
            });
        }
        PredictionSurface::from_values(factors.reconstruct(), store.scale())
    }

    /// Get user embedding
    pub fn user_embedding(&self, user: usize) -> Result<Vec<f64>> {
        let factors = self.trained()?;
        self.check(user, 0)?;
        Ok(factors.user_factors.row(user).to_vec())
    }

    /// Get item embedding
    pub fn item_embedding(&self, item: usize) -> Result<Vec<f64>> {
        let factors = self.trained()?;
        self.check(0, item)?;
        Ok(factors.item_factors.row(item).to_vec())
    }

    /// Items closest to `item` in latent space, most similar first
    pub fn similar_items(&self, item: usize, k: usize) -> Result<Vec<(usize, f64)>> {
        let factors = self.trained()?;
        self.check(0, item)?;

        let target = factors.item_factors.row(item);
        let mut similar: Vec<(usize, f64)> = factors
            .item_factors
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(other, _)| *other != item)
            .map(|(other, row)| (other, Self::embedding_cosine(target, row)))
            .collect();

        similar.sort_by(|a, b| b.1.total_cmp(&a.1));
        similar.truncate(k);
        Ok(similar)
    }

    /// Compute cosine similarity between two embeddings
    pub fn embedding_cosine(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        if a.len() != b.len() {
            return 0.0;
        }

        let norm_a = a.dot(&a).sqrt();
        let norm_b = b.dot(&b).sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }

    fn trained(&self) -> Result<&LatentFactors> {
        self.factors.as_deref().ok_or(CollabError::NotTrained)
    }

    fn check(&self, user: usize, item: usize) -> Result<()> {
        let (n_users, n_items) = self.shape;
        if user >= n_users {
            return Err(CollabError::OutOfRange {
                axis: MatrixAxis::User,
                index: user,
                len: n_users,
            });
        }
        if item >= n_items {
            return Err(CollabError::OutOfRange {
                axis: MatrixAxis::Item,
                index: item,
                len: n_items,
            });
        }
        Ok(())
    }
}
