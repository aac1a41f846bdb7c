//! Collaborative-Filtering Recommendation Engine
//!
//! Predicts missing ratings in a user × item rating matrix and ranks
//! unrated items per user. Two prediction paths share one output type:
//!
//! - neighborhood averaging over user-user or item-item similarity
//! - latent factors learned by SGD matrix factorization
//!
//! Both produce a `PredictionSurface`, consumed by the recommendation
//! generator and the evaluator.
//!
//! ```
//! use media_gateway_collab::{CollabConfig, CollabEngine, EntityKind, RatingMatrix, RatingScale};
//!
//! let store = RatingMatrix::from_triples(
//!     3,
//!     3,
//!     vec![(0, 0, 5.0), (0, 1, 4.0), (1, 0, 4.0), (1, 1, 5.0), (1, 2, 2.0), (2, 2, 5.0)],
//!     RatingScale::default(),
//! )
//! .unwrap();
//!
//! let engine = CollabEngine::new(CollabConfig::default(), store).unwrap();
//! let surface = engine.neighborhood_surface(EntityKind::Users).unwrap();
//! let recs = engine.recommend(0, &surface, 1).unwrap();
//! assert_eq!(recs[0].item, 2);
//! ```

pub mod config;
pub mod error;
pub mod evaluation;
pub mod matrix_factorization;
pub mod neighborhood;
pub mod observability;
pub mod recommendation;
pub mod similarity;
pub mod store;
pub mod surface;

// Re-export key types
pub use crate::config::{load_dotenv, CollabConfig, ConfigLoader};
pub use error::{CollabError, MatrixAxis, Result};
pub use evaluation::EvaluationReport;
pub use matrix_factorization::{
    LatentFactors, MatrixFactorization, SgdConfig, StopReason, TrainingReport,
};
pub use neighborhood::{Confidence, NeighborhoodPredictor, Prediction};
pub use observability::{init_logging, LogConfig, LogFormat};
pub use recommendation::{Recommendation, RecommendationGenerator};
pub use similarity::{EntityKind, SimilarityEngine, SimilarityMatrix, SimilarityMetric};
pub use store::{KnownRating, RatingMatrix, RatingScale};
pub use surface::{NumericWarning, PredictionSurface};

use std::sync::Arc;

/// Engine instance wiring a rating matrix through the configured pipeline
pub struct CollabEngine {
    config: CollabConfig,
    store: Arc<RatingMatrix>,
}

impl CollabEngine {
    /// The configured rating scale must match the scale `store` was built
    /// with, since clamping and warnings use the store's scale.
    pub fn new(config: CollabConfig, store: RatingMatrix) -> Result<Self> {
        config.validate()?;
        let scale = config.rating_scale()?;
        if scale != store.scale() {
            return Err(CollabError::invalid_config(
                format!(
                    "configured rating scale [{}, {}] does not match the store scale [{}, {}]",
                    scale.min,
                    scale.max,
                    store.scale().min,
                    store.scale().max
                ),
                "rating_min",
            ));
        }
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RatingMatrix> {
        &self.store
    }

    pub fn similarity_matrix(&self, kind: EntityKind) -> Result<SimilarityMatrix> {
        SimilarityEngine::new(self.config.metric).matrix(&self.store, kind)
    }

    /// Neighborhood path: user-based for `Users`, item-based for `Items`
    pub fn neighborhood_surface(&self, kind: EntityKind) -> Result<PredictionSurface> {
        let similarities = self.similarity_matrix(kind)?;
        let predictor = NeighborhoodPredictor::new(&self.store, &similarities)?;
        let surface = predictor.predict_all(self.config.k_neighbors)?;
        Ok(self.finish(surface))
    }

    /// Latent-factor path. Returns the trained model, its report, and the
    /// reconstructed surface.
    pub fn train_factorization(
        &self,
    ) -> Result<(MatrixFactorization, TrainingReport, PredictionSurface)> {
        let mut model = MatrixFactorization::new(self.config.sgd_config())?;
        let report = model.fit(&self.store)?;
        let mut surface = model.predicted_surface(&self.store)?;
        for warning in &report.warnings {
            surface.push_warning(warning.clone());
        }
        Ok((model, report, self.finish(surface)))
    }

    pub fn recommend(
        &self,
        user: usize,
        surface: &PredictionSurface,
        n: usize,
    ) -> Result<Vec<Recommendation>> {
        RecommendationGenerator::new(&self.store).recommend(user, surface, n)
    }

    pub fn evaluate(&self, surface: &PredictionSurface) -> Result<EvaluationReport> {
        evaluation::evaluate(&self.store, surface)
    }

    fn finish(&self, mut surface: PredictionSurface) -> PredictionSurface {
        if self.config.clamp_predictions {
            surface.clamp(self.store.scale());
        }
        surface
    }
}

#[cfg(test)]
mod tests;
