//! Recommendation Generator
//!
//! Ranks the items a user has not rated by predicted score. Works on any
//! `PredictionSurface`, whichever path produced it.

use crate::error::{CollabError, Result};
use crate::store::RatingMatrix;
use crate::surface::PredictionSurface;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item: usize,
    pub score: f64,
    /// The score is a cold-start placeholder rather than an estimate
    pub low_confidence: bool,
}

pub struct RecommendationGenerator<'a> {
    store: &'a RatingMatrix,
}

impl<'a> RecommendationGenerator<'a> {
    pub fn new(store: &'a RatingMatrix) -> Self {
        Self { store }
    }

    /// Top `n` unrated items for `user`, highest score first. Equal scores
    /// keep ascending item order.
    pub fn recommend(
        &self,
        user: usize,
        surface: &PredictionSurface,
        n: usize,
    ) -> Result<Vec<Recommendation>> {
        self.check_shape(surface)?;
        self.store.check_user(user)?;

        let mut candidates = Vec::new();
        for item in 0..self.store.n_items() {
            if self.store.rated(user, item).is_some() {
                continue;
            }
            let score = surface.get(user, item)?;
            if !score.is_finite() {
                tracing::debug!(user, item, "skipping non-finite score");
                continue;
            }
            candidates.push(Recommendation {
                item,
                score,
                low_confidence: surface.is_low_confidence(user, item)?,
            });
        }

        // Stable sort keeps ascending item order among equal scores
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(n);
        Ok(candidates)
    }

    /// One ranked list per user, indexed by user
    pub fn recommend_all(
        &self,
        surface: &PredictionSurface,
        n: usize,
    ) -> Result<Vec<Vec<Recommendation>>> {
        (0..self.store.n_users())
            .map(|user| self.recommend(user, surface, n))
            .collect()
    }

    fn check_shape(&self, surface: &PredictionSurface) -> Result<()> {
        if surface.shape() != self.store.shape() {
            return Err(CollabError::ShapeMismatch {
                expected: self.store.shape(),
                actual: surface.shape(),
            });
        }
        Ok(())
    }
}
