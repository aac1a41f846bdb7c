//! Neighborhood Predictor
//!
//! User-based and item-based rating prediction by top-K similarity-weighted
//! averaging of neighbor ratings.
//!
//! Steps for `predict(user, item, k)`:
//! 1. Return a known rating unchanged
//! 2. Collect neighbors with non-zero similarity that rated the target
//! 3. Keep the K most similar (ties by ascending index)
//! 4. Average their ratings weighted by similarity: Σ(s·r) / Σ|s|
//! 5. No neighbors left: placeholder 0 flagged as cold start

use crate::error::{CollabError, Result};
use crate::similarity::{EntityKind, SimilarityMatrix};
use crate::store::RatingMatrix;
use crate::surface::PredictionSurface;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Value reported when no neighbor could contribute
pub const COLD_START_VALUE: f64 = 0.0;

/// How much a prediction can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// The rating was observed, not predicted
    Known,
    /// Weighted average over at least one neighbor
    Estimated,
    /// No neighbor contributed; the value is a placeholder
    ColdStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    pub confidence: Confidence,
    /// Number of neighbors that contributed
    pub neighbors: usize,
}

impl Prediction {
    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::ColdStart
    }
}

/// Predicts ratings from a similarity matrix. User-based when the matrix
/// compares users, item-based when it compares items.
pub struct NeighborhoodPredictor<'a> {
    store: &'a RatingMatrix,
    similarities: &'a SimilarityMatrix,
}

impl<'a> NeighborhoodPredictor<'a> {
    pub fn new(store: &'a RatingMatrix, similarities: &'a SimilarityMatrix) -> Result<Self> {
        let expected = match similarities.kind() {
            EntityKind::Users => store.n_users(),
            EntityKind::Items => store.n_items(),
        };
        if similarities.len() != expected {
            return Err(CollabError::ShapeMismatch {
                expected: (expected, expected),
                actual: (similarities.len(), similarities.len()),
            });
        }
        Ok(Self {
            store,
            similarities,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.similarities.kind()
    }

    pub fn predict(&self, user: usize, item: usize, k: usize) -> Result<Prediction> {
        check_k(k)?;
        self.store.check_user(user)?;
        self.store.check_item(item)?;
        Ok(self.predict_unchecked(user, item, k))
    }

    /// Dense surface of predictions for every (user, item). Known cells hold
    /// the observed rating; cold-start cells are flagged low confidence.
    #[instrument(skip(self), fields(kind = ?self.kind()))]
    pub fn predict_all(&self, k: usize) -> Result<PredictionSurface> {
        check_k(k)?;
        let (n_users, n_items) = self.store.shape();

        let rows: Vec<Vec<Prediction>> = (0..n_users)
            .into_par_iter()
            .map(|user| {
                (0..n_items)
                    .map(|item| self.predict_unchecked(user, item, k))
                    .collect()
            })
            .collect();

        let mut values = Array2::<f64>::zeros((n_users, n_items));
        let mut low_confidence = Array2::from_elem((n_users, n_items), false);
        let mut cold = 0usize;
        for (user, row) in rows.into_iter().enumerate() {
            for (item, prediction) in row.into_iter().enumerate() {
                values[[user, item]] = prediction.value;
                if prediction.is_low_confidence() {
                    low_confidence[[user, item]] = true;
                    cold += 1;
                }
            }
        }

        tracing::debug!(cold_start = cold, "neighborhood surface computed");
        PredictionSurface::new(values, low_confidence, self.store.scale())
    }

    fn predict_unchecked(&self, user: usize, item: usize, k: usize) -> Prediction {
        if let Some(value) = self.store.rated(user, item) {
            return Prediction {
                value,
                confidence: Confidence::Known,
                neighbors: 0,
            };
        }

        // (similarity, neighbor rating), most similar first
        let kind = self.kind();
        let anchor = match kind {
            EntityKind::Users => user,
            EntityKind::Items => item,
        };
        let candidates: Vec<(f64, f64)> = self
            .similarities
            .ranked(anchor)
            .into_iter()
            .filter(|&(_, s)| s != 0.0)
            .filter_map(|(other, s)| {
                let rating = match kind {
                    EntityKind::Users => self.store.rated(other, item),
                    EntityKind::Items => self.store.rated(user, other),
                };
                rating.map(|r| (s, r))
            })
            .take(k)
            .collect();

        if candidates.is_empty() {
            return Prediction {
                value: COLD_START_VALUE,
                confidence: Confidence::ColdStart,
                neighbors: 0,
            };
        }

        let weighted: f64 = candidates.iter().map(|(s, r)| s * r).sum();
        let norm: f64 = candidates.iter().map(|(s, _)| s.abs()).sum();

        Prediction {
            value: weighted / norm,
            confidence: Confidence::Estimated,
            neighbors: candidates.len(),
        }
    }
}

fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(CollabError::invalid_config(
            "k_neighbors must be greater than 0",
            "k_neighbors",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{SimilarityEngine, SimilarityMetric};
    use crate::store::RatingScale;
    use ndarray::array;

    fn store() -> RatingMatrix {
        let data = array![
            [5.0, 4.0, 0.0, 1.0],
            [5.0, 4.0, 4.0, 1.0],
            [4.0, 5.0, 5.0, 2.0],
            [1.0, 1.0, 1.0, 5.0]
        ];
        RatingMatrix::from_dense(&data, 0.0, RatingScale::default()).unwrap()
    }

    #[test]
    fn test_known_rating_returned_unchanged() {
        let store = store();
        let sims = SimilarityEngine::new(SimilarityMetric::Cosine)
            .user_matrix(&store)
            .unwrap();
        let predictor = NeighborhoodPredictor::new(&store, &sims).unwrap();

        let prediction = predictor.predict(0, 1, 2).unwrap();
        assert_eq!(prediction.value, 4.0);
        assert_eq!(prediction.confidence, Confidence::Known);
    }

    #[test]
    fn test_user_based_weighted_average() {
        let store = store();
        let sims = SimilarityEngine::new(SimilarityMetric::Cosine)
            .user_matrix(&store)
            .unwrap();
        let predictor = NeighborhoodPredictor::new(&store, &sims).unwrap();

        let prediction = predictor.predict(0, 2, 2).unwrap();
        assert_eq!(prediction.confidence, Confidence::Estimated);
        assert_eq!(prediction.neighbors, 2);

        // Expected from the two most similar raters of item 2.
        let mut raters: Vec<(f64, f64)> = (1..4)
            .map(|v| (sims.get(0, v).unwrap(), store.get(v, 2).unwrap().unwrap()))
            .collect();
        raters.sort_by(|a, b| b.0.total_cmp(&a.0));
        let top = &raters[..2];
        let expected = top.iter().map(|(s, r)| s * r).sum::<f64>()
            / top.iter().map(|(s, _)| s.abs()).sum::<f64>();
        assert!((prediction.value - expected).abs() < 1e-12);
        assert!(prediction.value > 3.5);
    }

    #[test]
    fn test_item_based_prediction() {
        let store = store();
        let sims = SimilarityEngine::new(SimilarityMetric::Cosine)
            .item_matrix(&store)
            .unwrap();
        let predictor = NeighborhoodPredictor::new(&store, &sims).unwrap();
        assert_eq!(predictor.kind(), EntityKind::Items);

        let prediction = predictor.predict(0, 2, 3).unwrap();
        assert_eq!(prediction.confidence, Confidence::Estimated);
        assert!(prediction.value >= 1.0 && prediction.value <= 5.0);
    }

    #[test]
    fn test_item_based_follows_neighbor_ranking() {
        let store = store();
        let sims = SimilarityEngine::new(SimilarityMetric::Pearson)
            .item_matrix(&store)
            .unwrap();
        let predictor = NeighborhoodPredictor::new(&store, &sims).unwrap();

        let top: Vec<(f64, f64)> = sims
            .neighbors(2)
            .unwrap()
            .into_iter()
            .filter(|&(_, s)| s != 0.0)
            .filter_map(|(other, s)| store.get(0, other).unwrap().map(|r| (s, r)))
            .take(2)
            .collect();
        let prediction = predictor.predict(0, 2, 2).unwrap();

        assert_eq!(prediction.neighbors, top.len());
        if top.is_empty() {
            assert!(prediction.is_low_confidence());
        } else {
            let expected = top.iter().map(|(s, r)| s * r).sum::<f64>()
                / top.iter().map(|(s, _)| s.abs()).sum::<f64>();
            assert!((prediction.value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cold_start_is_flagged() {
        // Item 2 was rated only by a user sharing a single item with user 0.
        let store = RatingMatrix::from_triples(
            3,
            3,
            vec![(0, 0, 5.0), (0, 1, 3.0), (1, 0, 4.0), (1, 2, 2.0)],
            RatingScale::default(),
        )
        .unwrap();
        let sims = SimilarityEngine::new(SimilarityMetric::Cosine)
            .user_matrix(&store)
            .unwrap();
        let predictor = NeighborhoodPredictor::new(&store, &sims).unwrap();

        let prediction = predictor.predict(0, 2, 2).unwrap();
        assert_eq!(prediction.value, COLD_START_VALUE);
        assert!(prediction.is_low_confidence());

        let surface = predictor.predict_all(2).unwrap();
        assert!(surface.is_low_confidence(0, 2).unwrap());
        assert!(!surface.is_low_confidence(0, 0).unwrap());
        assert_eq!(surface.get(0, 0).unwrap(), 5.0);
    }

    #[test]
    fn test_invalid_inputs() {
        let store = store();
        let sims = SimilarityEngine::new(SimilarityMetric::Cosine)
            .user_matrix(&store)
            .unwrap();
        let predictor = NeighborhoodPredictor::new(&store, &sims).unwrap();

        assert!(matches!(
            predictor.predict(0, 2, 0),
            Err(CollabError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            predictor.predict(4, 0, 2),
            Err(CollabError::OutOfRange { .. })
        ));

        let other = RatingMatrix::from_triples(2, 2, vec![(0, 0, 3.0)], RatingScale::default())
            .unwrap();
        assert!(matches!(
            NeighborhoodPredictor::new(&other, &sims),
            Err(CollabError::ShapeMismatch { .. })
        ));
    }
}
