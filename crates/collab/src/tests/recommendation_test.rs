//! Recommendation ranking tests across both prediction paths

use crate::matrix_factorization::{MatrixFactorization, SgdConfig};
use crate::neighborhood::NeighborhoodPredictor;
use crate::recommendation::RecommendationGenerator;
use crate::similarity::{SimilarityEngine, SimilarityMetric};
use crate::store::{RatingMatrix, RatingScale};
use ndarray::array;

fn store() -> RatingMatrix {
    let data = array![
        [5.0, 3.0, 0.0, 1.0],
        [4.0, 0.0, 0.0, 1.0],
        [1.0, 1.0, 0.0, 5.0],
        [1.0, 0.0, 0.0, 4.0],
        [0.0, 1.0, 5.0, 4.0]
    ];
    RatingMatrix::from_dense(&data, 0.0, RatingScale::default()).unwrap()
}

#[test]
fn test_item_based_recommendations_exclude_rated() {
    let store = store();
    let sims = SimilarityEngine::new(SimilarityMetric::Pearson)
        .item_matrix(&store)
        .unwrap();
    let surface = NeighborhoodPredictor::new(&store, &sims)
        .unwrap()
        .predict_all(2)
        .unwrap();
    let generator = RecommendationGenerator::new(&store);

    for user in 0..store.n_users() {
        for rec in generator.recommend(user, &surface, 10).unwrap() {
            assert!(!store.is_rated(user, rec.item).unwrap());
        }
    }
}

#[test]
fn test_factorization_recommendations_are_deterministic() {
    let store = store();
    let config = SgdConfig {
        epochs: 1000,
        ..SgdConfig::default()
    };

    let mut first = MatrixFactorization::new(config.clone()).unwrap();
    first.fit(&store).unwrap();
    let mut second = MatrixFactorization::new(config).unwrap();
    second.fit(&store).unwrap();

    let generator = RecommendationGenerator::new(&store);
    let a = generator
        .recommend(1, &first.predicted_surface(&store).unwrap(), 2)
        .unwrap();
    let b = generator
        .recommend(1, &second.predicted_surface(&store).unwrap(), 2)
        .unwrap();

    assert_eq!(a, b);
    let items: Vec<usize> = a.iter().map(|r| r.item).collect();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|&i| i == 1 || i == 2));
}
