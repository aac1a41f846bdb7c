//! Integration tests for the collaborative-filtering pipeline
//!
//! Runs both prediction paths end to end through the public API.

use anyhow::Result;
use media_gateway_collab::evaluation::{evaluate_on, rmse};
use media_gateway_collab::{
    CollabConfig, CollabEngine, CollabError, Confidence, EntityKind, MatrixFactorization,
    NeighborhoodPredictor, RatingMatrix, RatingScale, RecommendationGenerator, SgdConfig,
    SimilarityEngine, SimilarityMetric, StopReason,
};

fn labeled_store() -> Result<RatingMatrix> {
    let triples = vec![
        ("ana", "Heat", 5.0),
        ("ana", "Alien", 3.0),
        ("ana", "Ronin", 4.0),
        ("ana", "Up", 5.0),
        ("ben", "Heat", 4.0),
        ("ben", "Amelie", 2.0),
        ("ben", "Ronin", 4.0),
        ("ben", "Up", 5.0),
        ("cam", "Amelie", 5.0),
        ("cam", "Ronin", 1.0),
        ("dee", "Heat", 1.0),
        ("dee", "Amelie", 4.0),
        ("dee", "Up", 2.0),
        ("eli", "Heat", 2.0),
        ("eli", "Alien", 4.0),
        ("eli", "Up", 1.0),
    ];
    Ok(RatingMatrix::from_labeled_triples(
        triples
            .into_iter()
            .map(|(u, i, r)| (u.to_string(), i.to_string(), r)),
        RatingScale::default(),
    )?)
}

#[test]
fn test_labels_are_display_only() -> Result<()> {
    let store = labeled_store()?;
    assert_eq!(store.shape(), (5, 5));
    assert_eq!(store.user_label(2), Some("cam"));
    assert_eq!(store.item_index("Amelie"), Some(4));

    let unlabeled = RatingMatrix::from_triples(
        5,
        5,
        store
            .known_entries()
            .into_iter()
            .map(|r| (r.user, r.item, r.value)),
        RatingScale::default(),
    )?;

    let engine = SimilarityEngine::new(SimilarityMetric::Cosine);
    assert_eq!(
        engine.user_matrix(&store)?.values(),
        engine.user_matrix(&unlabeled)?.values()
    );
    Ok(())
}

#[test]
fn test_neighborhood_pipeline_user_and_item_based() -> Result<()> {
    let store = labeled_store()?;
    let engine = CollabEngine::new(CollabConfig::default(), store)?;

    for kind in [EntityKind::Users, EntityKind::Items] {
        let surface = engine.neighborhood_surface(kind)?;
        assert_eq!(surface.shape(), (5, 5));

        let report = engine.evaluate(&surface)?;
        // Known cells carry the observed rating on the neighborhood path
        assert_eq!(report.rmse, 0.0);
        assert_eq!(report.count, 16);

        let ana = engine.store().user_index("ana").unwrap();
        let recs = engine.recommend(ana, &surface, 3)?;
        assert!(recs.len() <= 1);
        for rec in recs {
            assert_eq!(engine.store().item_label(rec.item), Some("Amelie"));
        }
    }
    Ok(())
}

#[test]
fn test_cold_start_is_distinguishable_from_prediction() -> Result<()> {
    let store = labeled_store()?;
    let sims = SimilarityEngine::new(SimilarityMetric::Cosine).user_matrix(&store)?;
    let predictor = NeighborhoodPredictor::new(&store, &sims)?;
    let surface = predictor.predict_all(2)?;

    let cam = store.user_index("cam").unwrap();
    let alien = store.item_index("Alien").unwrap();
    let prediction = predictor.predict(cam, alien, 2)?;
    assert_eq!(prediction.confidence, Confidence::ColdStart);
    assert!(surface.is_low_confidence(cam, alien)?);

    let recs = RecommendationGenerator::new(&store).recommend(cam, &surface, 5)?;
    let flagged = recs.iter().find(|r| r.item == alien).unwrap();
    assert!(flagged.low_confidence);
    Ok(())
}

#[test]
fn test_factorization_pipeline() -> Result<()> {
    let store = labeled_store()?;
    let config = CollabConfig {
        epochs: 3000,
        seed: 11,
        ..CollabConfig::default()
    };
    let engine = CollabEngine::new(config, store)?;

    let (model, report, surface) = engine.train_factorization()?;
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.loss_history.len(), 3000);
    assert!(engine.evaluate(&surface)?.rmse < 1.0);

    let snapshot = model.snapshot()?;
    assert_eq!(snapshot.user_factors.dim(), (5, 2));

    for user in 0..5 {
        for rec in engine.recommend(user, &surface, 5)? {
            assert!(!engine.store().is_rated(user, rec.item)?);
            assert!((1.0..=5.0).contains(&rec.score));
        }
    }
    Ok(())
}

#[test]
fn test_holdout_evaluation() -> Result<()> {
    let store = labeled_store()?;
    let (train, held_out) = store.split_holdout(0.25, 3)?;
    assert_eq!(held_out.len(), 4);

    let mut model = MatrixFactorization::new(SgdConfig {
        epochs: 2000,
        ..SgdConfig::default()
    })?;
    model.fit(&train)?;
    let mut surface = model.predicted_surface(&train)?;
    surface.clamp(train.scale());

    let report = evaluate_on(&held_out, &surface)?;
    assert_eq!(report.count, 4);
    assert!(report.rmse.is_finite());
    assert!(report.rmse <= 4.0);
    // Training error only covers the ratings the model saw
    assert!(rmse(&train, &surface)? < 1.0);
    Ok(())
}

#[test]
fn test_configuration_errors_propagate() {
    let store = RatingMatrix::from_triples(1, 1, vec![(0, 0, 3.0)], RatingScale::default())
        .expect("valid store");
    let config = CollabConfig {
        epochs: 0,
        ..CollabConfig::default()
    };
    assert!(matches!(
        CollabEngine::new(config, store),
        Err(CollabError::InvalidConfiguration { .. })
    ));
}
