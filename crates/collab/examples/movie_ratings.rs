//! Example: neighborhood and latent-factor recommendations on a small
//! movie-rating matrix
//!
//! Run with:
//! ```bash
//! COLLAB_METRIC=pearson RUST_LOG=media_gateway_collab=debug \
//!     cargo run --example movie_ratings
//! ```

use anyhow::Result;
use media_gateway_collab::{
    init_logging, load_dotenv, CollabConfig, CollabEngine, EntityKind, PredictionSurface,
    RatingMatrix,
};
use ndarray::array;

fn print_top(engine: &CollabEngine, surface: &PredictionSurface, path: &str) -> Result<()> {
    let store = engine.store();
    for user in 0..store.n_users() {
        let recs = engine.recommend(user, surface, 2)?;
        let named: Vec<serde_json::Value> = recs
            .iter()
            .map(|r| {
                serde_json::json!({
                    "movie": store.item_label(r.item),
                    "score": (r.score * 100.0).round() / 100.0,
                    "low_confidence": r.low_confidence,
                })
            })
            .collect();
        println!(
            "[{}] {}: {}",
            path,
            store.user_label(user).unwrap_or("?"),
            serde_json::to_string(&named)?
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    load_dotenv();
    let config = CollabConfig::load()?;
    init_logging(&config.log_config())?;

    // 0 marks an unrated movie
    let ratings = array![
        [5.0, 3.0, 0.0, 4.0, 5.0],
        [4.0, 0.0, 2.0, 4.0, 5.0],
        [0.0, 0.0, 5.0, 1.0, 0.0],
        [1.0, 0.0, 4.0, 0.0, 2.0],
        [2.0, 4.0, 0.0, 0.0, 1.0]
    ];
    let users = ["ana", "ben", "cam", "dee", "eli"];
    let movies = ["Heat", "Alien", "Amelie", "Ronin", "Up"];

    let store = RatingMatrix::from_dense(&ratings, 0.0, config.rating_scale()?)?.with_labels(
        users.iter().map(|s| s.to_string()).collect(),
        movies.iter().map(|s| s.to_string()).collect(),
    )?;

    let engine = CollabEngine::new(config, store)?;

    for kind in [EntityKind::Users, EntityKind::Items] {
        let surface = engine.neighborhood_surface(kind)?;
        print_top(&engine, &surface, &format!("{:?}", kind))?;
    }

    let (model, report, surface) = engine.train_factorization()?;
    println!(
        "SGD stopped after {} epochs ({:?}), loss {:.4}",
        report.epochs_run,
        report.stop_reason,
        report.final_loss().unwrap_or(f64::NAN)
    );
    let evaluation = engine.evaluate(&surface)?;
    println!(
        "training RMSE {:.4}, MAE {:.4} over {} ratings",
        evaluation.rmse, evaluation.mae, evaluation.count
    );
    print_top(&engine, &surface, "factors")?;

    if let Some(heat) = engine.store().item_index("Heat") {
        for (item, score) in model.similar_items(heat, 2)? {
            println!(
                "viewers of Heat also liked {} ({:.3})",
                engine.store().item_label(item).unwrap_or("?"),
                score
            );
        }
    }

    Ok(())
}
