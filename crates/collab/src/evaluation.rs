//! Accuracy metrics computed over known ratings only

use crate::error::{CollabError, Result};
use crate::store::{KnownRating, RatingMatrix};
use crate::surface::PredictionSurface;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub rmse: f64,
    pub mae: f64,
    /// Number of ratings the metrics were computed over
    pub count: usize,
    /// How many of those were scored against a cold-start placeholder
    pub low_confidence: usize,
}

pub fn rmse(actual: &RatingMatrix, predicted: &PredictionSurface) -> Result<f64> {
    evaluate(actual, predicted).map(|report| report.rmse)
}

pub fn mae(actual: &RatingMatrix, predicted: &PredictionSurface) -> Result<f64> {
    evaluate(actual, predicted).map(|report| report.mae)
}

/// RMSE and MAE over every known rating of `actual`
pub fn evaluate(actual: &RatingMatrix, predicted: &PredictionSurface) -> Result<EvaluationReport> {
    if actual.shape() != predicted.shape() {
        return Err(CollabError::ShapeMismatch {
            expected: actual.shape(),
            actual: predicted.shape(),
        });
    }
    evaluate_on(&actual.known_entries(), predicted)
}

pub fn rmse_on(entries: &[KnownRating], predicted: &PredictionSurface) -> Result<f64> {
    evaluate_on(entries, predicted).map(|report| report.rmse)
}

pub fn mae_on(entries: &[KnownRating], predicted: &PredictionSurface) -> Result<f64> {
    evaluate_on(entries, predicted).map(|report| report.mae)
}

/// RMSE and MAE over an explicit list of ratings, e.g. a held-out split.
///
/// Low-confidence cells are scored like any other prediction and counted in
/// `EvaluationReport::low_confidence`.
pub fn evaluate_on(
    entries: &[KnownRating],
    predicted: &PredictionSurface,
) -> Result<EvaluationReport> {
    if entries.is_empty() {
        return Err(CollabError::InsufficientData(
            "no known ratings to evaluate".to_string(),
        ));
    }

    let mut squared = 0.0;
    let mut absolute = 0.0;
    let mut low_confidence = 0;
    for rating in entries {
        let error = rating.value - predicted.get(rating.user, rating.item)?;
        squared += error * error;
        absolute += error.abs();
        if predicted.is_low_confidence(rating.user, rating.item)? {
            low_confidence += 1;
        }
    }

    let count = entries.len();
    let report = EvaluationReport {
        rmse: (squared / count as f64).sqrt(),
        mae: absolute / count as f64,
        count,
        low_confidence,
    };
    if low_confidence > 0 {
        tracing::warn!(
            low_confidence,
            count,
            "evaluation includes cold-start placeholder predictions"
        );
    }
    tracing::debug!(rmse = report.rmse, mae = report.mae, count, "evaluated predictions");
    Ok(report)
}
