//! Dense predicted-rating surface shared by the neighborhood and
//! latent-factor paths, plus the non-fatal numeric warnings raised while
//! producing it.

use crate::error::{CollabError, MatrixAxis, Result};
use crate::store::RatingScale;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-fatal numeric problem surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NumericWarning {
    /// Training loss became NaN or infinite; training stopped at `epoch`
    NonFiniteLoss { epoch: usize },
    /// Predictions fell outside the rating scale
    OutOfScale { count: usize, min: f64, max: f64 },
    /// Predictions were NaN or infinite
    NonFinitePrediction { count: usize },
}

impl fmt::Display for NumericWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericWarning::NonFiniteLoss { epoch } => {
                write!(f, "training loss became non-finite at epoch {}", epoch)
            }
            NumericWarning::OutOfScale { count, min, max } => write!(
                f,
                "{} predictions outside the rating scale (observed range [{:.3}, {:.3}])",
                count, min, max
            ),
            NumericWarning::NonFinitePrediction { count } => {
                write!(f, "{} predictions are NaN or infinite", count)
            }
        }
    }
}

/// Users × items predicted ratings
#[derive(Debug, Clone)]
pub struct PredictionSurface {
    values: Array2<f64>,
    low_confidence: Array2<bool>,
    warnings: Vec<NumericWarning>,
}

impl PredictionSurface {
    /// Wrap dense predictions and scan them against `scale`.
    pub fn new(values: Array2<f64>, low_confidence: Array2<bool>, scale: RatingScale) -> Result<Self> {
        if values.dim() != low_confidence.dim() {
            return Err(CollabError::ShapeMismatch {
                expected: values.dim(),
                actual: low_confidence.dim(),
            });
        }

        let mut surface = Self {
            values,
            low_confidence,
            warnings: Vec::new(),
        };
        surface.warnings = surface.scan(scale);
        for warning in &surface.warnings {
            tracing::warn!(%warning, "numeric instability in predictions");
        }
        Ok(surface)
    }

    /// Dense predictions with no cell flagged as low confidence
    pub fn from_values(values: Array2<f64>, scale: RatingScale) -> Result<Self> {
        let low_confidence = Array2::from_elem(values.dim(), false);
        Self::new(values, low_confidence, scale)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn warnings(&self) -> &[NumericWarning] {
        &self.warnings
    }

    pub fn get(&self, user: usize, item: usize) -> Result<f64> {
        self.check(user, item)?;
        Ok(self.values[[user, item]])
    }

    pub fn is_low_confidence(&self, user: usize, item: usize) -> Result<bool> {
        self.check(user, item)?;
        Ok(self.low_confidence[[user, item]])
    }

    /// Overwrite one prediction.
    pub fn set(&mut self, user: usize, item: usize, value: f64) -> Result<()> {
        self.check(user, item)?;
        self.values[[user, item]] = value;
        Ok(())
    }

    /// Pull every prediction into `scale`. Low-confidence cells keep their
    /// placeholder value so they stay recognisable. NaN cells become
    /// `scale.min`.
    ///
    /// Warnings from the scan at construction are kept: they describe the
    /// raw predictions, which clamping hides.
    pub fn clamp(&mut self, scale: RatingScale) {
        ndarray::Zip::from(&mut self.values)
            .and(&self.low_confidence)
            .par_for_each(|value, &low| {
                if !low {
                    *value = scale.clamp(*value);
                }
            });
    }

    pub(crate) fn push_warning(&mut self, warning: NumericWarning) {
        self.warnings.push(warning);
    }

    fn scan(&self, scale: RatingScale) -> Vec<NumericWarning> {
        let mut warnings = Vec::new();
        let mut non_finite = 0;
        let mut out_of_scale = 0;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;

        for (&value, &low) in self.values.iter().zip(self.low_confidence.iter()) {
            if low {
                continue;
            }
            if !value.is_finite() {
                non_finite += 1;
            } else if !scale.contains(value) {
                out_of_scale += 1;
                lo = lo.min(value);
                hi = hi.max(value);
            }
        }

        if non_finite > 0 {
            warnings.push(NumericWarning::NonFinitePrediction { count: non_finite });
        }
        if out_of_scale > 0 {
            warnings.push(NumericWarning::OutOfScale {
                count: out_of_scale,
                min: lo,
                max: hi,
            });
        }
        warnings
    }

    fn check(&self, user: usize, item: usize) -> Result<()> {
        let (n_users, n_items) = self.shape();
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
