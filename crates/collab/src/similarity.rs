//! Similarity Engine
//!
//! Pairwise user-user and item-item similarity restricted to co-rated
//! dimensions. Both metrics return 0 when fewer than two dimensions are
//! co-rated or a masked vector has no spread, so a degenerate pair never
//! produces NaN.

use crate::error::{CollabError, MatrixAxis, Result};
use crate::store::RatingMatrix;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::instrument;

/// Co-rated dimensions required before a similarity is defined
pub const MIN_CO_RATED: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Pearson,
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => write!(f, "cosine"),
            SimilarityMetric::Pearson => write!(f, "pearson"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "pearson" => Ok(SimilarityMetric::Pearson),
            other => Err(format!("unknown similarity metric '{}'", other)),
        }
    }
}

/// Which entities a similarity matrix compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Users,
    Items,
}

/// Similarity of two rating vectors under `metric`.
///
/// Vectors must have equal length; `None` marks an unrated dimension.
pub fn similarity(a: &[Option<f64>], b: &[Option<f64>], metric: SimilarityMetric) -> Result<f64> {
    if a.len() != b.len() {
        return Err(CollabError::ShapeMismatch {
            expected: (1, a.len()),
            actual: (1, b.len()),
        });
    }

    let (xs, ys) = co_rated(a, b);
    if xs.len() < MIN_CO_RATED {
        return Ok(0.0);
    }

    Ok(match metric {
        SimilarityMetric::Cosine => cosine(&xs, &ys),
        SimilarityMetric::Pearson => pearson(&xs, &ys),
    })
}

/// Values of both vectors at the positions rated in both
fn co_rated(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b.iter())
        .filter_map(|pair| match pair {
            (Some(x), Some(y)) => Some((*x, *y)),
            _ => None,
        })
        .unzip()
}

fn cosine(xs: &[f64], ys: &[f64]) -> f64 {
    let dot: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
    let norm_x = xs.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_y = ys.iter().map(|y| y * y).sum::<f64>().sqrt();

    if norm_x == 0.0 || norm_y == 0.0 {
        return 0.0;
    }

    (dot / (norm_x * norm_y)).clamp(-1.0, 1.0)
}

/// Pearson correlation centred on the means of the co-rated subset
fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }

    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// Dense symmetric similarity matrix over users or items
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    kind: EntityKind,
    metric: SimilarityMetric,
    values: Array2<f64>,
}

impl SimilarityMatrix {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn get(&self, a: usize, b: usize) -> Result<f64> {
        let len = self.len();
        for index in [a, b] {
            if index >= len {
                return Err(CollabError::OutOfRange {
                    axis: self.axis(),
                    index,
                    len,
                });
            }
        }
        Ok(self.values[[a, b]])
    }

    /// Every other entity with its similarity to `a`, most similar first.
    /// Ties keep ascending index order.
    pub fn neighbors(&self, a: usize) -> Result<Vec<(usize, f64)>> {
        self.get(a, a)?;
        Ok(self.ranked(a))
    }

    /// `neighbors` for an index already known to be in range
    pub(crate) fn ranked(&self, a: usize) -> Vec<(usize, f64)> {
        let mut neighbors: Vec<(usize, f64)> = self
            .values
            .row(a)
            .iter()
            .enumerate()
            .filter(|(b, _)| *b != a)
            .map(|(b, &s)| (b, s))
            .collect();
        neighbors.sort_by(|x, y| y.1.total_cmp(&x.1));
        neighbors
    }

    fn axis(&self) -> MatrixAxis {
        match self.kind {
            EntityKind::Users => MatrixAxis::User,
            EntityKind::Items => MatrixAxis::Item,
        }
    }
}

/// Computes similarities pairwise on demand or as a full matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityEngine {
    metric: SimilarityMetric,
}

impl SimilarityEngine {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn user_similarity(&self, store: &RatingMatrix, a: usize, b: usize) -> Result<f64> {
        similarity(&store.row(a)?, &store.row(b)?, self.metric)
    }

    pub fn item_similarity(&self, store: &RatingMatrix, a: usize, b: usize) -> Result<f64> {
        similarity(&store.column(a)?, &store.column(b)?, self.metric)
    }

    pub fn user_matrix(&self, store: &RatingMatrix) -> Result<SimilarityMatrix> {
        self.matrix(store, EntityKind::Users)
    }

    pub fn item_matrix(&self, store: &RatingMatrix) -> Result<SimilarityMatrix> {
        self.matrix(store, EntityKind::Items)
    }

    /// Full N×N matrix. Rows are computed in parallel; each unordered pair
    /// is evaluated once and mirrored.
    #[instrument(skip(self, store), fields(metric = %self.metric))]
    pub fn matrix(&self, store: &RatingMatrix, kind: EntityKind) -> Result<SimilarityMatrix> {
        let vectors: Vec<Vec<Option<f64>>> = match kind {
            EntityKind::Users => (0..store.n_users())
                .map(|u| store.row(u))
                .collect::<Result<_>>()?,
            EntityKind::Items => (0..store.n_items())
                .map(|i| store.column(i))
                .collect::<Result<_>>()?,
        };
        let n = vectors.len();

        let upper: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|a| {
                (a..n)
                    .map(|b| similarity(&vectors[a], &vectors[b], self.metric))
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<_>>()?;

        let mut values = Array2::<f64>::zeros((n, n));
        for (a, row) in upper.into_iter().enumerate() {
            for (offset, s) in row.into_iter().enumerate() {
                let b = a + offset;
                values[[a, b]] = s;
                values[[b, a]] = s;
            }
        }

        tracing::debug!(entities = n, ?kind, "computed similarity matrix");

        Ok(SimilarityMatrix {
            kind,
            metric: self.metric,
            values,
        })
    }
}
