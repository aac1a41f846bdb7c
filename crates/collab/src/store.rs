//! Rating Store
//!
//! Holds the user × item rating matrix. A missing rating is tracked in an
//! explicit mask parallel to the dense values, so "unrated" can never be
//! mistaken for a low rating.

use crate::error::{CollabError, MatrixAxis, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inclusive bounds of a valid rating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl RatingScale {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(CollabError::InvalidConfiguration {
                message: format!("rating scale [{}, {}] is empty or not finite", min, max),
                key: Some("rating_min".to_string()),
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Pull a value into the scale. NaN maps to the lower bound.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self { min: 1.0, max: 5.0 }
    }
}

/// One observed rating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnownRating {
    pub user: usize,
    pub item: usize,
    pub value: f64,
}

/// User × item rating matrix with an explicit "known" mask
#[derive(Debug, Clone)]
pub struct RatingMatrix {
    values: Array2<f64>,
    known: Array2<bool>,
    scale: RatingScale,
    user_labels: Vec<String>,
    item_labels: Vec<String>,
}

impl RatingMatrix {
    /// Build from sparse (user, item, rating) triples. A repeated pair keeps
    /// the last value.
    pub fn from_triples<I>(
        n_users: usize,
        n_items: usize,
        triples: I,
        scale: RatingScale,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut values = Array2::<f64>::zeros((n_users, n_items));
        let mut known = Array2::<bool>::from_elem((n_users, n_items), false);

        for (user, item, value) in triples {
            bounds_check(MatrixAxis::User, user, n_users)?;
            bounds_check(MatrixAxis::Item, item, n_items)?;
            if !scale.contains(value) {
                return Err(CollabError::InvalidRating { user, item, value });
            }
            values[[user, item]] = value;
            known[[user, item]] = true;
        }

        Ok(Self {
            values,
            known,
            scale,
            user_labels: Vec::new(),
            item_labels: Vec::new(),
        })
    }

    /// Build from a dense array where `unrated` marks a missing rating.
    pub fn from_dense(data: &Array2<f64>, unrated: f64, scale: RatingScale) -> Result<Self> {
        let (n_users, n_items) = data.dim();
        let triples = data
            .indexed_iter()
            .filter(|(_, &v)| v != unrated)
            .map(|((u, i), &v)| (u, i, v));
        Self::from_triples(n_users, n_items, triples, scale)
    }

    /// Build from labelled triples. Indices are assigned in first-seen order.
    pub fn from_labeled_triples<I>(triples: I, scale: RatingScale) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String, f64)>,
    {
        let mut user_ids: HashMap<String, usize> = HashMap::new();
        let mut item_ids: HashMap<String, usize> = HashMap::new();
        let mut user_labels = Vec::new();
        let mut item_labels = Vec::new();
        let mut indexed = Vec::new();

        for (user, item, rating) in triples {
            let user_idx = *user_ids.entry(user.clone()).or_insert_with(|| {
                user_labels.push(user);
                user_labels.len() - 1
            });
            let item_idx = *item_ids.entry(item.clone()).or_insert_with(|| {
                item_labels.push(item);
                item_labels.len() - 1
            });
            indexed.push((user_idx, item_idx, rating));
        }

        let matrix = Self::from_triples(user_labels.len(), item_labels.len(), indexed, scale)?;
        matrix.with_labels(user_labels, item_labels)
    }

    /// Attach display labels. Labels take no part in any computation.
    pub fn with_labels(mut self, users: Vec<String>, items: Vec<String>) -> Result<Self> {
        if users.len() != self.n_users() || items.len() != self.n_items() {
            return Err(CollabError::ShapeMismatch {
                expected: self.shape(),
                actual: (users.len(), items.len()),
            });
        }
        self.user_labels = users;
        self.item_labels = items;
        Ok(self)
    }

    pub fn n_users(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_items(&self) -> usize {
        self.values.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    pub fn n_known(&self) -> usize {
        self.known.iter().filter(|&&k| k).count()
    }

    pub fn get(&self, user: usize, item: usize) -> Result<Option<f64>> {
        self.check_user(user)?;
        self.check_item(item)?;
        Ok(self.known[[user, item]].then(|| self.values[[user, item]]))
    }

    pub fn is_rated(&self, user: usize, item: usize) -> Result<bool> {
        self.check_user(user)?;
        self.check_item(item)?;
        Ok(self.known[[user, item]])
    }

    pub fn row(&self, user: usize) -> Result<Vec<Option<f64>>> {
        self.check_user(user)?;
        Ok(self
            .values
            .row(user)
            .iter()
            .zip(self.known.row(user).iter())
            .map(|(&v, &k)| k.then_some(v))
            .collect())
    }

    pub fn column(&self, item: usize) -> Result<Vec<Option<f64>>> {
        self.check_item(item)?;
        Ok(self
            .values
            .column(item)
            .iter()
            .zip(self.known.column(item).iter())
            .map(|(&v, &k)| k.then_some(v))
            .collect())
    }

    /// All observed ratings in row-major order
    pub fn known_entries(&self) -> Vec<KnownRating> {
        self.known
            .indexed_iter()
            .filter(|(_, &k)| k)
            .map(|((user, item), _)| KnownRating {
                user,
                item,
                value: self.values[[user, item]],
            })
            .collect()
    }

    pub fn user_label(&self, user: usize) -> Option<&str> {
        self.user_labels.get(user).map(String::as_str)
    }

    pub fn item_label(&self, item: usize) -> Option<&str> {
        self.item_labels.get(item).map(String::as_str)
    }

    pub fn user_index(&self, label: &str) -> Option<usize> {
        self.user_labels.iter().position(|l| l == label)
    }

    pub fn item_index(&self, label: &str) -> Option<usize> {
        self.item_labels.iter().position(|l| l == label)
    }

    /// Hold out a seeded random fraction of the known ratings.
    ///
    /// Returns the training matrix (same shape and labels, held-out ratings
    /// removed) and the held-out ratings. Both sides must be non-empty.
    pub fn split_holdout(
        &self,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(RatingMatrix, Vec<KnownRating>)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(CollabError::invalid_config(
                format!("test_fraction must lie in (0, 1), got {}", test_fraction),
                "test_fraction",
            ));
        }

        let mut entries = self.known_entries();
        let mut rng = StdRng::seed_from_u64(seed);
        entries.shuffle(&mut rng);

        let n_test = ((entries.len() as f64) * test_fraction).round() as usize;
        if n_test == 0 || n_test == entries.len() {
            return Err(CollabError::InsufficientData(format!(
                "holding out {} of {} known ratings leaves an empty split",
                n_test,
                entries.len()
            )));
        }
        let held_out = entries.split_off(entries.len() - n_test);

        let mut train = self.clone();
        for rating in &held_out {
            train.known[[rating.user, rating.item]] = false;
            train.values[[rating.user, rating.item]] = 0.0;
        }

        tracing::debug!(
            train = train.n_known(),
            held_out = held_out.len(),
            "split rating matrix"
        );

        Ok((train, held_out))
    }

    pub(crate) fn check_user(&self, user: usize) -> Result<()> {
        bounds_check(MatrixAxis::User, user, self.n_users())
    }

    pub(crate) fn check_item(&self, item: usize) -> Result<()> {
        bounds_check(MatrixAxis::Item, item, self.n_items())
    }

    /// Rated value at a position already known to be in bounds
    pub(crate) fn rated(&self, user: usize, item: usize) -> Option<f64> {
        self.known[[user, item]].then(|| self.values[[user, item]])
    }
}

fn bounds_check(axis: MatrixAxis, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(CollabError::OutOfRange { axis, index, len });
    }
    Ok(())
}
