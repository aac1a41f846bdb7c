//! Engine configuration
//!
//! Configuration can be loaded two ways:
//!
//! - `CollabConfig::load()` layers defaults < optional `config/collab.{toml,yaml,json}`
//!   file < `COLLAB_*` environment variables through the `config` crate
//! - `ConfigLoader::from_env()` reads `COLLAB_*` variables directly with typed
//!   parsing and per-field defaults
//!
//! Either way the result must pass `validate()` before use.
//!
//! # Environment Variables
//!
//! - `COLLAB_METRIC`: `cosine` or `pearson` (default: cosine)
//! - `COLLAB_K_NEIGHBORS`: neighbors per prediction (default: 2)
//! - `COLLAB_LATENT_DIM`: latent factors K (default: 2)
//! - `COLLAB_LEARNING_RATE`: SGD step size (default: 0.01)
//! - `COLLAB_REGULARIZATION`: L2 penalty (default: 0.02)
//! - `COLLAB_EPOCHS`: SGD epochs (default: 5000)
//! - `COLLAB_SEED`: RNG seed (default: 42)
//! - `COLLAB_INIT_SCALE`: factor initialisation range (default: 0.1)
//! - `COLLAB_MIN_LOSS_DELTA`: early-stopping loss delta (optional)
//! - `COLLAB_MAX_TRAINING_MS`: training wall-clock budget (optional)
//! - `COLLAB_RATING_MIN` / `COLLAB_RATING_MAX`: rating scale (default: 1 / 5)
//! - `COLLAB_CLAMP_PREDICTIONS`: clamp surfaces into the scale (default: true)
//! - `COLLAB_LOG_FILTER`, `COLLAB_LOG_FORMAT`: logging (default: info, pretty)

use crate::error::{CollabError, Result};
use crate::matrix_factorization::SgdConfig;
use crate::observability::{LogConfig, LogFormat};
use crate::similarity::SimilarityMetric;
use crate::store::RatingScale;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENV_PREFIX: &str = "COLLAB";

/// Configuration loader trait
///
/// Standardized loading and validation from environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from `COLLAB_*` environment variables, using
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if a variable cannot be parsed.
    fn from_env() -> Result<Self>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the offending key.
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    pub metric: SimilarityMetric,
    pub k_neighbors: usize,
    pub latent_dim: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    pub epochs: usize,
    pub seed: u64,
    pub init_scale: f64,
    pub min_loss_delta: Option<f64>,
    pub max_training_ms: Option<u64>,
    pub rating_min: f64,
    pub rating_max: f64,
    pub clamp_predictions: bool,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for CollabConfig {
    fn default() -> Self {
        let sgd = SgdConfig::default();
        let scale = RatingScale::default();
        Self {
            metric: SimilarityMetric::Cosine,
            k_neighbors: 2,
            latent_dim: sgd.latent_dim,
            learning_rate: sgd.learning_rate,
            regularization: sgd.regularization,
            epochs: sgd.epochs,
            seed: sgd.seed,
            init_scale: sgd.init_scale,
            min_loss_delta: None,
            max_training_ms: None,
            rating_min: scale.min,
            rating_max: scale.max,
            clamp_predictions: true,
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl CollabConfig {
    /// Load configuration from an optional config file and the environment
    pub fn load() -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name("config/collab").required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn sgd_config(&self) -> SgdConfig {
        SgdConfig {
            latent_dim: self.latent_dim,
            learning_rate: self.learning_rate,
            regularization: self.regularization,
            epochs: self.epochs,
            seed: self.seed,
            init_scale: self.init_scale,
            min_loss_delta: self.min_loss_delta,
            max_training_time: self.max_training_ms.map(Duration::from_millis),
        }
    }

    pub fn rating_scale(&self) -> Result<RatingScale> {
        RatingScale::new(self.rating_min, self.rating_max)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            filter: self.log_filter.clone(),
            format: self.log_format,
        }
    }
}

impl ConfigLoader for CollabConfig {
    fn from_env() -> Result<Self> {
        let defaults = CollabConfig::default();

        Ok(Self {
            metric: parse_env_var("COLLAB_METRIC", defaults.metric)?,
            k_neighbors: parse_env_var("COLLAB_K_NEIGHBORS", defaults.k_neighbors)?,
            latent_dim: parse_env_var("COLLAB_LATENT_DIM", defaults.latent_dim)?,
            learning_rate: parse_env_var("COLLAB_LEARNING_RATE", defaults.learning_rate)?,
            regularization: parse_env_var("COLLAB_REGULARIZATION", defaults.regularization)?,
            epochs: parse_env_var("COLLAB_EPOCHS", defaults.epochs)?,
            seed: parse_env_var("COLLAB_SEED", defaults.seed)?,
            init_scale: parse_env_var("COLLAB_INIT_SCALE", defaults.init_scale)?,
            min_loss_delta: parse_optional_env_var("COLLAB_MIN_LOSS_DELTA")?,
            max_training_ms: parse_optional_env_var("COLLAB_MAX_TRAINING_MS")?,
            rating_min: parse_env_var("COLLAB_RATING_MIN", defaults.rating_min)?,
            rating_max: parse_env_var("COLLAB_RATING_MAX", defaults.rating_max)?,
            clamp_predictions: parse_env_var(
                "COLLAB_CLAMP_PREDICTIONS",
                defaults.clamp_predictions,
            )?,
            log_filter: std::env::var("COLLAB_LOG_FILTER").unwrap_or(defaults.log_filter),
            log_format: match std::env::var("COLLAB_LOG_FORMAT").ok().as_deref() {
                None => defaults.log_format,
                Some("json") => LogFormat::Json,
                Some("pretty") => LogFormat::Pretty,
                Some(other) => {
                    return Err(CollabError::invalid_config(
                        format!("Invalid log format '{}', expected json or pretty", other),
                        "COLLAB_LOG_FORMAT",
                    ))
                }
            },
        })
    }

    fn validate(&self) -> Result<()> {
        if self.k_neighbors == 0 {
            return Err(CollabError::invalid_config(
                "k_neighbors must be greater than 0",
                "k_neighbors",
            ));
        }

        self.sgd_config().validate()?;

        if let Some(0) = self.max_training_ms {
            return Err(CollabError::invalid_config(
                "max_training_ms must be greater than 0",
                "max_training_ms",
            ));
        }

        self.rating_scale()?;
        Ok(())
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| CollabError::invalid_config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

fn parse_optional_env_var<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| CollabError::invalid_config(format!("Failed to parse {}: {}", key, e), key))
        })
        .transpose()
}

/// Load .env file if present
///
/// Does not return an error if the .env file is not found.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }
}
