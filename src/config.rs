//! Construction parameters for [`BiasScheduler`](crate::BiasScheduler) and
//! [`SeedStore`](crate::SeedStore).
//!
//! Both are plain structs with production defaults. The only environment-derived
//! inputs are the scheduler seed (`AURORA_SEED`) and the seed store path
//! (`AURORA_SEEDS_PATH`); everything else is passed explicitly.

use std::path::PathBuf;

use crate::ConfigError;

/// Environment variable overriding [`SchedulerConfig::seed`].
pub const SEED_ENV: &str = "AURORA_SEED";

/// Environment variable overriding [`SeedStoreConfig::path`].
pub const SEEDS_PATH_ENV: &str = "AURORA_SEEDS_PATH";

/// Seed used when `AURORA_SEED` is unset or unparseable.
pub const DEFAULT_SEED: u64 = 42;

/// Seed store location used when `AURORA_SEEDS_PATH` is unset.
pub const DEFAULT_SEEDS_PATH: &str = ".aurora/seeds.json";

/// Configuration for [`BiasScheduler`](crate::BiasScheduler).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Probability in `[0, 1]` of ignoring learned values and picking uniformly.
    pub epsilon: f64,
    /// Multiplicative factor in `(0, 1]` applied to every value once per tick.
    ///
    /// - `1.0` means no forgetting.
    pub decay: f64,
    /// Iterations a key must wait after its last reward before it is eligible
    /// for exploitation again. `0` disables cooldown.
    pub cooldown_iters: u64,
    /// Upper bound on how far one `reward()` can move a value.
    pub max_drift_per_iter: f64,
    /// Entries kept when pruning. Pruning triggers once the entry count
    /// exceeds `2 * top_k`.
    pub top_k: usize,
    /// Seed for the scheduler-owned RNG.
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.15,
            decay: 0.98,
            cooldown_iters: 5,
            max_drift_per_iter: 0.10,
            top_k: 10,
            seed: DEFAULT_SEED,
        }
    }
}

impl SchedulerConfig {
    /// Defaults, with `seed` taken from `AURORA_SEED` when set.
    pub fn from_env() -> Self {
        Self {
            seed: seed_from_var(std::env::var(SEED_ENV).ok()),
            ..Self::default()
        }
    }

    /// Reject out-of-range parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ConfigError::Epsilon(self.epsilon));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(ConfigError::Decay(self.decay));
        }
        if !(self.max_drift_per_iter.is_finite() && self.max_drift_per_iter > 0.0) {
            return Err(ConfigError::MaxDriftPerIter(self.max_drift_per_iter));
        }
        if self.top_k < 1 {
            return Err(ConfigError::TopK(self.top_k));
        }
        Ok(())
    }
}

/// Configuration for [`SeedStore`](crate::SeedStore).
#[derive(Debug, Clone, PartialEq)]
pub struct SeedStoreConfig {
    /// JSON file backing the store.
    pub path: PathBuf,
    /// EMA smoothing weight in `(0, 1)`; higher reacts faster to recent results.
    pub alpha: f64,
    /// Maximum absolute change allowed in one `update()`.
    pub drift_cap: f64,
    /// Number of records retained on save, by `|bias|`.
    pub top_n: usize,
}

impl Default for SeedStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SEEDS_PATH),
            alpha: 0.2,
            drift_cap: 0.15,
            top_n: 10,
        }
    }
}

impl SeedStoreConfig {
    /// Defaults at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Defaults, with `path` taken from `AURORA_SEEDS_PATH` when set.
    pub fn from_env() -> Self {
        match std::env::var(SEEDS_PATH_ENV) {
            Ok(p) if !p.trim().is_empty() => Self::at(p),
            _ => Self::default(),
        }
    }

    /// Reject out-of-range parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigError::Alpha(self.alpha));
        }
        if !(self.drift_cap.is_finite() && self.drift_cap > 0.0) {
            return Err(ConfigError::DriftCap(self.drift_cap));
        }
        if self.top_n < 1 {
            return Err(ConfigError::TopN(self.top_n));
        }
        Ok(())
    }
}

fn seed_from_var(raw: Option<String>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_SEED;
    };
    match raw.trim().parse::<u64>() {
        Ok(seed) => seed,
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "ignoring unparseable {}", SEED_ENV);
            DEFAULT_SEED
        }
    }
}
