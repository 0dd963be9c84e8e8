//! Disk-persisted seed biases with EMA updates and a drift cap.
//!
//! A seed key identifies one logical synthesis target (see [`make_seed_key`]).
//! Each key carries a bias in `[-1, 1]` that moves toward recent outcomes by an
//! exponential moving average, never more than `drift_cap` per update.
//!
//! ## File format
//!
//! One JSON document, keys sorted, 2-space indent:
//!
//! ```text
//! {
//!   "biases": { "<16-hex key>": <f64>, ... },
//!   "metadata": {
//!     "config": { "alpha": .., "drift_cap": .., "top_n": .. },
//!     "created": <unix seconds | null>,
//!     "total_updates": <u64>,
//!     "updated": <unix seconds | null>
//!   }
//! }
//! ```
//!
//! Saves write `<path>.tmp` and rename it over `<path>`, so readers never see
//! a half-written file. Concurrent writers from several processes still race
//! (last rename wins).
//!
//! Loading never fails: a missing, unreadable or corrupt file leaves the store
//! empty and logs a warning. Saving propagates I/O errors.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{SeedStoreConfig, StoreError};

/// Number of entries reported in [`SeedSummary::top_biases`].
const SUMMARY_TOP: usize = 5;

/// Result of one synthesis attempt, as fed to [`SeedStore::update`].
///
/// Missing fields deserialize to an empty key, a neutral score and failure.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SynthesisOutcome {
    #[serde(default)]
    pub seed_key: String,
    /// Quality in `[0, 1]`.
    #[serde(default = "neutral_score")]
    pub score: f64,
    #[serde(default)]
    pub success: bool,
}

fn neutral_score() -> f64 {
    0.5
}

impl SynthesisOutcome {
    pub fn new(seed_key: impl Into<String>, score: f64, success: bool) -> Self {
        Self {
            seed_key: seed_key.into(),
            score,
            success,
        }
    }
}

/// Store parameters as recorded in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeedConfigSnapshot {
    pub alpha: f64,
    pub drift_cap: f64,
    pub top_n: usize,
}

impl From<&SeedStoreConfig> for SeedConfigSnapshot {
    fn from(cfg: &SeedStoreConfig) -> Self {
        Self {
            alpha: cfg.alpha,
            drift_cap: cfg.drift_cap,
            top_n: cfg.top_n,
        }
    }
}

// Field order is alphabetical so the serialized JSON is key-sorted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeedMetadata {
    #[serde(default)]
    pub config: SeedConfigSnapshot,
    /// Unix seconds at first creation.
    #[serde(default)]
    pub created: Option<f64>,
    #[serde(default)]
    pub total_updates: u64,
    /// Unix seconds at the last save.
    #[serde(default)]
    pub updated: Option<f64>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SeedFile {
    #[serde(default)]
    biases: BTreeMap<String, f64>,
    #[serde(default)]
    metadata: Option<SeedMetadata>,
}

/// Aggregate view of the store.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeedSummary {
    pub total_seeds: usize,
    pub avg_bias: f64,
    pub max_bias: f64,
    pub min_bias: f64,
    pub total_updates: u64,
    pub config: SeedConfigSnapshot,
    pub top_biases: Vec<(String, f64)>,
}

/// Deterministic 16-hex-character key for a `(signature, context)` pair.
///
/// The first 8 bytes of `sha256("{func_signature}:{context}")`, lowercase hex.
#[must_use]
pub fn make_seed_key(func_signature: &str, context: &str) -> String {
    let digest = Sha256::digest(format!("{func_signature}:{context}").as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Persistent key -> bias map.
#[derive(Debug, Clone)]
pub struct SeedStore {
    cfg: SeedStoreConfig,
    biases: BTreeMap<String, f64>,
    metadata: SeedMetadata,
}

impl SeedStore {
    /// Validate `cfg` and load the store from `cfg.path`.
    ///
    /// If the file does not exist yet it is created immediately (empty), so
    /// later runs find it; an error from that first write is returned.
    pub fn open(cfg: SeedStoreConfig) -> Result<Self, StoreError> {
        cfg.validate()?;
        let metadata = SeedMetadata {
            config: SeedConfigSnapshot::from(&cfg),
            created: None,
            total_updates: 0,
            updated: None,
        };
        let mut store = Self {
            cfg,
            biases: BTreeMap::new(),
            metadata,
        };
        if store.cfg.path.exists() {
            store.load();
        } else {
            store.metadata.created = Some(unix_now());
            store.save()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.cfg.path
    }

    pub fn config(&self) -> &SeedStoreConfig {
        &self.cfg
    }

    pub fn metadata(&self) -> &SeedMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.biases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biases.is_empty()
    }

    /// Re-read the backing file.
    ///
    /// On any read or parse failure the bias map is emptied and a warning is
    /// logged; metadata from before the call is kept. The live config always
    /// overrides the config recorded in the file.
    pub fn load(&mut self) {
        match read_seed_file(&self.cfg.path) {
            Ok(file) => {
                self.biases = file
                    .biases
                    .into_iter()
                    .filter(|(k, v)| !k.is_empty() && v.is_finite())
                    .map(|(k, v)| (k, v.clamp(-1.0, 1.0)))
                    .collect();
                if let Some(meta) = file.metadata {
                    self.metadata = meta;
                }
                tracing::debug!(
                    path = %self.cfg.path.display(),
                    seeds = self.biases.len(),
                    "loaded seed store"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.cfg.path.display(),
                    error = %e,
                    "could not load seed store; starting empty"
                );
                self.biases.clear();
            }
        }
        self.metadata.config = SeedConfigSnapshot::from(&self.cfg);
    }

    /// Keep the `top_n` largest `|bias|` entries and write the store to disk.
    pub fn save(&mut self) -> Result<(), StoreError> {
        if self.biases.len() > self.cfg.top_n {
            let kept: BTreeMap<String, f64> = self.top(self.cfg.top_n).into_iter().collect();
            self.biases = kept;
        }
        self.metadata.updated = Some(unix_now());

        let file = SeedFile {
            biases: self.biases.clone(),
            metadata: Some(self.metadata.clone()),
        };
        let mut json = serde_json::to_string_pretty(&file)?;
        json.push('\n');
        write_atomic(&self.cfg.path, json.as_bytes())?;
        tracing::debug!(
            path = %self.cfg.path.display(),
            seeds = self.biases.len(),
            "saved seed store"
        );
        Ok(())
    }

    /// Bias for `seed_key` (`0.0` if unknown).
    pub fn get_bias(&self, seed_key: &str) -> f64 {
        self.biases.get(seed_key).copied().unwrap_or(0.0)
    }

    /// A copy of every bias.
    pub fn get_biases(&self) -> BTreeMap<String, f64> {
        self.biases.clone()
    }

    /// Fold one synthesis outcome into its key's bias.
    ///
    /// - target: `(score - 0.5) + 0.1` on success, `- 0.1` on failure
    /// - EMA: `(1 - alpha) * current + alpha * target`
    /// - the step is clamped to `±drift_cap`, the result to `[-1, 1]`
    ///
    /// Empty keys are ignored. Does not save.
    pub fn update(&mut self, outcome: &SynthesisOutcome) {
        if outcome.seed_key.is_empty() {
            return;
        }
        let score = if outcome.score.is_nan() {
            0.5
        } else {
            outcome.score.clamp(0.0, 1.0)
        };
        let target = (score - 0.5) + if outcome.success { 0.1 } else { -0.1 };

        let current = self.get_bias(&outcome.seed_key);
        let alpha = self.cfg.alpha;
        let mut updated = (1.0 - alpha) * current + alpha * target;

        let drift = updated - current;
        if drift.abs() > self.cfg.drift_cap {
            updated = current + self.cfg.drift_cap.copysign(drift);
        }
        let updated = updated.clamp(-1.0, 1.0);

        self.biases.insert(outcome.seed_key.clone(), updated);
        self.metadata.total_updates = self.metadata.total_updates.saturating_add(1);
    }

    /// See [`make_seed_key`].
    pub fn make_seed_key(&self, func_signature: &str, context: &str) -> String {
        make_seed_key(func_signature, context)
    }

    /// Up to `n` (default `top_n`) entries by `|bias|` descending.
    pub fn get_top_biases(&self, n: Option<usize>) -> Vec<(String, f64)> {
        self.top(n.unwrap_or(self.cfg.top_n))
    }

    fn top(&self, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(&String, f64)> = self.biases.iter().map(|(k, v)| (k, *v)).collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked
            .into_iter()
            .take(n)
            .map(|(k, v)| (k.clone(), v))
            .collect()
    }

    pub fn get_summary(&self) -> SeedSummary {
        let n = self.biases.len();
        let (sum, max, min) = self.biases.values().fold(
            (0.0, f64::NEG_INFINITY, f64::INFINITY),
            |(s, hi, lo), &v| (s + v, hi.max(v), lo.min(v)),
        );
        let (avg_bias, max_bias, min_bias) = if n == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (sum / n as f64, max, min)
        };
        SeedSummary {
            total_seeds: n,
            avg_bias,
            max_bias,
            min_bias,
            total_updates: self.metadata.total_updates,
            config: self.metadata.config,
            top_biases: self.top(SUMMARY_TOP),
        }
    }

    /// Clear every bias, zero the update counter and save.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.biases.clear();
        self.metadata.total_updates = 0;
        self.save()
    }
}

fn read_seed_file(path: &Path) -> Result<SeedFile, StoreError> {
    let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    }
    let tmp = tmp_path(path);
    let mut f = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    f.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
    f.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    drop(f);
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
