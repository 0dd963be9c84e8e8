//! One owner for the scheduler and the seed store.
//!
//! Construct a [`LearningContext`] once at startup and pass it (or `&mut` to it)
//! to whatever makes decisions. There is no process-wide instance: tests build
//! their own context on a temporary path.

use std::collections::BTreeMap;

use crate::{
    make_seed_key, BiasScheduler, HistoryPoint, SchedulerConfig, SeedStore, SeedStoreConfig,
    StoreError, SynthesisOutcome,
};

/// Payload for a stats endpoint: `summary()` plus the current iteration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdaptiveStats {
    pub summary: BTreeMap<String, f64>,
    pub iteration: u64,
}

/// Payload for a history endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdaptiveHistory {
    pub history: Vec<HistoryPoint>,
}

/// Scheduler plus seed store, wired the way a synthesis loop uses them.
#[derive(Debug)]
pub struct LearningContext {
    scheduler: BiasScheduler,
    store: SeedStore,
}

impl LearningContext {
    /// Open the store and build a scheduler seeded with the persisted biases.
    pub fn open(
        scheduler_cfg: SchedulerConfig,
        store_cfg: SeedStoreConfig,
    ) -> Result<Self, StoreError> {
        // Validate before the store touches disk.
        let mut scheduler = BiasScheduler::new(scheduler_cfg)?;
        let store = SeedStore::open(store_cfg)?;
        scheduler.load(store.get_biases());
        tracing::info!(
            path = %store.path().display(),
            seeds = store.len(),
            seed = scheduler_cfg.seed,
            "learning context ready"
        );
        Ok(Self { scheduler, store })
    }

    /// [`open`](Self::open) with both configs taken from defaults and the
    /// `AURORA_SEED` / `AURORA_SEEDS_PATH` overrides.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::open(SchedulerConfig::from_env(), SeedStoreConfig::from_env())
    }

    pub fn scheduler(&self) -> &BiasScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut BiasScheduler {
        &mut self.scheduler
    }

    pub fn store(&self) -> &SeedStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SeedStore {
        &mut self.store
    }

    /// See [`make_seed_key`].
    pub fn seed_key(&self, func_signature: &str, context: &str) -> String {
        make_seed_key(func_signature, context)
    }

    /// One decision round: choose among `candidates`, then advance the scheduler.
    ///
    /// Returns the empty string when `candidates` is empty; no round happens
    /// then, so values and cooldowns are left untouched.
    pub fn choose_and_tick<S: AsRef<str>>(&mut self, candidates: &[S]) -> String {
        if candidates.is_empty() {
            return String::new();
        }
        let chosen = self.scheduler.choose(candidates);
        self.scheduler.tick();
        chosen
    }

    /// Feed one outcome to both components.
    ///
    /// The store folds it into its EMA; the scheduler is rewarded with the
    /// score as magnitude. Neither is saved.
    pub fn record_outcome(&mut self, outcome: &SynthesisOutcome) {
        if outcome.seed_key.is_empty() {
            return;
        }
        self.store.update(outcome);
        self.scheduler
            .reward(&outcome.seed_key, outcome.success, outcome.score);
    }

    /// Persist the seed store.
    pub fn checkpoint(&mut self) -> Result<(), StoreError> {
        self.store.save()
    }

    pub fn stats(&self) -> AdaptiveStats {
        AdaptiveStats {
            summary: self.scheduler.summary(),
            iteration: self.scheduler.iteration(),
        }
    }

    pub fn history(&self) -> AdaptiveHistory {
        AdaptiveHistory {
            history: self.scheduler.history().to_vec(),
        }
    }
}
