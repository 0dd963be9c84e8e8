//! Pinned production parameters and pre-deployment checks.
//!
//! The production scheduler and seed store run with fixed parameters. These
//! helpers compare a config against the pinned values, run a long synthetic
//! reward stream to confirm values stay bounded, and replay a call sequence to
//! confirm seeded determinism.

use crate::{BiasScheduler, SchedulerConfig, SeedStoreConfig};

/// Keys cycled through by [`ProductionProfile::soak_drift`].
const SOAK_KEYS: usize = 10;

/// Reward magnitude used by the soak; far above what the drift cap admits.
const SOAK_MAGNITUDE: f64 = 10.0;

/// Pinned parameters plus the bounds they are checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionProfile {
    pub scheduler: SchedulerConfig,
    pub seeds: SeedStoreConfig,
    /// Largest `|value|` any scheduler entry may reach during the soak.
    pub max_abs_bias: f64,
    /// History length callers should trim to (see [`BiasScheduler::trim_history`]).
    pub max_history: usize,
}

/// A config field that differs from the pinned profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileMismatch {
    pub field: &'static str,
    pub expected: f64,
    pub actual: f64,
}

/// An entry whose value left `[-max_abs_bias, max_abs_bias]` during a soak.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundViolation {
    pub key: String,
    pub value: f64,
}

impl ProductionProfile {
    /// The pinned profile; the scheduler seed still honors `AURORA_SEED`.
    pub fn pinned() -> Self {
        Self {
            scheduler: SchedulerConfig::from_env(),
            seeds: SeedStoreConfig::default(),
            max_abs_bias: 1.0,
            max_history: 10_000,
        }
    }

    /// Fields of `cfg` that differ from the pinned scheduler parameters.
    ///
    /// The seed is not compared.
    pub fn check_scheduler(&self, cfg: &SchedulerConfig) -> Vec<ProfileMismatch> {
        let want = &self.scheduler;
        let mut out = Vec::new();
        push_if_differs(&mut out, "epsilon", want.epsilon, cfg.epsilon);
        push_if_differs(&mut out, "decay", want.decay, cfg.decay);
        push_if_differs(
            &mut out,
            "cooldown_iters",
            want.cooldown_iters as f64,
            cfg.cooldown_iters as f64,
        );
        push_if_differs(
            &mut out,
            "max_drift_per_iter",
            want.max_drift_per_iter,
            cfg.max_drift_per_iter,
        );
        push_if_differs(&mut out, "top_k", want.top_k as f64, cfg.top_k as f64);
        out
    }

    /// Fields of `cfg` that differ from the pinned seed store parameters.
    ///
    /// The path is not compared.
    pub fn check_seeds(&self, cfg: &SeedStoreConfig) -> Vec<ProfileMismatch> {
        let want = &self.seeds;
        let mut out = Vec::new();
        push_if_differs(&mut out, "alpha", want.alpha, cfg.alpha);
        push_if_differs(&mut out, "drift_cap", want.drift_cap, cfg.drift_cap);
        push_if_differs(&mut out, "top_n", want.top_n as f64, cfg.top_n as f64);
        out
    }

    /// Drive a pinned scheduler for `iterations` rounds and report entries that
    /// end up outside `±max_abs_bias`.
    ///
    /// Round `i` rewards key `i % 10` with magnitude 10, succeeding on even
    /// rounds, then ticks.
    pub fn soak_drift(&self, iterations: usize) -> Vec<BoundViolation> {
        let mut sched = match BiasScheduler::new(self.scheduler) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "pinned scheduler config is invalid");
                return Vec::new();
            }
        };
        for i in 0..iterations {
            let key = format!("soak_{}", i % SOAK_KEYS);
            sched.reward(&key, i % 2 == 0, SOAK_MAGNITUDE);
            sched.tick();
        }
        sched
            .entries()
            .filter(|e| e.value.abs() > self.max_abs_bias)
            .map(|e| BoundViolation {
                key: e.key.clone(),
                value: e.value,
            })
            .collect()
    }
}

fn push_if_differs(out: &mut Vec<ProfileMismatch>, field: &'static str, expected: f64, actual: f64) {
    if expected != actual {
        out.push(ProfileMismatch {
            field,
            expected,
            actual,
        });
    }
}

/// Replay the same `rounds`-long call sequence on two default-configured
/// schedulers seeded with `seed` and check that their choices and final
/// `dump()` agree.
pub fn replay_is_deterministic(seed: u64, rounds: usize) -> bool {
    let cfg = SchedulerConfig {
        seed,
        ..SchedulerConfig::default()
    };
    let (Ok(mut a), Ok(mut b)) = (BiasScheduler::new(cfg), BiasScheduler::new(cfg)) else {
        return false;
    };
    let candidates: Vec<String> = (0..SOAK_KEYS).map(|i| format!("key_{i}")).collect();
    for i in 0..rounds {
        let ca = a.choose(&candidates);
        let cb = b.choose(&candidates);
        if ca != cb {
            return false;
        }
        let magnitude = 0.5 + (i % 3) as f64 * 0.25;
        a.reward(&ca, i % 2 == 0, magnitude);
        b.reward(&cb, i % 2 == 0, magnitude);
        a.tick();
        b.tick();
    }
    a.dump() == b.dump()
}
