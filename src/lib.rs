//! `aurora-bias`: seeded exploration bias for repeated synthesis attempts.
//!
//! Designed for loops that repeatedly pick one candidate among a few named
//! options (strategies, seeds, snippets) and learn afterwards whether the
//! pick worked. Two independent pieces:
//!
//! - [`BiasScheduler`]: in-memory epsilon-greedy selection. Per-key values
//!   decay every round, move at most `max_drift_per_iter` per reward, and a key
//!   that was just used cools down before it can be exploited again.
//! - [`SeedStore`]: a small JSON file mapping seed keys to a bias in `[-1, 1]`,
//!   updated by an exponential moving average with a per-update drift cap, so
//!   learning survives restarts.
//!
//! [`LearningContext`] owns one of each and does the usual wiring: seed the
//! scheduler from the store at startup, feed each outcome to both, checkpoint
//! the store when asked.
//!
//! **Goals:**
//! - **Deterministic**: the scheduler's RNG is owned and seeded; the same seed
//!   and the same calls give the same choices and state.
//! - **Bounded**: every update is drift-capped; scheduler state is pruned to
//!   the most influential keys; the store keeps only its top-N seeds.
//! - **Available**: a missing or corrupt seed file degrades to an empty store
//!   with a warning rather than an error.
//!
//! **Non-goals:**
//! - Not a general RL / bandit library; no regret guarantees.
//! - No background scheduling: callers call [`BiasScheduler::tick`] once per round.
//! - No coordination between processes writing the same seed file.
//!
//! ```rust
//! use aurora_bias::{BiasScheduler, SchedulerConfig};
//!
//! let cfg = SchedulerConfig { epsilon: 0.0, cooldown_iters: 0, ..SchedulerConfig::default() };
//! let mut sched = BiasScheduler::new(cfg).unwrap();
//! sched.load([("fast", 0.4), ("safe", 0.1)]);
//!
//! let pick = sched.choose(&["fast", "safe"]);
//! assert_eq!(pick, "fast");
//! sched.reward(&pick, false, 1.0);
//! sched.tick();
//! ```

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod config;
pub use config::*;

mod sparkline;
pub use sparkline::*;

mod scheduler;
pub use scheduler::*;

mod seeds;
pub use seeds::*;

mod context;
pub use context::*;

pub mod profile;
pub use profile::{replay_is_deterministic, ProductionProfile};
