//! Simulated synthesis loop: pick a strategy per target, learn from the
//! outcome, checkpoint the seed store at the end.
//!
//! Run with `RUST_LOG=debug` to see store loads/saves and prunes.

use aurora_bias::{LearningContext, SchedulerConfig, SeedStoreConfig, SynthesisOutcome};
use tracing_subscriber::EnvFilter;

const STRATEGIES: [&str; 4] = ["template", "corpus", "beam", "fallback"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let dir = std::env::temp_dir().join("aurora-bias-demo");
    let mut ctx = LearningContext::open(
        SchedulerConfig::from_env(),
        SeedStoreConfig::at(dir.join("seeds.json")),
    )?;

    let targets = [
        ("add(a: int, b: int) -> int", "Add two numbers"),
        ("reverse(s: str) -> str", "Reverse a string"),
        ("fib(n: int) -> int", "Nth Fibonacci number"),
    ];

    for round in 0..60 {
        let (sig, ctx_text) = targets[round % targets.len()];
        let strategy = ctx.choose_and_tick(&STRATEGIES);

        // Toy environment: "corpus" works best, "fallback" rarely works.
        let score = match strategy.as_str() {
            "corpus" => 0.9,
            "beam" => 0.6,
            "template" => 0.4,
            _ => 0.1,
        };
        let success = score >= 0.5;
        ctx.scheduler_mut().reward(&strategy, success, score);

        let key = ctx.seed_key(sig, ctx_text);
        ctx.store_mut()
            .update(&SynthesisOutcome::new(key, score, success));
    }

    ctx.checkpoint()?;

    let stats = ctx.stats();
    println!("iteration {}", stats.iteration);
    for (strategy, value) in &stats.summary {
        println!(
            "{strategy:>10} {value:+.4} {}",
            ctx.scheduler().sparkline(strategy, 16)
        );
    }
    let summary = ctx.store().get_summary();
    println!(
        "seeds: {} (avg bias {:+.4}) -> {}",
        summary.total_seeds,
        summary.avg_bias,
        ctx.store().path().display()
    );
    Ok(())
}
