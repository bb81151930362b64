use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use tracing::info;

use evo_trader::artifact::{self, Artifact};
use evo_trader::config::Cli;
use evo_trader::evolve::Evolver;
use evo_trader::logging::setup_logging;
use evo_trader::{Harness, MarketSim, SeriesStore};

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let cfg = cli.resolve()?;

    let mut store = SeriesStore::open(&cfg.data_dir);
    let series = store
        .load(&cfg.pair)
        .with_context(|| format!("failed to load {}", cfg.pair))?;

    let starting_point = cfg.resolve_starting_point();
    let probe = MarketSim::new(
        Arc::clone(&series),
        cfg.sim_length,
        starting_point,
        cfg.starting_balance,
    )
    .with_context(|| format!("cannot place a {}-step episode on {}", cfg.sim_length, cfg.pair))?;

    info!(
        "pair={} rows={} features={} window={}..{} starting_point={:.4}",
        cfg.pair,
        series.len(),
        series.feature_count(),
        ts_to_utc(probe.timestamp()),
        ts_to_utc(series.timestamp(probe.end_index()).unwrap_or_default()),
        starting_point
    );

    let harness = Harness::new(
        Arc::clone(&series),
        cfg.eval_config(starting_point),
        cfg.workers,
    )?;
    info!(
        "generations={} population={} runs_per_candidate={} sim_length={} workers={}",
        cfg.generations,
        cfg.population_size,
        cfg.runs_per_candidate,
        cfg.sim_length,
        harness.workers()
    );

    let mut evolver = Evolver::new(cfg.evolve_config(series.observation_width()), cfg.seed);
    let outcome = evolver
        .run(cfg.generations, |population| harness.evaluate(population))
        .context("search finished without evaluating any candidate")?;

    let winner_fitness = outcome.best.fitness;
    let winner_id = outcome.best.id;
    let out = cfg.out.clone();
    let artifact = Artifact::new(cfg, starting_point, outcome.best, outcome.history);
    artifact::save(&out, &artifact)?;

    println!("\nSaved winner: {}", out.display());
    println!("Winner id={} fitness={:.6}", winner_id, winner_fitness);

    Ok(())
}

/// Timestamps above 1e11 are taken as milliseconds.
fn ts_to_utc(ts: i64) -> String {
    let secs = if ts.abs() > 100_000_000_000 { ts / 1000 } else { ts };
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
