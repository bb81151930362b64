use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Context;
use rayon::prelude::*;
use tracing::{debug, error, warn};

use crate::action::decode;
use crate::controller::{Controller, Genome};
use crate::error::{Result, SimError};
use crate::series::Series;
use crate::sim::MarketSim;

/// Score given to a run that could not be completed.
pub const WORST_FITNESS: f64 = -1e12;

pub type CandidateId = u64;

/// Per-search evaluation parameters, fixed for every generation.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalConfig {
    pub runs_per_candidate: usize,
    pub sim_length: usize,
    pub starting_balance: f64,
    pub starting_point: f64,
}

/// Scores candidates by running them through episodes of one series.
pub struct Harness {
    series: Arc<Series>,
    cfg: EvalConfig,
    pool: rayon::ThreadPool,
}

/// Hardware parallelism minus one thread for the orchestrator, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Worst-of-N: a candidate is only as good as its worst run.
pub fn aggregate(run_fitnesses: &[f64]) -> f64 {
    let worst = run_fitnesses.iter().copied().fold(f64::INFINITY, f64::min);
    if worst.is_finite() { worst } else { WORST_FITNESS }
}

impl Harness {
    pub fn new(
        series: Arc<Series>,
        cfg: EvalConfig,
        workers: Option<usize>,
    ) -> anyhow::Result<Self> {
        let threads = workers.unwrap_or_else(default_workers).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("eval-{i}"))
            .build()
            .context("failed to create evaluation thread pool")?;
        debug!(threads, pair = series.pair(), "harness ready");
        Ok(Self { series, cfg, pool })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.cfg
    }

    pub fn series(&self) -> &Arc<Series> {
        &self.series
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Drives one fresh episode to completion and returns the last fitness
    /// recorded before it ended.
    ///
    /// The run is abandoned as soon as the controller is out of the market
    /// with at most half its starting balance left; the fitness from the step
    /// before that is reported.
    pub fn run_episode<C: Controller + ?Sized>(&self, controller: &mut C) -> Result<f64> {
        let mut sim = MarketSim::new(
            Arc::clone(&self.series),
            self.cfg.sim_length,
            self.cfg.starting_point,
            self.cfg.starting_balance,
        )?;
        controller.reset();

        let bankrupt_at = self.cfg.starting_balance / 2.0;
        let mut fitness = sim.fitness()?;

        while !sim.is_done() {
            let obs = sim.observation()?;
            let action = controller.activate(&obs);
            let trade = decode(&action)?;
            sim.step(trade)?;

            if sim.balance() <= bankrupt_at && sim.holding() == 0.0 {
                debug!(
                    step = sim.step_count(),
                    balance = sim.balance(),
                    "run abandoned"
                );
                break;
            }
            fitness = sim.fitness()?;
        }
        Ok(fitness)
    }

    /// Runs `controller` through every configured episode and keeps the
    /// worst result. Failed runs score [`WORST_FITNESS`].
    pub fn evaluate_controller<C: Controller + ?Sized>(&self, controller: &mut C) -> f64 {
        let runs: Vec<f64> = (0..self.cfg.runs_per_candidate)
            .map(|run| match self.run_episode(&mut *controller) {
                Ok(f) => f,
                Err(e) => {
                    match &e {
                        SimError::InsufficientHistory { .. } => error!(run, "episode failed: {e}"),
                        _ => warn!(run, "episode failed: {e}"),
                    }
                    WORST_FITNESS
                }
            })
            .collect();
        aggregate(&runs)
    }

    /// Scores a whole population on the worker pool. Every worker builds its
    /// own controller; results are keyed by candidate id regardless of
    /// completion order.
    pub fn evaluate<G: Genome>(
        &self,
        population: &[(CandidateId, G)],
    ) -> BTreeMap<CandidateId, f64> {
        let scores: Vec<f64> = self.pool.install(|| {
            population
                .par_iter()
                .map(|(_, genome)| {
                    let mut net = genome.build();
                    self.evaluate_controller(&mut net)
                })
                .collect()
        });

        population.iter().map(|(id, _)| *id).zip(scores).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_takes_strict_minimum() {
        assert_eq!(aggregate(&[0.10, -0.05, 0.20]), -0.05);
        assert_eq!(aggregate(&[0.3]), 0.3);
    }

    #[test]
    fn empty_aggregate_is_worst() {
        assert_eq!(aggregate(&[]), WORST_FITNESS);
    }

    #[test]
    fn default_workers_leaves_headroom() {
        let n = default_workers();
        assert!(n >= 1);
        if let Ok(hw) = std::thread::available_parallelism() {
            if hw.get() > 1 {
                assert_eq!(n, hw.get() - 1);
            }
        }
    }
}
