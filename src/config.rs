use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::action::ACTION_WIDTH;
use crate::evolve::EvolveConfig;
use crate::harness::EvalConfig;

/// Everything that stays fixed for one search run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub data_dir: PathBuf,
    pub pair: String,
    pub generations: usize,
    pub population_size: usize,
    pub runs_per_candidate: usize,
    /// Steps per episode; one step is one row of the series.
    pub sim_length: usize,
    pub starting_balance: f64,
    /// Shared by every episode of the run. Drawn from `seed` when unset.
    pub starting_point: Option<f64>,
    pub seed: u64,
    pub workers: Option<usize>,
    pub hidden_units: usize,
    pub elite_count: usize,
    pub mutation_rate: f64,
    pub mutation_sigma: f64,
    pub crossover_rate: f64,
    pub out: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/sets"),
            pair: "BTCUSD".to_string(),
            generations: 3,
            population_size: 50,
            runs_per_candidate: 3,
            sim_length: 60,
            starting_balance: 1000.0,
            starting_point: None,
            seed: 42,
            workers: None,
            hidden_units: 8,
            elite_count: 2,
            mutation_rate: 0.1,
            mutation_sigma: 0.5,
            crossover_rate: 0.5,
            out: PathBuf::from("winner-rnn.json"),
        }
    }
}

impl SearchConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pair.trim().is_empty() {
            bail!("pair must not be empty");
        }
        if self.generations == 0 {
            bail!("generations must be >= 1");
        }
        if self.population_size == 0 {
            bail!("population_size must be >= 1");
        }
        if self.runs_per_candidate == 0 {
            bail!("runs_per_candidate must be >= 1");
        }
        if self.sim_length == 0 {
            bail!("sim_length must be >= 1");
        }
        if !(self.starting_balance.is_finite() && self.starting_balance > 0.0) {
            bail!("starting_balance must be > 0, got {}", self.starting_balance);
        }
        if let Some(p) = self.starting_point {
            if !(0.0..=1.0).contains(&p) {
                bail!("starting_point must be within [0, 1], got {p}");
            }
        }
        if self.workers == Some(0) {
            bail!("workers must be >= 1");
        }
        if self.hidden_units == 0 {
            bail!("hidden_units must be >= 1");
        }
        if self.elite_count > self.population_size {
            bail!(
                "elite_count ({}) exceeds population_size ({})",
                self.elite_count,
                self.population_size
            );
        }
        for (name, v) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} must be within [0, 1], got {v}");
            }
        }
        if !(self.mutation_sigma.is_finite() && self.mutation_sigma >= 0.0) {
            bail!("mutation_sigma must be >= 0, got {}", self.mutation_sigma);
        }
        Ok(())
    }

    /// The configured starting point, or one drawn deterministically from
    /// the seed.
    pub fn resolve_starting_point(&self) -> f64 {
        self.starting_point
            .unwrap_or_else(|| StdRng::seed_from_u64(self.seed).random::<f64>())
    }

    pub fn eval_config(&self, starting_point: f64) -> EvalConfig {
        EvalConfig {
            runs_per_candidate: self.runs_per_candidate,
            sim_length: self.sim_length,
            starting_balance: self.starting_balance,
            starting_point,
        }
    }

    pub fn evolve_config(&self, inputs: usize) -> EvolveConfig {
        EvolveConfig {
            population_size: self.population_size,
            elite_count: self.elite_count,
            mutation_rate: self.mutation_rate,
            mutation_sigma: self.mutation_sigma,
            crossover_rate: self.crossover_rate,
            inputs,
            hidden: self.hidden_units,
            outputs: ACTION_WIDTH,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Evolve recurrent trading controllers on historical candles")]
pub struct Cli {
    /// JSON file with a SearchConfig; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(long)]
    pub pair: Option<String>,
    #[arg(long)]
    pub generations: Option<usize>,
    #[arg(long)]
    pub population: Option<usize>,
    #[arg(long)]
    pub runs_per_net: Option<usize>,
    #[arg(long)]
    pub sim_length: Option<usize>,
    #[arg(long)]
    pub starting_balance: Option<f64>,
    #[arg(long)]
    pub starting_point: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub hidden: Option<usize>,
    #[arg(long)]
    pub out: Option<PathBuf>,
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Defaults, then the optional config file, then flags.
    pub fn resolve(&self) -> Result<SearchConfig> {
        let mut cfg = match &self.config {
            Some(path) => SearchConfig::from_file(path)?,
            None => SearchConfig::default(),
        };

        if let Some(v) = &self.data_dir {
            cfg.data_dir = v.clone();
        }
        if let Some(v) = &self.pair {
            cfg.pair = v.clone();
        }
        if let Some(v) = self.generations {
            cfg.generations = v;
        }
        if let Some(v) = self.population {
            cfg.population_size = v;
        }
        if let Some(v) = self.runs_per_net {
            cfg.runs_per_candidate = v;
        }
        if let Some(v) = self.sim_length {
            cfg.sim_length = v;
        }
        if let Some(v) = self.starting_balance {
            cfg.starting_balance = v;
        }
        if self.starting_point.is_some() {
            cfg.starting_point = self.starting_point;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if self.workers.is_some() {
            cfg.workers = self.workers;
        }
        if let Some(v) = self.hidden {
            cfg.hidden_units = v;
        }
        if let Some(v) = &self.out {
            cfg.out = v.clone();
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SearchConfig::default().validate().unwrap();
    }

    #[test]
    fn flags_override_file() {
        let path = std::env::temp_dir().join(format!("evo_trader_cfg_{}.json", std::process::id()));
        fs::write(&path, r#"{"pair": "ETHUSD", "sim_length": 120, "seed": 7}"#).unwrap();

        let cli = Cli::try_parse_from([
            "evo_trader",
            "--config",
            path.to_str().unwrap(),
            "--seed",
            "9",
            "--starting-point",
            "0.25",
        ])
        .unwrap();
        let cfg = cli.resolve().unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(cfg.pair, "ETHUSD");
        assert_eq!(cfg.sim_length, 120);
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.starting_point, Some(0.25));
        assert_eq!(cfg.runs_per_candidate, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            SearchConfig {
                runs_per_candidate: 0,
                ..Default::default()
            },
            SearchConfig {
                starting_point: Some(1.5),
                ..Default::default()
            },
            SearchConfig {
                starting_balance: 0.0,
                ..Default::default()
            },
            SearchConfig {
                elite_count: 100,
                ..Default::default()
            },
            SearchConfig {
                mutation_rate: -0.1,
                ..Default::default()
            },
            SearchConfig {
                workers: Some(0),
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }

    #[test]
    fn starting_point_is_fixed_by_seed() {
        let cfg = SearchConfig {
            seed: 123,
            ..Default::default()
        };
        let p = cfg.resolve_starting_point();
        assert!((0.0..1.0).contains(&p));
        assert_eq!(p, cfg.resolve_starting_point());

        let pinned = SearchConfig {
            starting_point: Some(0.75),
            ..cfg
        };
        assert_eq!(pinned.resolve_starting_point(), 0.75);
    }
}
