use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::NetGenome;
use crate::harness::{CandidateId, WORST_FITNESS};

const WEIGHT_LIMIT: f64 = 30.0;

#[derive(Clone, Debug, PartialEq)]
pub struct EvolveConfig {
    pub population_size: usize,
    pub elite_count: usize,
    pub mutation_rate: f64,
    pub mutation_sigma: f64,
    pub crossover_rate: f64,
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best_id: CandidateId,
    pub best: f64,
    pub mean: f64,
    pub worst: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub id: CandidateId,
    pub fitness: f64,
    pub genome: NetGenome,
}

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub best: Scored,
    pub history: Vec<GenerationStats>,
}

/// Generational search over recurrent-network weights.
///
/// Fitness comes from the caller, once per generation; the evolver only
/// ranks and breeds.
pub struct Evolver {
    cfg: EvolveConfig,
    rng: StdRng,
    population: Vec<(CandidateId, NetGenome)>,
    next_id: CandidateId,
}

impl Evolver {
    pub fn new(cfg: EvolveConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let population: Vec<(CandidateId, NetGenome)> = (0..cfg.population_size)
            .map(|i| {
                (
                    i as CandidateId,
                    NetGenome::random(cfg.inputs, cfg.hidden, cfg.outputs, &mut rng),
                )
            })
            .collect();
        let next_id = population.len() as CandidateId;
        Self {
            cfg,
            rng,
            population,
            next_id,
        }
    }

    pub fn population(&self) -> &[(CandidateId, NetGenome)] {
        &self.population
    }

    /// Runs `generations` rounds. `evaluate` is called exactly once per
    /// generation; candidates missing from its result score
    /// [`WORST_FITNESS`].
    pub fn run<F>(&mut self, generations: usize, mut evaluate: F) -> Option<SearchOutcome>
    where
        F: FnMut(&[(CandidateId, NetGenome)]) -> BTreeMap<CandidateId, f64>,
    {
        let mut best: Option<Scored> = None;
        let mut history = Vec::with_capacity(generations);

        for generation in 1..=generations {
            if self.population.is_empty() {
                break;
            }
            let scores = evaluate(&self.population);
            let ranked = rank(&self.population, &scores);

            let stats = summarize(generation, &ranked);
            info!(
                "[generation {}/{}] best={:.4} (id {}) mean={:.4} worst={:.4}",
                generation, generations, stats.best, stats.best_id, stats.mean, stats.worst
            );
            history.push(stats);

            if best
                .as_ref()
                .map(|b| ranked[0].fitness > b.fitness)
                .unwrap_or(true)
            {
                best = Some(ranked[0].clone());
            }

            if generation < generations {
                self.population = self.breed(&ranked);
            }
        }

        best.map(|best| SearchOutcome { best, history })
    }

    fn breed(&mut self, ranked: &[Scored]) -> Vec<(CandidateId, NetGenome)> {
        let size = self.cfg.population_size;
        let mut next: Vec<(CandidateId, NetGenome)> = ranked
            .iter()
            .take(self.cfg.elite_count.min(size))
            .map(|s| (s.id, s.genome.clone()))
            .collect();

        let crossover_rate = self.cfg.crossover_rate.clamp(0.0, 1.0);
        while next.len() < size {
            let Some(p1) = select_parent(ranked, &mut self.rng) else {
                break;
            };
            let mut child = if ranked.len() >= 2 && self.rng.random_bool(crossover_rate) {
                let p2 = select_parent(ranked, &mut self.rng).unwrap_or(p1);
                crossover(&p1.genome, &p2.genome, &mut self.rng)
            } else {
                p1.genome.clone()
            };
            mutate(
                &mut child,
                &mut self.rng,
                self.cfg.mutation_rate,
                self.cfg.mutation_sigma,
            );

            next.push((self.next_id, child));
            self.next_id += 1;
        }
        next
    }
}

/// Best first. Ties keep population order so ranking is reproducible.
fn rank(
    population: &[(CandidateId, NetGenome)],
    scores: &BTreeMap<CandidateId, f64>,
) -> Vec<Scored> {
    let mut ranked: Vec<Scored> = population
        .iter()
        .map(|(id, genome)| Scored {
            id: *id,
            fitness: scores
                .get(id)
                .copied()
                .filter(|f| !f.is_nan())
                .unwrap_or(WORST_FITNESS),
            genome: genome.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal));
    ranked
}

fn summarize(generation: usize, ranked: &[Scored]) -> GenerationStats {
    let n = ranked.len().max(1) as f64;
    GenerationStats {
        generation,
        best_id: ranked.first().map(|s| s.id).unwrap_or_default(),
        best: ranked.first().map(|s| s.fitness).unwrap_or(WORST_FITNESS),
        mean: ranked.iter().map(|s| s.fitness).sum::<f64>() / n,
        worst: ranked.last().map(|s| s.fitness).unwrap_or(WORST_FITNESS),
    }
}

/// Rank-biased pick: squaring a uniform draw favours the head of `pool`.
fn select_parent<'a>(pool: &'a [Scored], rng: &mut StdRng) -> Option<&'a Scored> {
    if pool.is_empty() {
        return None;
    }
    let u: f64 = rng.random();
    let idx = ((u * u) * pool.len() as f64).floor() as usize;
    pool.get(idx.min(pool.len() - 1))
}

fn crossover(a: &NetGenome, b: &NetGenome, rng: &mut StdRng) -> NetGenome {
    if a.weights.len() != b.weights.len() {
        return a.clone();
    }
    let weights = a
        .weights
        .iter()
        .zip(&b.weights)
        .map(|(x, y)| if rng.random_bool(0.5) { *x } else { *y })
        .collect();
    NetGenome {
        weights,
        ..a.clone()
    }
}

fn mutate(g: &mut NetGenome, rng: &mut StdRng, rate: f64, sigma: f64) {
    if g.weights.is_empty() {
        return;
    }
    let rate = rate.clamp(0.0, 1.0);
    let mut changed = false;
    for w in &mut g.weights {
        if rng.random_bool(rate) {
            *w = (*w + gauss(rng, sigma)).clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
            changed = true;
        }
    }
    if !changed {
        let idx = rng.random_range(0..g.weights.len());
        let w = &mut g.weights[idx];
        *w = (*w + gauss(rng, sigma)).clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
    }
}

fn gauss(rng: &mut StdRng, sigma: f64) -> f64 {
    let u1 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z * sigma
}
