use rand::Rng;
use serde::{Deserialize, Serialize};

/// A stateful decision maker driven one observation at a time.
pub trait Controller {
    /// Clears any recurrent state. Called before every episode.
    fn reset(&mut self);

    /// Produces the action vector for one observation.
    fn activate(&mut self, observation: &[f64]) -> Vec<f64>;
}

/// Immutable description of a candidate that can be shared across workers.
/// Each worker builds its own [`Controller`] from it.
pub trait Genome: Sync {
    type Net: Controller;

    fn build(&self) -> Self::Net;
}

/// Flat weight vector of a single-hidden-layer Elman network.
///
/// Layout: input→hidden, hidden→hidden, hidden bias, hidden→output,
/// output bias, each row-major by destination unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetGenome {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
    pub weights: Vec<f64>,
}

impl NetGenome {
    pub fn weight_count(inputs: usize, hidden: usize, outputs: usize) -> usize {
        hidden * inputs + hidden * hidden + hidden + outputs * hidden + outputs
    }

    pub fn random<R: Rng>(inputs: usize, hidden: usize, outputs: usize, rng: &mut R) -> Self {
        let n = Self::weight_count(inputs, hidden, outputs);
        let weights = (0..n).map(|_| rng.random_range(-1.0..=1.0)).collect();
        Self {
            inputs,
            hidden,
            outputs,
            weights,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.weights.len() == Self::weight_count(self.inputs, self.hidden, self.outputs)
    }
}

impl Genome for NetGenome {
    type Net = RecurrentNet;

    fn build(&self) -> RecurrentNet {
        RecurrentNet::new(self.clone())
    }
}

#[derive(Clone, Debug)]
pub struct RecurrentNet {
    genome: NetGenome,
    state: Vec<f64>,
}

impl RecurrentNet {
    pub fn new(genome: NetGenome) -> Self {
        let state = vec![0.0; genome.hidden];
        Self { genome, state }
    }

    pub fn hidden_state(&self) -> &[f64] {
        &self.state
    }
}

impl Controller for RecurrentNet {
    fn reset(&mut self) {
        self.state.iter_mut().for_each(|h| *h = 0.0);
    }

    /// Returns an empty action when the observation width or the weight
    /// layout does not match the network; the decoder rejects it.
    fn activate(&mut self, observation: &[f64]) -> Vec<f64> {
        let g = &self.genome;
        if observation.len() != g.inputs || !g.is_well_formed() {
            return Vec::new();
        }

        let (w_ih, rest) = g.weights.split_at(g.hidden * g.inputs);
        let (w_hh, rest) = rest.split_at(g.hidden * g.hidden);
        let (b_h, rest) = rest.split_at(g.hidden);
        let (w_ho, b_o) = rest.split_at(g.outputs * g.hidden);

        let next: Vec<f64> = (0..g.hidden)
            .map(|j| {
                let from_in = dot(&w_ih[j * g.inputs..(j + 1) * g.inputs], observation);
                let from_self = dot(&w_hh[j * g.hidden..(j + 1) * g.hidden], &self.state);
                (from_in + from_self + b_h[j]).tanh()
            })
            .collect();
        self.state = next;

        (0..g.outputs)
            .map(|o| sigmoid(dot(&w_ho[o * g.hidden..(o + 1) * g.hidden], &self.state) + b_o[o]))
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_genome_has_expected_layout() {
        let mut rng = StdRng::seed_from_u64(7);
        let g = NetGenome::random(5, 3, 2, &mut rng);
        assert_eq!(g.weights.len(), 15 + 9 + 3 + 6 + 2);
        assert!(g.is_well_formed());
        assert!(g.weights.iter().all(|w| (-1.0..=1.0).contains(w)));
    }

    #[test]
    fn outputs_are_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut net = NetGenome::random(4, 6, 2, &mut rng).build();
        let out = net.activate(&[1e4, -3.0, 0.5, 1000.0]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn reset_restores_initial_behaviour() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = NetGenome::random(3, 4, 2, &mut rng).build();
        let obs = [0.2, -0.4, 0.9];

        let first = net.activate(&obs);
        let second = net.activate(&obs);
        assert_ne!(first, second, "hidden state should carry over");

        net.reset();
        assert!(net.hidden_state().iter().all(|h| *h == 0.0));
        assert_eq!(net.activate(&obs), first);
    }

    #[test]
    fn width_mismatch_yields_empty_action() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = NetGenome::random(3, 2, 2, &mut rng).build();
        assert!(net.activate(&[1.0, 2.0]).is_empty());
    }
}
