//! Episodic market simulation and fitness evaluation for evolving
//! recurrent trading controllers against historical candles.

pub mod action;
pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod evolve;
pub mod harness;
pub mod logging;
pub mod series;
pub mod sim;

pub use action::{TradeIntent, decode};
pub use controller::{Controller, Genome, NetGenome, RecurrentNet};
pub use error::{Result, SimError};
pub use harness::{CandidateId, EvalConfig, Harness, WORST_FITNESS};
pub use series::{Series, SeriesStore};
pub use sim::MarketSim;
