#![allow(dead_code)]

use std::sync::Arc;

use evo_trader::{Controller, Series};

pub const COLUMNS: [&str; 5] = ["OPEN", "CLOSE", "HIGH", "LOW", "VOLUME"];

/// One-minute candles with the given closes.
pub fn series_from_closes(pair: &str, closes: &[f64]) -> Arc<Series> {
    let rows = closes
        .iter()
        .enumerate()
        .map(|(i, c)| (i as i64 * 60, vec![*c, *c, c * 1.01, c * 0.99, 10.0 + i as f64]))
        .collect();
    let columns = COLUMNS.iter().map(|c| c.to_string()).collect();
    Arc::new(Series::from_rows(pair, columns, rows).expect("valid rows"))
}

pub fn flat(len: usize, price: f64) -> Arc<Series> {
    series_from_closes("BTCUSD", &vec![price; len])
}

/// Deterministic wavy price path that stays well above zero.
pub fn wave(len: usize) -> Arc<Series> {
    let closes: Vec<f64> = (0..len)
        .map(|i| {
            let t = i as f64;
            100.0 + 15.0 * (t / 7.0).sin() + 5.0 * (t / 3.0).cos()
        })
        .collect();
    series_from_closes("BTCUSD", &closes)
}

pub const HOLD: [f64; 2] = [0.5, 0.0];

/// Plays back a fixed action list; holds once the list runs out.
pub struct Script {
    pub actions: Vec<[f64; 2]>,
    pub cursor: usize,
    pub resets: usize,
}

impl Script {
    pub fn new(actions: Vec<[f64; 2]>) -> Self {
        Self {
            actions,
            cursor: 0,
            resets: 0,
        }
    }
}

impl Controller for Script {
    fn reset(&mut self) {
        self.cursor = 0;
        self.resets += 1;
    }

    fn activate(&mut self, _observation: &[f64]) -> Vec<f64> {
        let a = self.actions.get(self.cursor).copied().unwrap_or(HOLD);
        self.cursor += 1;
        a.to_vec()
    }
}
