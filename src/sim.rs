use std::sync::Arc;

use crate::action::TradeIntent;
use crate::error::{Result, SimError};
use crate::series::{HISTORY_ROWS, Series};

/// Trades below this conviction are treated as noise.
pub const MIN_CONVICTION: f64 = 0.5;

/// Fitness cost per firing of the inactivity penalty.
pub const PENALTY_UNIT: f64 = 0.001;

/// Fraction of the episode after which a controller that never bought is
/// penalised.
const PENALTY_FRACTION: f64 = 0.05;

/// Smallest tradable unit of the asset, in decimal places.
const QTY_DECIMALS: i32 = 8;

/// One simulated trading episode over a window of a [`Series`].
///
/// The simulator is long-only: `balance` and `holding` never go negative
/// and no trade is partially filled beyond the requested fraction.
#[derive(Clone, Debug)]
pub struct MarketSim {
    series: Arc<Series>,
    sim_length: usize,
    start_balance: f64,
    balance: f64,
    holding: f64,

    start_index: usize,
    time_index: usize,
    end_index: usize,
    timestamp: i64,
    last_timestamp: i64,
    done: bool,

    step_count: usize,
    buy_count: usize,
    penalty_mult: u32,
    penalty_threshold: usize,
}

impl MarketSim {
    /// Places an episode of `sim_length` steps at `starting_point` (a fraction
    /// in `[0, 1]`) of the usable range of `series`.
    ///
    /// The usable range leaves [`HISTORY_ROWS`] rows in front of the first
    /// step so that an observation is always available, and keeps the end
    /// index on an existing row.
    pub fn new(
        series: Arc<Series>,
        sim_length: usize,
        starting_point: f64,
        starting_balance: f64,
    ) -> Result<Self> {
        let pair = series.pair();
        if sim_length == 0 {
            return Err(SimError::InvalidParameter("sim_length must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&starting_point) {
            return Err(SimError::InvalidParameter(format!(
                "starting point must be within [0, 1], got {starting_point}"
            )));
        }
        if !(starting_balance.is_finite() && starting_balance > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "starting balance must be positive, got {starting_balance}"
            )));
        }

        let needed = HISTORY_ROWS + sim_length + 1;
        if series.len() < needed {
            return Err(SimError::unavailable(
                pair,
                format!("series has {} rows, episode needs {needed}", series.len()),
            ));
        }

        let span = series.len() - needed;
        let start_index = HISTORY_ROWS + (starting_point * span as f64).floor() as usize;
        let end_index = start_index + sim_length;

        let (Some(timestamp), Some(last_timestamp)) =
            (series.timestamp(start_index), series.last_timestamp())
        else {
            return Err(SimError::unavailable(pair, "start row out of range"));
        };

        Ok(Self {
            sim_length,
            start_balance: starting_balance,
            balance: starting_balance,
            holding: 0.0,
            start_index,
            time_index: start_index,
            end_index,
            timestamp,
            last_timestamp,
            done: false,
            step_count: 0,
            buy_count: 0,
            penalty_mult: 1,
            penalty_threshold: (sim_length as f64 * PENALTY_FRACTION) as usize,
            series,
        })
    }

    pub fn pair(&self) -> &str {
        self.series.pair()
    }

    pub fn sim_length(&self) -> usize {
        self.sim_length
    }

    pub fn starting_balance(&self) -> f64 {
        self.start_balance
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn holding(&self) -> f64 {
        self.holding
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn time_index(&self) -> usize {
        self.time_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn buy_count(&self) -> usize {
        self.buy_count
    }

    pub fn penalty_multiplier(&self) -> u32 {
        self.penalty_mult
    }

    pub fn penalty_threshold(&self) -> usize {
        self.penalty_threshold
    }

    /// Close price at the current row. Zero, negative or non-finite prices
    /// are reported as missing data.
    pub fn price(&self) -> Result<f64> {
        match self.series.close(self.time_index) {
            Some(p) if p.is_finite() && p > 0.0 => Ok(p),
            Some(p) => Err(SimError::unavailable(
                self.pair(),
                format!("bad close price {p} at row {}", self.time_index),
            )),
            None => Err(SimError::unavailable(
                self.pair(),
                format!("no row {}", self.time_index),
            )),
        }
    }

    /// Spends `pct_balance` of the balance at the current close.
    pub fn buy(&mut self, pct_balance: f64) -> Result<()> {
        if self.balance <= 0.0 || !(pct_balance >= MIN_CONVICTION) {
            return Ok(());
        }
        let pct = pct_balance.min(1.0);
        let price = self.price()?;

        let spend = pct * self.balance;
        let purchased = round_to(spend / price, QTY_DECIMALS);
        self.holding += purchased;
        self.balance -= spend;

        self.buy_count += 1;
        Ok(())
    }

    /// Sells `pct_holding` of the holding at the current close.
    pub fn sell(&mut self, pct_holding: f64) -> Result<()> {
        if self.holding <= 0.0 || !(pct_holding >= MIN_CONVICTION) {
            return Ok(());
        }
        let pct = pct_holding.min(1.0);
        let price = self.price()?;

        let sold = pct * self.holding;
        self.holding -= sold;
        self.balance += sold * price;
        Ok(())
    }

    /// Advances one row, then attempts `trade` at the new row's price.
    /// Stepping a finished episode does nothing.
    pub fn step(&mut self, trade: TradeIntent) -> Result<()> {
        if self.done {
            return Ok(());
        }

        self.step_count += 1;
        self.time_index += 1;
        self.timestamp = self.series.timestamp(self.time_index).ok_or_else(|| {
            SimError::unavailable(self.series.pair(), format!("no row {}", self.time_index))
        })?;

        let outcome = match trade {
            TradeIntent::Sell(pct) => self.sell(pct),
            TradeIntent::Buy(pct) => self.buy(pct),
            TradeIntent::Hold => Ok(()),
        };

        if self.timestamp == self.last_timestamp || self.time_index >= self.end_index {
            self.done = true;
        }
        outcome
    }

    /// The last [`HISTORY_ROWS`] feature rows before the current one,
    /// followed by holding and balance.
    pub fn observation(&self) -> Result<Vec<f64>> {
        let insufficient = SimError::InsufficientHistory {
            index: self.time_index,
            needed: HISTORY_ROWS,
        };
        if self.time_index < HISTORY_ROWS {
            return Err(insufficient);
        }
        let Some(window) = self
            .series
            .window(self.time_index - HISTORY_ROWS, self.time_index)
        else {
            return Err(insufficient);
        };

        let mut obs = Vec::with_capacity(window.len() + 2);
        obs.extend_from_slice(window);
        obs.push(self.holding);
        obs.push(self.balance);
        Ok(obs)
    }

    pub fn holding_value(&self) -> Result<f64> {
        Ok(self.holding * self.price()?)
    }

    /// Relative return on the starting balance, marked to the current close.
    ///
    /// Once the episode is past the penalty threshold without a single buy,
    /// every call subtracts an escalating penalty.
    pub fn fitness(&mut self) -> Result<f64> {
        let equity = self.balance + self.holding_value()?;
        let mut fitness = (equity - self.start_balance) / self.start_balance;

        if self.step_count > self.penalty_threshold && self.buy_count < 1 {
            fitness -= PENALTY_UNIT * f64::from(self.penalty_mult);
            self.penalty_mult += 1;
        }
        Ok(fitness)
    }
}

fn round_to(v: f64, digits: i32) -> f64 {
    let f = 10_f64.powi(digits);
    (v * f).round() / f
}
