use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{debug, info, warn};

use crate::error::{Result, SimError};

/// Rows of history fed to the controller on every step.
pub const HISTORY_ROWS: usize = 10;

/// Name of the feature column used as the trade price.
pub const CLOSE_COLUMN: &str = "CLOSE";

/// Immutable, time-ordered feature table for one asset.
///
/// Features are stored row-major in a single buffer so that any run of
/// consecutive rows is one contiguous slice.
#[derive(Clone, Debug)]
pub struct Series {
    pair: String,
    columns: Vec<String>,
    close_col: usize,
    timestamps: Vec<i64>,
    values: Vec<f64>,
}

impl Series {
    /// Builds a series from `(timestamp, features)` rows. Rows are sorted by
    /// timestamp; every row must have one value per column.
    pub fn from_rows(
        pair: &str,
        columns: Vec<String>,
        mut rows: Vec<(i64, Vec<f64>)>,
    ) -> Result<Self> {
        let Some(close_col) = columns.iter().position(|c| c == CLOSE_COLUMN) else {
            return Err(SimError::Dataset(format!(
                "{pair}: no {CLOSE_COLUMN} column in {columns:?}"
            )));
        };

        rows.sort_by_key(|(ts, _)| *ts);

        let width = columns.len();
        let mut timestamps = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * width);
        for (ts, row) in rows {
            if row.len() != width {
                return Err(SimError::Dataset(format!(
                    "{pair}: row at ts={ts} has {} values, expected {width}",
                    row.len()
                )));
            }
            timestamps.push(ts);
            values.extend(row);
        }

        Ok(Self {
            pair: pair.to_string(),
            columns,
            close_col,
            timestamps,
            values,
        })
    }

    /// Reads a headered CSV whose first column is the timestamp. Records that
    /// fail to parse are skipped.
    pub fn load_csv(pair: &str, path: &Path) -> anyhow::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("failed to open csv: {}", path.display()))?;

        let headers = rdr
            .headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?
            .clone();
        if headers.len() < 2 {
            bail!("{} has no feature columns", path.display());
        }
        let columns: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        let mut skipped = 0_usize;
        for rec in rdr.records() {
            let r = match rec {
                Ok(x) => x,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let ts = r.get(0).and_then(|x| x.trim().parse::<i64>().ok());
            let feats: Option<Vec<f64>> = r
                .iter()
                .skip(1)
                .map(|x| x.trim().parse::<f64>().ok())
                .collect();
            match (ts, feats) {
                (Some(ts), Some(feats)) if feats.len() == columns.len() => rows.push((ts, feats)),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(pair, skipped, "skipped unparsable rows in {}", path.display());
        }

        let series = Self::from_rows(pair, columns, rows)?;
        if series.is_empty() {
            bail!("data is empty: {}", path.display());
        }
        debug!(
            pair,
            rows = series.len(),
            features = series.feature_count(),
            "loaded series"
        );
        Ok(series)
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Controller input width: the history window plus holding and balance.
    pub fn observation_width(&self) -> usize {
        HISTORY_ROWS * self.feature_count() + 2
    }

    pub fn timestamp(&self, index: usize) -> Option<i64> {
        self.timestamps.get(index).copied()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    pub fn close(&self, index: usize) -> Option<f64> {
        self.row(index).map(|r| r[self.close_col])
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.window(index, index + 1)
    }

    /// Features of rows `from..to`, concatenated row-major.
    pub fn window(&self, from: usize, to: usize) -> Option<&[f64]> {
        if from > to || to > self.len() {
            return None;
        }
        let w = self.feature_count();
        Some(&self.values[from * w..to * w])
    }
}

/// Loads each asset once and hands out shared, read-only handles.
#[derive(Debug, Default)]
pub struct SeriesStore {
    root: PathBuf,
    loaded: HashMap<String, Arc<Series>>,
}

impl SeriesStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: HashMap::new(),
        }
    }

    /// `<root>/<PAIR>/<PAIR>-COMPLETE.csv`
    pub fn pair_file(&self, pair: &str) -> PathBuf {
        self.root.join(pair).join(format!("{pair}-COMPLETE.csv"))
    }

    pub fn insert(&mut self, series: Series) -> Arc<Series> {
        let series = Arc::new(series);
        self.loaded
            .insert(series.pair().to_string(), Arc::clone(&series));
        series
    }

    pub fn get(&self, pair: &str) -> Option<Arc<Series>> {
        self.loaded.get(pair).cloned()
    }

    pub fn load(&mut self, pair: &str) -> anyhow::Result<Arc<Series>> {
        if let Some(s) = self.get(pair) {
            return Ok(s);
        }
        let path = self.pair_file(pair);
        let series = Series::load_csv(pair, &path)?;
        info!(
            pair,
            rows = series.len(),
            first = %ts_label(series.timestamp(0)),
            last = %ts_label(series.last_timestamp()),
            "series ready"
        );
        Ok(self.insert(series))
    }
}

fn ts_label(ts: Option<i64>) -> String {
    ts.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        ["OPEN", "CLOSE", "VOLUME"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rows_are_sorted_and_sliceable() {
        let s = Series::from_rows(
            "BTCUSD",
            cols(),
            vec![
                (3, vec![3.0, 30.0, 300.0]),
                (1, vec![1.0, 10.0, 100.0]),
                (2, vec![2.0, 20.0, 200.0]),
            ],
        )
        .unwrap();

        assert_eq!(s.len(), 3);
        assert_eq!(s.timestamp(0), Some(1));
        assert_eq!(s.last_timestamp(), Some(3));
        assert_eq!(s.close(1), Some(20.0));
        assert_eq!(s.row(2), Some(&[3.0, 30.0, 300.0][..]));
        assert_eq!(s.window(1, 3).unwrap().len(), 6);
        assert!(s.window(2, 4).is_none());
        assert_eq!(s.observation_width(), 32);
    }

    #[test]
    fn missing_close_column_is_rejected() {
        let err = Series::from_rows("X", vec!["OPEN".into()], vec![(1, vec![1.0])]).unwrap_err();
        assert!(matches!(err, SimError::Dataset(_)));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Series::from_rows("X", cols(), vec![(1, vec![1.0, 2.0])]).unwrap_err();
        assert!(matches!(err, SimError::Dataset(_)));
    }

    #[test]
    fn csv_is_loaded_from_pair_directory() {
        let root = std::env::temp_dir().join(format!("evo_trader_series_{}", std::process::id()));
        let dir = root.join("ETHUSD");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("ETHUSD-COMPLETE.csv"),
            "TS,OPEN,CLOSE,HIGH,LOW,VOLUME\n\
             60,1,2,3,0.5,10\n\
             0,1,1.5,2,0.5,10\n\
             bad,1,1,1,1,1\n",
        )
        .unwrap();

        let mut store = SeriesStore::open(&root);
        let s = store.load("ETHUSD").unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.timestamp(0), Some(0));
        assert_eq!(s.close(1), Some(2.0));
        assert!(Arc::ptr_eq(&s, &store.load("ETHUSD").unwrap()));

        assert!(store.load("NOPE").is_err());
        let _ = std::fs::remove_dir_all(&root);
    }
}
