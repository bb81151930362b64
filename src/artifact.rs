use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::evolve::{GenerationStats, Scored};

/// The winner of a search, written once at the end of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub generated_at_utc: String,
    pub pair: String,
    pub starting_point: f64,
    pub config: SearchConfig,
    pub winner: Scored,
    pub history: Vec<GenerationStats>,
}

impl Artifact {
    pub fn new(
        config: SearchConfig,
        starting_point: f64,
        winner: Scored,
        history: Vec<GenerationStats>,
    ) -> Self {
        Self {
            generated_at_utc: Utc::now().to_rfc3339(),
            pair: config.pair.clone(),
            starting_point,
            config,
            winner,
            history,
        }
    }
}

pub fn save(path: &Path, artifact: &Artifact) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(path, serde_json::to_string_pretty(artifact)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn load(path: &Path) -> Result<Artifact> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed artifact {}", path.display()))
}
