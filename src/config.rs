use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Duration;

use crate::stage::Stage;

const DATA_DIR: &str = "pickems";
const DB_FILE: &str = "pickems.sqlite";
const DEFAULT_TTL_MINS: i64 = 15;
const MAX_TTL_MINS: i64 = 7 * 24 * 60;

/// Which tournament and stage this process tracks, and where state lives.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tournament: String,
    pub stage: Stage,
    /// Tournament page, e.g. `https://liquipedia.net/counterstrike/PGL/2024/Copenhagen`.
    pub base_url: String,
    pub db_path: PathBuf,
    pub results_ttl: Duration,
    pub api_key: Option<String>,
    /// Serve results from a local JSON file instead of the network.
    pub fixture_path: Option<PathBuf>,
}

impl TrackerConfig {
    pub fn new(tournament: impl Into<String>, stage: Stage, base_url: impl Into<String>) -> Self {
        Self {
            tournament: tournament.into(),
            stage,
            base_url: base_url.into(),
            db_path: default_db_path().unwrap_or_else(|| PathBuf::from(DB_FILE)),
            results_ttl: Duration::minutes(DEFAULT_TTL_MINS),
            api_key: None,
            fixture_path: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let tournament = required_env("PICKEMS_TOURNAMENT")?;
        let stage = required_env("PICKEMS_STAGE")?
            .parse::<Stage>()
            .map_err(|err| anyhow!(err))
            .context("PICKEMS_STAGE")?;
        let base_url = required_env("PICKEMS_BASE_URL")?;

        let mut config = Self::new(tournament, stage, base_url);
        if let Some(path) = optional_env("PICKEMS_DB") {
            config.db_path = PathBuf::from(path);
        }
        config.results_ttl = ttl_from_minutes(optional_env("PICKEMS_TTL_MINS").as_deref());
        config.api_key = optional_env("LIQUIPEDIA_API_KEY");
        config.fixture_path = optional_env("PICKEMS_FIXTURE").map(PathBuf::from);
        Ok(config)
    }

    pub fn stage_url(&self, stage: Stage) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            stage.page_suffix()
        )
    }
}

/// Unparseable values fall back to the default; the rest are clamped to
/// between one minute and one week.
pub fn ttl_from_minutes(raw: Option<&str>) -> Duration {
    let mins = raw
        .and_then(|val| val.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_TTL_MINS)
        .clamp(1, MAX_TTL_MINS);
    Duration::minutes(mins)
}

fn required_env(name: &str) -> Result<String> {
    optional_env(name).with_context(|| format!("{name} must be set"))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}
