use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{PickemsError, PickemsResult};
use crate::record::MAX_FREQUENCY;
use crate::source::{ResultsSource, UpcomingMatch};
use crate::stage::{Stage, StageKind};
use crate::store::SnapshotStore;

/// Every team's record token for one stage, as of the last refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    pub stage: Stage,
    pub expires_at: DateTime<Utc>,
    pub teams: BTreeMap<String, String>,
}

impl ResultsSnapshot {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn valid_teams(&self) -> BTreeSet<String> {
        self.teams.keys().cloned().collect()
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tournament: String,
    stage: Stage,
}

#[derive(Default)]
struct Slot {
    /// Refresh attempts finished so far; read before queueing on `state`.
    attempts: AtomicU64,
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    snapshot: Option<Arc<ResultsSnapshot>>,
    last_attempt: Option<PickemsResult<Arc<ResultsSnapshot>>>,
}

/// Lazily refreshed results, one entry per (tournament, stage).
///
/// Each entry sits behind its own mutex held across the expiry check and the
/// fetch. Readers that queued while a refresh was running take that refresh's
/// outcome, error included, instead of fetching again.
pub struct ResultsCache {
    config: Arc<TrackerConfig>,
    source: Arc<dyn ResultsSource>,
    persistence: Option<Arc<dyn SnapshotStore>>,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl ResultsCache {
    pub fn new(
        config: Arc<TrackerConfig>,
        source: Arc<dyn ResultsSource>,
        persistence: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        Self::with_clock(config, source, persistence, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Arc<TrackerConfig>,
        source: Arc<dyn ResultsSource>,
        persistence: Option<Arc<dyn SnapshotStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            persistence,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Results for the configured stage.
    pub fn current(&self) -> PickemsResult<Arc<ResultsSnapshot>> {
        self.get(self.config.stage)
    }

    pub fn get(&self, stage: Stage) -> PickemsResult<Arc<ResultsSnapshot>> {
        let slot = self.slot(stage);
        let seen = slot.attempts.load(Ordering::Acquire);
        let mut state = lock(&slot.state);

        if slot.attempts.load(Ordering::Acquire) != seen
            && let Some(outcome) = state.last_attempt.clone()
        {
            debug!(stage = %stage, "sharing outcome of concurrent refresh");
            return outcome;
        }

        let now = self.clock.now();
        if let Some(snapshot) = state.snapshot.as_ref() {
            if !snapshot.is_expired(now) {
                return Ok(Arc::clone(snapshot));
            }
            info!(stage = %stage, "results expired, refreshing");
        } else if let Some(persisted) = self.load_persisted(stage, now)? {
            debug!(stage = %stage, "serving persisted results");
            let persisted = Arc::new(persisted);
            state.snapshot = Some(Arc::clone(&persisted));
            return Ok(persisted);
        }

        let outcome = self.refresh(stage).map(Arc::new);
        if let Ok(fresh) = &outcome {
            state.snapshot = Some(Arc::clone(fresh));
        }
        state.last_attempt = Some(outcome.clone());
        slot.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Scheduled matches for `stage` that have not started yet. Not cached.
    pub fn upcoming(&self, stage: Stage) -> PickemsResult<Vec<UpcomingMatch>> {
        let url = self.config.stage_url(stage);
        let matches = self
            .source
            .fetch_upcoming_matches(&url, stage.kind())
            .map_err(|err| {
                warn!(stage = %stage, url = %url, error = %err, "upcoming fetch failed");
                PickemsError::upstream(format!("{err:#}"))
            })?;
        let now = self.clock.now();
        Ok(matches.into_iter().filter(|m| m.start >= now).collect())
    }

    fn slot(&self, stage: Stage) -> Arc<Slot> {
        let key = CacheKey {
            tournament: self.config.tournament.clone(),
            stage,
        };
        Arc::clone(lock(&self.slots).entry(key).or_default())
    }

    fn load_persisted(
        &self,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> PickemsResult<Option<ResultsSnapshot>> {
        let Some(store) = self.persistence.as_ref() else {
            return Ok(None);
        };
        Ok(store
            .load_snapshot(stage)?
            .filter(|snapshot| !snapshot.is_expired(now)))
    }

    fn refresh(&self, stage: Stage) -> PickemsResult<ResultsSnapshot> {
        let url = self.config.stage_url(stage);
        let teams = self.fetch_tokens(stage, &url).inspect_err(|err| {
            warn!(stage = %stage, url = %url, error = %err, "results fetch failed");
        })?;

        let snapshot = ResultsSnapshot {
            stage,
            expires_at: self
                .clock
                .now()
                .checked_add_signed(self.config.results_ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            teams,
        };
        if let Some(store) = self.persistence.as_ref() {
            store.save_snapshot(&snapshot)?;
        }
        info!(
            stage = %stage,
            teams = snapshot.teams.len(),
            expires_at = %snapshot.expires_at,
            "results refreshed"
        );
        Ok(snapshot)
    }

    fn fetch_tokens(&self, stage: Stage, url: &str) -> PickemsResult<BTreeMap<String, String>> {
        match stage.kind() {
            StageKind::Swiss => {
                let records = self
                    .source
                    .fetch_swiss_records(url)
                    .map_err(|err| PickemsError::upstream(format!("{err:#}")))?;
                Ok(records
                    .into_iter()
                    .map(|(team, record)| (team.to_lowercase(), record))
                    .collect())
            }
            StageKind::Playoff => {
                let frequencies = self
                    .source
                    .fetch_playoff_frequencies(url)
                    .map_err(|err| PickemsError::upstream(format!("{err:#}")))?;
                frequencies
                    .into_iter()
                    .map(|(team, freq)| {
                        if freq > MAX_FREQUENCY {
                            return Err(PickemsError::Upstream(format!(
                                "{team} appears {freq} times in the ladder"
                            )));
                        }
                        Ok((team.to_lowercase(), freq.to_string()))
                    })
                    .collect()
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
