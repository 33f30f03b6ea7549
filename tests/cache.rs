use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};

use pickems::cache::{Clock, ResultsCache, ResultsSnapshot};
use pickems::config::TrackerConfig;
use pickems::source::{ResultsSource, UpcomingMatch};
use pickems::stage::{Stage, StageKind};
use pickems::store::{SnapshotStore, SqliteStore};

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc.with_ymd_and_hms(2024, 3, 21, 12, 0, 0).unwrap())))
    }

    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Option<StdDuration>,
    swiss: Mutex<HashMap<String, String>>,
    playoff: Mutex<HashMap<String, u8>>,
}

impl CountingSource {
    fn swiss(records: &[(&str, &str)]) -> Self {
        let source = Self::default();
        *source.swiss.lock().unwrap() = records
            .iter()
            .map(|(t, r)| (t.to_string(), r.to_string()))
            .collect();
        source
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResultsSource for CountingSource {
    fn fetch_swiss_records(&self, _stage_url: &str) -> Result<HashMap<String, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("liquipedia unavailable"));
        }
        Ok(self.swiss.lock().unwrap().clone())
    }

    fn fetch_playoff_frequencies(&self, _stage_url: &str) -> Result<HashMap<String, u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("liquipedia unavailable"));
        }
        Ok(self.playoff.lock().unwrap().clone())
    }

    fn fetch_upcoming_matches(
        &self,
        _stage_url: &str,
        _kind: StageKind,
    ) -> Result<Vec<UpcomingMatch>> {
        Ok(Vec::new())
    }
}

fn config(stage: Stage) -> Arc<TrackerConfig> {
    Arc::new(TrackerConfig::new(
        "Test Major",
        stage,
        "https://example.test/Major",
    ))
}

fn cache_with(
    source: Arc<CountingSource>,
    clock: Arc<ManualClock>,
    persistence: Option<Arc<dyn SnapshotStore>>,
) -> ResultsCache {
    ResultsCache::with_clock(config(Stage::Opening), source, persistence, clock)
}

#[test]
fn reads_within_ttl_share_one_fetch() {
    let source = Arc::new(CountingSource::swiss(&[("NAVI", "2-0"), ("G2", "0-2")]));
    let clock = ManualClock::new();
    let cache = cache_with(Arc::clone(&source), Arc::clone(&clock), None);

    let first = cache.current().unwrap();
    clock.advance(Duration::minutes(14));
    let second = cache.current().unwrap();

    assert_eq!(source.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.teams["navi"], "2-0");
    assert_eq!(
        first.valid_teams().into_iter().collect::<Vec<_>>(),
        vec!["g2".to_string(), "navi".to_string()]
    );
}

#[test]
fn expiry_triggers_exactly_one_refresh() {
    let source = Arc::new(CountingSource::swiss(&[("NAVI", "2-0")]));
    let clock = ManualClock::new();
    let cache = cache_with(Arc::clone(&source), Arc::clone(&clock), None);

    let before = cache.current().unwrap();
    source
        .swiss
        .lock()
        .unwrap()
        .insert("NAVI".to_string(), "3-0".to_string());
    clock.advance(Duration::minutes(15));

    let after = cache.current().unwrap();
    let again = cache.current().unwrap();
    assert_eq!(source.calls(), 2);
    assert_eq!(after.teams["navi"], "3-0");
    assert!(after.expires_at > before.expires_at);
    assert!(Arc::ptr_eq(&after, &again));
}

#[test]
fn concurrent_cold_reads_fetch_once() {
    let source = Arc::new(CountingSource {
        delay: Some(StdDuration::from_millis(50)),
        ..CountingSource::swiss(&[("NAVI", "1-0")])
    });
    let cache = Arc::new(cache_with(Arc::clone(&source), ManualClock::new(), None));

    let snapshots = race(8, &cache, |cache| cache.current().unwrap());

    assert_eq!(source.calls(), 1);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
}

fn race<T: Send + 'static>(
    readers: usize,
    cache: &Arc<ResultsCache>,
    read: fn(&ResultsCache) -> T,
) -> Vec<T> {
    let barrier = Arc::new(Barrier::new(readers));
    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let cache = Arc::clone(cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                read(&cache)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn concurrent_reads_of_an_expired_entry_refresh_once() {
    let source = Arc::new(CountingSource {
        delay: Some(StdDuration::from_millis(50)),
        ..CountingSource::swiss(&[("NAVI", "1-0")])
    });
    let clock = ManualClock::new();
    let cache = Arc::new(cache_with(Arc::clone(&source), Arc::clone(&clock), None));

    let stale = cache.current().unwrap();
    source
        .swiss
        .lock()
        .unwrap()
        .insert("NAVI".to_string(), "2-0".to_string());
    clock.advance(Duration::minutes(16));

    let snapshots = race(8, &cache, |cache| cache.current().unwrap());

    assert_eq!(source.calls(), 2);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    assert!(!Arc::ptr_eq(&snapshots[0], &stale));
    assert_eq!(snapshots[0].teams["navi"], "2-0");
}

#[test]
fn concurrent_reads_share_one_failed_refresh() {
    let source = Arc::new(CountingSource {
        delay: Some(StdDuration::from_millis(200)),
        ..CountingSource::swiss(&[("NAVI", "1-0")])
    });
    let clock = ManualClock::new();
    let cache = Arc::new(cache_with(Arc::clone(&source), Arc::clone(&clock), None));

    cache.current().unwrap();
    clock.advance(Duration::minutes(16));
    source.fail.store(true, Ordering::SeqCst);

    let outcomes = race(8, &cache, |cache| cache.current());

    assert_eq!(source.calls(), 2);
    assert!(outcomes.iter().all(|o| o.as_ref().is_err_and(|e| e.is_upstream())));

    // A later read is a new attempt.
    source.fail.store(false, Ordering::SeqCst);
    assert_eq!(cache.current().unwrap().teams["navi"], "1-0");
    assert_eq!(source.calls(), 3);
}

#[test]
fn oversized_ttl_saturates_expiry() {
    let source = Arc::new(CountingSource::swiss(&[("NAVI", "1-0")]));
    let mut config = TrackerConfig::new("Test Major", Stage::Opening, "https://example.test/Major");
    config.results_ttl = Duration::MAX;
    let cache = ResultsCache::with_clock(Arc::new(config), source, None, ManualClock::new());

    let snapshot = cache.current().unwrap();
    assert_eq!(snapshot.expires_at, DateTime::<Utc>::MAX_UTC);
}

#[test]
fn failed_refresh_keeps_previous_entry() {
    let source = Arc::new(CountingSource::swiss(&[("NAVI", "2-0")]));
    let clock = ManualClock::new();
    let cache = cache_with(Arc::clone(&source), Arc::clone(&clock), None);

    let first = cache.current().unwrap();
    clock.advance(Duration::minutes(20));
    source.fail.store(true, Ordering::SeqCst);

    let err = cache.current().unwrap_err();
    assert!(err.is_upstream());

    // Still expired, so the next read retries and can succeed.
    source.fail.store(false, Ordering::SeqCst);
    let second = cache.current().unwrap();
    assert_eq!(source.calls(), 3);
    assert_eq!(second.teams, first.teams);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn first_fetch_failure_leaves_cache_empty() {
    let source = Arc::new(CountingSource::swiss(&[("NAVI", "2-0")]));
    source.fail.store(true, Ordering::SeqCst);
    let cache = cache_with(Arc::clone(&source), ManualClock::new(), None);

    assert!(cache.current().is_err());
    source.fail.store(false, Ordering::SeqCst);
    assert_eq!(cache.current().unwrap().teams["navi"], "2-0");
    assert_eq!(source.calls(), 2);
}

#[test]
fn impossible_playoff_frequency_is_upstream_error() {
    let source = Arc::new(CountingSource::default());
    source.playoff.lock().unwrap().extend([
        ("Vitality".to_string(), 5u8),
        ("Spirit".to_string(), 2u8),
    ]);
    let cache = ResultsCache::with_clock(
        config(Stage::Playoffs),
        source,
        None,
        ManualClock::new(),
    );
    assert!(cache.current().unwrap_err().is_upstream());
}

#[test]
fn playoff_frequencies_are_stored_as_tokens() {
    let source = Arc::new(CountingSource::default());
    source
        .playoff
        .lock()
        .unwrap()
        .extend([("Vitality".to_string(), 4u8), ("MOUZ".to_string(), 1u8)]);
    let cache = ResultsCache::with_clock(
        config(Stage::Playoffs),
        Arc::clone(&source) as Arc<dyn ResultsSource>,
        None,
        ManualClock::new(),
    );
    let snapshot = cache.current().unwrap();
    assert_eq!(snapshot.stage, Stage::Playoffs);
    assert_eq!(snapshot.teams["vitality"], "4");
    assert_eq!(snapshot.teams["mouz"], "1");
}

#[test]
fn cold_start_reuses_unexpired_persisted_snapshot() {
    let clock = ManualClock::new();
    let store = Arc::new(SqliteStore::open_in_memory("Test Major", Stage::Opening).unwrap());
    store
        .save_snapshot(&ResultsSnapshot {
            stage: Stage::Opening,
            expires_at: clock.now() + Duration::minutes(5),
            teams: [("navi".to_string(), "1-0".to_string())].into_iter().collect(),
        })
        .unwrap();

    let source = Arc::new(CountingSource::swiss(&[("NAVI", "2-0")]));
    let persisted: Arc<dyn SnapshotStore> = store.clone();
    let cache = cache_with(Arc::clone(&source), Arc::clone(&clock), Some(persisted));

    assert_eq!(cache.current().unwrap().teams["navi"], "1-0");
    assert_eq!(source.calls(), 0);

    clock.advance(Duration::minutes(5));
    assert_eq!(cache.current().unwrap().teams["navi"], "2-0");
    assert_eq!(source.calls(), 1);

    let saved = store.load_snapshot(Stage::Opening).unwrap().unwrap();
    assert_eq!(saved.teams["navi"], "2-0");
    assert_eq!(saved.expires_at, clock.now() + Duration::minutes(15));
}

#[test]
fn expired_persisted_snapshot_is_refetched() {
    let clock = ManualClock::new();
    let store = Arc::new(SqliteStore::open_in_memory("Test Major", Stage::Opening).unwrap());
    store
        .save_snapshot(&ResultsSnapshot {
            stage: Stage::Opening,
            expires_at: clock.now() - Duration::minutes(1),
            teams: [("navi".to_string(), "1-0".to_string())].into_iter().collect(),
        })
        .unwrap();

    let source = Arc::new(CountingSource::swiss(&[("NAVI", "2-0")]));
    let persisted: Arc<dyn SnapshotStore> = store;
    let cache = cache_with(Arc::clone(&source), clock, Some(persisted));

    assert_eq!(cache.current().unwrap().teams["navi"], "2-0");
    assert_eq!(source.calls(), 1);
}
