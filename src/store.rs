use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::cache::ResultsSnapshot;
use crate::error::{PickemsError, PickemsResult};
use crate::prediction::{Picks, Prediction};
use crate::stage::Stage;

/// Predictions for one (tournament, stage), keyed by user id.
pub trait PredictionStore: Send + Sync {
    fn get_prediction(&self, user_id: &str) -> PickemsResult<Option<Prediction>>;

    /// Replaces any earlier prediction from the same user.
    fn upsert_prediction(&self, prediction: &Prediction) -> PickemsResult<()>;

    /// Every stored prediction, in the order users first submitted.
    fn all_predictions(&self) -> PickemsResult<Vec<Prediction>>;
}

/// One persisted results document per (tournament, stage).
pub trait SnapshotStore: Send + Sync {
    fn load_snapshot(&self, stage: Stage) -> PickemsResult<Option<ResultsSnapshot>>;

    fn save_snapshot(&self, snapshot: &ResultsSnapshot) -> PickemsResult<()>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    tournament: String,
    stage: Stage,
}

impl SqliteStore {
    pub fn open(path: &Path, tournament: impl Into<String>, stage: Stage) -> PickemsResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, tournament, stage)
    }

    pub fn open_in_memory(tournament: impl Into<String>, stage: Stage) -> PickemsResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, tournament, stage)
    }

    fn with_connection(
        conn: Connection,
        tournament: impl Into<String>,
        stage: Stage,
    ) -> PickemsResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            tournament: tournament.into(),
            stage,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn init_schema(conn: &Connection) -> PickemsResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS predictions (
            tournament TEXT NOT NULL,
            stage TEXT NOT NULL,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            picks TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (tournament, stage, user_id)
        );
        CREATE TABLE IF NOT EXISTS results (
            tournament TEXT NOT NULL,
            stage TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            teams TEXT NOT NULL,
            PRIMARY KEY (tournament, stage)
        );
        "#,
    )?;
    Ok(())
}

impl PredictionStore for SqliteStore {
    fn get_prediction(&self, user_id: &str) -> PickemsResult<Option<Prediction>> {
        let row = self
            .conn()
            .query_row(
                "SELECT user_id, user_name, picks FROM predictions
                 WHERE tournament = ?1 AND stage = ?2 AND user_id = ?3",
                params![self.tournament, self.stage.as_str(), user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(decode_prediction).transpose()
    }

    fn upsert_prediction(&self, prediction: &Prediction) -> PickemsResult<()> {
        let picks = serde_json::to_string(&prediction.picks)?;
        self.conn().execute(
            r#"
            INSERT INTO predictions (tournament, stage, user_id, user_name, picks, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(tournament, stage, user_id) DO UPDATE SET
                user_name = excluded.user_name,
                picks = excluded.picks,
                updated_at = excluded.updated_at
            "#,
            params![
                self.tournament,
                self.stage.as_str(),
                prediction.user_id,
                prediction.user_name,
                picks,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(user_id = %prediction.user_id, "prediction stored");
        Ok(())
    }

    fn all_predictions(&self) -> PickemsResult<Vec<Prediction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, user_name, picks FROM predictions
             WHERE tournament = ?1 AND stage = ?2
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![self.tournament, self.stage.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(decode_prediction(row?)?);
        }
        Ok(out)
    }
}

impl SnapshotStore for SqliteStore {
    fn load_snapshot(&self, stage: Stage) -> PickemsResult<Option<ResultsSnapshot>> {
        let row = self
            .conn()
            .query_row(
                "SELECT expires_at, teams FROM results WHERE tournament = ?1 AND stage = ?2",
                params![self.tournament, stage.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((expires_at, teams)) = row else {
            return Ok(None);
        };
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|err| PickemsError::Store(format!("bad results expiry: {err}")))?
            .with_timezone(&Utc);
        let teams: BTreeMap<String, String> = serde_json::from_str(&teams)?;
        Ok(Some(ResultsSnapshot {
            stage,
            expires_at,
            teams,
        }))
    }

    fn save_snapshot(&self, snapshot: &ResultsSnapshot) -> PickemsResult<()> {
        let teams = serde_json::to_string(&snapshot.teams)?;
        self.conn().execute(
            r#"
            INSERT INTO results (tournament, stage, expires_at, teams)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tournament, stage) DO UPDATE SET
                expires_at = excluded.expires_at,
                teams = excluded.teams
            "#,
            params![
                self.tournament,
                snapshot.stage.as_str(),
                snapshot.expires_at.to_rfc3339(),
                teams,
            ],
        )?;
        Ok(())
    }
}

fn decode_prediction((user_id, user_name, picks): (String, String, String)) -> PickemsResult<Prediction> {
    let picks: Picks = serde_json::from_str(&picks)?;
    Ok(Prediction {
        user_id,
        user_name,
        picks,
    })
}
