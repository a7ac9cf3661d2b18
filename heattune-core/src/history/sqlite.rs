use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::debug;

use super::{
    with_initial_state, ControllerStateSource, HistoryError, HistoryResult, HistorySource,
    SampleAttributes, SampleValue, StateSample,
};
use crate::models::{ControllerState, HvacMode, PidGains, ToleranceBand};
use crate::sqlite::configure_connection;

const HISTORY_SCHEMA: &str = include_str!("../../../sql/history.sql");

#[derive(Debug, Clone)]
pub struct SqliteHistoryStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteHistoryStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteHistoryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> HistoryResult<SqliteHistoryStore> {
        let path = self.path.ok_or(HistoryError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteHistoryStore {
            path,
            flags,
            read_only: self.read_only,
        })
    }
}

/// Recorded entity history and controller snapshots in a SQLite file.
///
/// Every call opens its own connection; the async trait impls hop onto the
/// blocking pool so the caller's runtime never waits on disk.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    path: PathBuf,
    flags: OpenFlags,
    read_only: bool,
}

impl SqliteHistoryStore {
    pub fn builder() -> SqliteHistoryStoreBuilder {
        SqliteHistoryStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> HistoryResult<Self> {
        SqliteHistoryStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> HistoryResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            HistoryError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn, self.read_only).map_err(|source| {
            HistoryError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> HistoryResult<()> {
        let conn = self.open()?;
        conn.execute_batch(HISTORY_SCHEMA)?;
        Ok(())
    }

    pub fn record_sample(&self, entity_id: &str, sample: &StateSample) -> HistoryResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO samples (entity_id, ts, state, setpoint, hvac_mode)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity_id,
                sample.timestamp.timestamp_millis(),
                sample.value.to_raw(),
                sample.attributes.setpoint,
                sample.attributes.hvac_mode.map(|mode| mode.as_str()),
            ],
        )?;
        Ok(())
    }

    /// Inserts a batch of samples in one transaction.
    pub fn record_samples(&self, entity_id: &str, samples: &[StateSample]) -> HistoryResult<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO samples (entity_id, ts, state, setpoint, hvac_mode)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for sample in samples {
                stmt.execute(params![
                    entity_id,
                    sample.timestamp.timestamp_millis(),
                    sample.value.to_raw(),
                    sample.attributes.setpoint,
                    sample.attributes.hvac_mode.map(|mode| mode.as_str()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }

    pub fn upsert_controller_state(
        &self,
        entity_id: &str,
        state: &ControllerState,
    ) -> HistoryResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO controller_state (
                entity_id, hvac_mode, setpoint, hot_tolerance, cold_tolerance,
                kp, ki, kd, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(entity_id) DO UPDATE SET
                hvac_mode = excluded.hvac_mode,
                setpoint = excluded.setpoint,
                hot_tolerance = excluded.hot_tolerance,
                cold_tolerance = excluded.cold_tolerance,
                kp = excluded.kp,
                ki = excluded.ki,
                kd = excluded.kd,
                updated_at = excluded.updated_at",
            params![
                entity_id,
                state.mode.as_str(),
                state.setpoint,
                state.tolerances.map(|band| band.hot_tolerance),
                state.tolerances.map(|band| band.cold_tolerance),
                state.gains.map(|gains| gains.kp),
                state.gains.map(|gains| gains.ki),
                state.gains.map(|gains| gains.kd),
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn samples_between(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<StateSample>> {
        let conn = self.open()?;
        let start_ms = start.timestamp_millis();
        let prior = conn
            .query_row(
                "SELECT ts, state, setpoint, hvac_mode FROM samples
                 WHERE entity_id = ?1 AND ts < ?2
                 ORDER BY ts DESC, id DESC
                 LIMIT 1",
                params![entity_id, start_ms],
                sample_from_row,
            )
            .optional()?
            .flatten();

        let mut stmt = conn.prepare(
            "SELECT ts, state, setpoint, hvac_mode FROM samples
             WHERE entity_id = ?1 AND ts >= ?2 AND ts <= ?3
             ORDER BY ts ASC, id ASC",
        )?;
        let in_range = stmt
            .query_map(
                params![entity_id, start_ms, end.timestamp_millis()],
                sample_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        Ok(with_initial_state(prior, in_range, start))
    }

    pub fn controller_state_row(&self, entity_id: &str) -> HistoryResult<Option<ControllerState>> {
        let conn = self.open()?;
        let state = conn
            .query_row(
                "SELECT hvac_mode, setpoint, hot_tolerance, cold_tolerance, kp, ki, kd
                 FROM controller_state WHERE entity_id = ?1",
                [entity_id],
                controller_from_row,
            )
            .optional()?;
        Ok(state)
    }
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Option<StateSample>> {
    let millis: i64 = row.get(0)?;
    let raw: String = row.get(1)?;
    let setpoint: Option<f64> = row.get(2)?;
    let hvac_mode: Option<String> = row.get(3)?;
    let Some(timestamp) = Utc.timestamp_millis_opt(millis).single() else {
        return Ok(None);
    };
    Ok(Some(StateSample {
        timestamp,
        value: SampleValue::parse(&raw),
        attributes: SampleAttributes {
            setpoint,
            hvac_mode: hvac_mode.as_deref().map(HvacMode::parse),
        },
    }))
}

fn controller_from_row(row: &Row<'_>) -> rusqlite::Result<ControllerState> {
    let mode: String = row.get(0)?;
    let hot: Option<f64> = row.get(2)?;
    let cold: Option<f64> = row.get(3)?;
    let kp: Option<f64> = row.get(4)?;
    let ki: Option<f64> = row.get(5)?;
    let kd: Option<f64> = row.get(6)?;
    let tolerances = match (cold, hot) {
        (Some(cold), Some(hot)) => Some(ToleranceBand::new(cold, hot)),
        _ => None,
    };
    let gains = match (kp, ki, kd) {
        (Some(kp), Some(ki), Some(kd)) => Some(PidGains::new(kp, ki, kd)),
        _ => None,
    };
    Ok(ControllerState {
        mode: HvacMode::parse(&mode),
        setpoint: row.get(1)?,
        tolerances,
        gains,
    })
}

#[async_trait]
impl HistorySource for SqliteHistoryStore {
    async fn fetch_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<StateSample>> {
        let store = self.clone();
        let entity = entity_id.to_string();
        let samples = tokio::task::spawn_blocking(move || store.samples_between(&entity, start, end))
            .await
            .map_err(|err| HistoryError::Task(err.to_string()))??;
        debug!(
            target: "heattune::history",
            entity = entity_id,
            samples = samples.len(),
            "history fetched"
        );
        Ok(samples)
    }
}

#[async_trait]
impl ControllerStateSource for SqliteHistoryStore {
    async fn controller_state(&self, entity_id: &str) -> HistoryResult<Option<ControllerState>> {
        let store = self.clone();
        let entity = entity_id.to_string();
        tokio::task::spawn_blocking(move || store.controller_state_row(&entity))
            .await
            .map_err(|err| HistoryError::Task(err.to_string()))?
    }
}
