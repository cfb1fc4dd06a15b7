//! SQLite-backed record store
//!
//! Connections come from an r2d2 pool. Every pooled connection runs in WAL
//! mode with foreign keys enforced and a busy timeout, so readers proceed
//! alongside one writer and concurrent writers queue instead of failing.
//!
//! Timestamps are stored as UTC microseconds since the epoch. Multi-select
//! answers are stored as JSON arrays of strings.

use super::transactions::execute_in_transaction;
use super::{RecordStore, StoreCounts, StoreTx};
use crate::config::{IntakeConfig, StoreConfig};
use crate::errors::{IntakeError, Result};
use crate::model::{
    Answers, Identity, NewResponse, ResponseRecord, Session, SessionId, SessionStatus,
};
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::path::Path;
use std::time::Duration;

/// Embedded schema SQL from INTAKE_SCHEMA.sql
const SCHEMA_SQL: &str = include_str!("../../INTAKE_SCHEMA.sql");

const SESSION_COLUMNS: &str =
    "session_id, device_id, identity, created_at, completed_at, status";

const RESPONSE_COLUMNS: &str = "id, session_id, identity, name, age, period_description, \
     birth_control, last_period_date, cycle_length, period_concerns, body_concerns, \
     skin_hair_concerns, mental_health_concerns, other_concerns, top_concern, \
     diagnosed_conditions, created_at, updated_at";

/// Pooled SQLite store
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("SqliteStore")
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

impl SqliteStore {
    /// Open the store configured in `intake.toml`
    pub fn open(cfg: &IntakeConfig) -> Result<Self> {
        Self::open_at_path(&cfg.resolved_db_path(), &cfg.store)
    }

    /// Open (creating if needed) the database file at `path`
    pub fn open_at_path(path: &Path, cfg: &StoreConfig) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                IntakeError::storage_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let busy_timeout = Duration::from_millis(cfg.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn| configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(cfg.pool_size)
            .build(manager)
            .map_err(|e| {
                IntakeError::storage_with_source(
                    format!("failed to open db at {}", path.display()),
                    e,
                )
            })?;

        let store = Self { pool };
        store.apply_schema()?;

        tracing::debug!(
            path = %path.display(),
            pool_size = cfg.pool_size,
            "Intake store initialized"
        );

        Ok(store)
    }

    /// Private in-memory database (for tests and dry runs).
    ///
    /// Each in-memory connection is its own database, so the pool holds
    /// exactly one connection that is never recycled.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| configure_connection(conn, Duration::ZERO));

        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| IntakeError::storage_with_source("failed to open in-memory db", e))?;

        let store = Self { pool };
        store.apply_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| IntakeError::storage_with_source("failed to get connection", e))
    }

    /// Apply the schema to the database
    fn apply_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| IntakeError::storage_with_source("failed to apply schema", e))?;
        Ok(())
    }
}

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    // In-memory databases answer "memory" here; only files switch to WAL.
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

impl RecordStore for SqliteStore {
    fn read<T>(&self, op: impl FnOnce(&dyn StoreTx) -> Result<T>) -> Result<T> {
        let mut conn = self.connection()?;
        execute_in_transaction(&mut conn, TransactionBehavior::Deferred, |tx| op(&**tx))
    }

    fn write<T>(&self, op: impl FnOnce(&dyn StoreTx) -> Result<T>) -> Result<T> {
        let mut conn = self.connection()?;
        execute_in_transaction(&mut conn, TransactionBehavior::Immediate, |tx| op(&**tx))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column codecs
// ─────────────────────────────────────────────────────────────────────────────

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(IntakeError::storage(message)))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        conversion_error(idx, Type::Integer, format!("timestamp out of range: {micros}"))
    })
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => timestamp_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn list_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<String>>> {
    let Some(raw) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn list_to_sql(values: &Option<Vec<String>>) -> Result<Option<String>> {
    values
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| IntakeError::storage_with_source("failed to encode answer list", e))
}

fn read_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(5)?;
    let status = SessionStatus::parse(&status).ok_or_else(|| {
        conversion_error(5, Type::Text, format!("unknown session status: {status}"))
    })?;

    Ok(Session {
        session_id: SessionId::new(row.get::<_, String>(0)?),
        device_id: row.get(1)?,
        identity: row.get::<_, Option<String>>(2)?.map(Identity::new),
        created_at: timestamp_at(row, 3)?,
        completed_at: optional_timestamp_at(row, 4)?,
        status,
    })
}

fn read_response(row: &Row<'_>) -> rusqlite::Result<ResponseRecord> {
    Ok(ResponseRecord {
        id: row.get(0)?,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        identity: row.get::<_, Option<String>>(2)?.map(Identity::new),
        answers: Answers {
            name: row.get(3)?,
            age: row.get(4)?,
            period_description: row.get(5)?,
            birth_control: list_at(row, 6)?,
            last_period_date: row.get(7)?,
            cycle_length: row.get(8)?,
            period_concerns: list_at(row, 9)?,
            body_concerns: list_at(row, 10)?,
            skin_hair_concerns: list_at(row, 11)?,
            mental_health_concerns: list_at(row, 12)?,
            other_concerns: list_at(row, 13)?,
            top_concern: row.get(14)?,
            diagnosed_conditions: list_at(row, 15)?,
        },
        created_at: timestamp_at(row, 16)?,
        updated_at: timestamp_at(row, 17)?,
    })
}

/// Answer columns in schema order, encoded for binding
struct AnswerParams {
    birth_control: Option<String>,
    period_concerns: Option<String>,
    body_concerns: Option<String>,
    skin_hair_concerns: Option<String>,
    mental_health_concerns: Option<String>,
    other_concerns: Option<String>,
    diagnosed_conditions: Option<String>,
}

impl AnswerParams {
    fn encode(answers: &Answers) -> Result<Self> {
        Ok(Self {
            birth_control: list_to_sql(&answers.birth_control)?,
            period_concerns: list_to_sql(&answers.period_concerns)?,
            body_concerns: list_to_sql(&answers.body_concerns)?,
            skin_hair_concerns: list_to_sql(&answers.skin_hair_concerns)?,
            mental_health_concerns: list_to_sql(&answers.mental_health_concerns)?,
            other_concerns: list_to_sql(&answers.other_concerns)?,
            diagnosed_conditions: list_to_sql(&answers.diagnosed_conditions)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row operations
// ─────────────────────────────────────────────────────────────────────────────

impl StoreTx for Connection {
    fn insert_session(&self, session: &Session) -> Result<()> {
        self.execute(
            r#"
            INSERT INTO sessions (session_id, device_id, identity, created_at, completed_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                session.session_id.as_str(),
                session.device_id,
                session.identity.as_ref().map(Identity::as_str),
                to_micros(session.created_at),
                session.completed_at.map(to_micros),
                session.status.as_str(),
            ],
        )
        .map_err(|e| IntakeError::storage_with_source("failed to insert session", e))?;
        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        self.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
            params![session_id.as_str()],
            read_session,
        )
        .optional()
        .map_err(|e| IntakeError::storage_with_source("failed to get session", e))
    }

    fn update_session(&self, session: &Session) -> Result<()> {
        let changed = self
            .execute(
                r#"
                UPDATE sessions
                SET identity = ?2, completed_at = ?3, status = ?4
                WHERE session_id = ?1
                "#,
                params![
                    session.session_id.as_str(),
                    session.identity.as_ref().map(Identity::as_str),
                    session.completed_at.map(to_micros),
                    session.status.as_str(),
                ],
            )
            .map_err(|e| IntakeError::storage_with_source("failed to update session", e))?;

        if changed == 0 {
            return Err(IntakeError::session_not_found(&session.session_id));
        }
        Ok(())
    }

    fn response_by_session(&self, session_id: &SessionId) -> Result<Option<ResponseRecord>> {
        self.query_row(
            &format!("SELECT {RESPONSE_COLUMNS} FROM response_records WHERE session_id = ?1"),
            params![session_id.as_str()],
            read_response,
        )
        .optional()
        .map_err(|e| IntakeError::storage_with_source("failed to get response", e))
    }

    fn insert_response(&self, record: &NewResponse) -> Result<ResponseRecord> {
        let answers = &record.answers;
        let lists = AnswerParams::encode(answers)?;
        let created_at = to_micros(record.created_at);

        self.execute(
            r#"
            INSERT INTO response_records (
                session_id, identity, name, age, period_description, birth_control,
                last_period_date, cycle_length, period_concerns, body_concerns,
                skin_hair_concerns, mental_health_concerns, other_concerns, top_concern,
                diagnosed_conditions, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
            "#,
            params![
                record.session_id.as_str(),
                record.identity.as_ref().map(Identity::as_str),
                answers.name,
                answers.age,
                answers.period_description,
                lists.birth_control,
                answers.last_period_date,
                answers.cycle_length,
                lists.period_concerns,
                lists.body_concerns,
                lists.skin_hair_concerns,
                lists.mental_health_concerns,
                lists.other_concerns,
                answers.top_concern,
                lists.diagnosed_conditions,
                created_at,
            ],
        )
        .map_err(|e| IntakeError::storage_with_source("failed to insert response", e))?;

        Ok(ResponseRecord {
            id: self.last_insert_rowid(),
            session_id: record.session_id.clone(),
            identity: record.identity.clone(),
            answers: record.answers.clone(),
            created_at: record.created_at,
            updated_at: record.created_at,
        })
    }

    fn update_response(&self, record: &ResponseRecord) -> Result<()> {
        let answers = &record.answers;
        let lists = AnswerParams::encode(answers)?;

        let changed = self
            .execute(
                r#"
                UPDATE response_records
                SET identity = ?2, name = ?3, age = ?4, period_description = ?5,
                    birth_control = ?6, last_period_date = ?7, cycle_length = ?8,
                    period_concerns = ?9, body_concerns = ?10, skin_hair_concerns = ?11,
                    mental_health_concerns = ?12, other_concerns = ?13, top_concern = ?14,
                    diagnosed_conditions = ?15, updated_at = ?16
                WHERE id = ?1
                "#,
                params![
                    record.id,
                    record.identity.as_ref().map(Identity::as_str),
                    answers.name,
                    answers.age,
                    answers.period_description,
                    lists.birth_control,
                    answers.last_period_date,
                    answers.cycle_length,
                    lists.period_concerns,
                    lists.body_concerns,
                    lists.skin_hair_concerns,
                    lists.mental_health_concerns,
                    lists.other_concerns,
                    answers.top_concern,
                    lists.diagnosed_conditions,
                    to_micros(record.updated_at),
                ],
            )
            .map_err(|e| IntakeError::storage_with_source("failed to update response", e))?;

        if changed == 0 {
            return Err(IntakeError::response_not_found(&record.session_id));
        }
        Ok(())
    }

    fn set_response_identity(
        &self,
        session_id: &SessionId,
        identity: &Identity,
        updated_at: DateTime<Utc>,
    ) -> Result<usize> {
        self.execute(
            "UPDATE response_records SET identity = ?2, updated_at = ?3 WHERE session_id = ?1",
            params![session_id.as_str(), identity.as_str(), to_micros(updated_at)],
        )
        .map_err(|e| IntakeError::storage_with_source("failed to stamp response identity", e))
    }

    fn delete_responses(&self, session_id: &SessionId) -> Result<usize> {
        self.execute(
            "DELETE FROM response_records WHERE session_id = ?1",
            params![session_id.as_str()],
        )
        .map_err(|e| IntakeError::storage_with_source("failed to delete responses", e))
    }

    fn responses_by_identity(&self, identity: &Identity) -> Result<Vec<ResponseRecord>> {
        let mut stmt = self
            .prepare(&format!(
                "SELECT {RESPONSE_COLUMNS} FROM response_records \
                 WHERE identity = ?1 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(|e| IntakeError::storage_with_source("failed to prepare query", e))?;

        let rows = stmt
            .query_map(params![identity.as_str()], read_response)
            .map_err(|e| IntakeError::storage_with_source("failed to query responses", e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| {
                IntakeError::storage_with_source("failed to read response row", e)
            })?);
        }
        Ok(records)
    }

    fn scan_identified_responses(
        &self,
        visit: &mut dyn FnMut(ResponseRecord) -> Result<()>,
    ) -> Result<()> {
        let mut stmt = self
            .prepare(&format!(
                "SELECT {RESPONSE_COLUMNS} FROM response_records \
                 WHERE identity IS NOT NULL ORDER BY identity, created_at DESC, id DESC"
            ))
            .map_err(|e| IntakeError::storage_with_source("failed to prepare scan", e))?;

        let mut rows = stmt
            .query([])
            .map_err(|e| IntakeError::storage_with_source("failed to scan responses", e))?;

        while let Some(row) = rows
            .next()
            .map_err(|e| IntakeError::storage_with_source("failed to advance scan", e))?
        {
            let record = read_response(row)
                .map_err(|e| IntakeError::storage_with_source("failed to read response row", e))?;
            visit(record)?;
        }
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts> {
        let (sessions, responses): (i64, i64) = self
            .query_row(
                "SELECT (SELECT COUNT(*) FROM sessions), (SELECT COUNT(*) FROM response_records)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| IntakeError::storage_with_source("failed to count rows", e))?;

        Ok(StoreCounts {
            sessions: u64::try_from(sessions).unwrap_or_default(),
            responses: u64::try_from(responses).unwrap_or_default(),
        })
    }
}
