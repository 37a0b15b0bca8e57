//! Authoritative SQLite store for tracked records and their transition log.
//!
//! [`Store::commit_transition`] is the only path that changes a record's
//! status. It validates, updates and appends the log row in one transaction.
//! The transaction takes the database write lock before reading, so a racing
//! request waits for the winner and then validates against the new status;
//! the status update also carries an optimistic guard on the status it read.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{LintasError, Result};
use crate::state_machine::{EntityKind, Payload, Record, StageGraph, StatusTransition};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// How long a commit waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLITE_BUSY, SQLITE_LOCKED and their extended codes.
fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
        }
        _ => false,
    }
}

#[derive(Debug, FromRow)]
struct EntityRow {
    id: i64,
    current_status: String,
    partition_date: NaiveDate,
    payload: String,
    created_at_us: i64,
    updated_at_us: i64,
}

#[derive(Debug, FromRow)]
struct TransitionRow {
    id: i64,
    entity_id: i64,
    from_status: String,
    to_status: String,
    transitioned_at_us: i64,
    transitioned_by: String,
    notes: String,
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| LintasError::CorruptRow(format!("timestamp out of range: {us}")))
}

impl EntityRow {
    fn into_record<P: Payload>(self) -> Result<Record<P>> {
        Ok(Record {
            id: self.id,
            status: self.current_status,
            partition_date: self.partition_date,
            payload: serde_json::from_str(&self.payload)?,
            created_at: from_micros(self.created_at_us)?,
            updated_at: from_micros(self.updated_at_us)?,
        })
    }
}

impl TransitionRow {
    fn into_transition(self, kind: EntityKind) -> Result<StatusTransition> {
        Ok(StatusTransition {
            id: self.id,
            entity_kind: kind,
            entity_id: self.entity_id,
            from_status: self.from_status,
            to_status: self.to_status,
            transitioned_at: from_micros(self.transitioned_at_us)?,
            transitioned_by: self.transitioned_by,
            notes: self.notes,
        })
    }
}

/// Handle to the authoritative store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect, creating the database file if needed, and run migrations.
    ///
    /// `sqlite::memory:` databases are per connection, so callers using one
    /// must pass `max_connections = 1`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a record with the given initial status. No transition row is
    /// written: the log starts with the first accepted change.
    pub async fn insert<P: Payload>(
        &self,
        status: &str,
        partition_date: NaiveDate,
        payload: &P,
    ) -> Result<Record<P>> {
        let now = Utc::now();
        let now_us = now.timestamp_micros();
        let body = serde_json::to_string(payload)?;

        let id = sqlx::query(
            r#"
            INSERT INTO tracked_entity
                (kind, current_status, partition_date, payload, created_at_us, updated_at_us)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(P::KIND.as_str())
        .bind(status)
        .bind(partition_date)
        .bind(&body)
        .bind(now_us)
        .bind(now_us)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(kind = %P::KIND, entity_id = id, status, "record inserted");

        Ok(Record {
            id,
            status: status.to_string(),
            partition_date,
            payload: payload.clone(),
            created_at: from_micros(now_us)?,
            updated_at: from_micros(now_us)?,
        })
    }

    /// Load the current state of a record.
    pub async fn lookup<P: Payload>(&self, id: i64) -> Result<Record<P>> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT id, current_status, partition_date, payload, created_at_us, updated_at_us
            FROM tracked_entity
            WHERE kind = ? AND id = ?
            "#,
        )
        .bind(P::KIND.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LintasError::NotFound { kind: P::KIND, id })?;

        row.into_record()
    }

    /// Ids of every record of `kind`, optionally limited to one partition day.
    pub async fn list_ids(&self, kind: EntityKind, date: Option<NaiveDate>) -> Result<Vec<i64>> {
        let ids = match date {
            Some(date) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM tracked_entity WHERE kind = ? AND partition_date = ? ORDER BY id",
                )
                .bind(kind.as_str())
                .bind(date)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM tracked_entity WHERE kind = ? ORDER BY id",
                )
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(ids)
    }

    /// Validate and apply a status change atomically.
    ///
    /// Returns the updated record and the appended log row. On any error the
    /// transaction is dropped and rolled back, leaving the record unchanged.
    /// Lock contention that outlasts the busy timeout is `Contended`.
    pub async fn commit_transition<P: Payload>(
        &self,
        graph: &StageGraph,
        id: i64,
        new_status: &str,
        actor: &str,
        notes: &str,
    ) -> Result<(Record<P>, StatusTransition)> {
        match self
            .apply_transition::<P>(graph, id, new_status, actor, notes)
            .await
        {
            Err(LintasError::Transaction(err)) if is_contention(&err) => {
                Err(LintasError::Contended { kind: P::KIND, id })
            }
            result => result,
        }
    }

    async fn apply_transition<P: Payload>(
        &self,
        graph: &StageGraph,
        id: i64,
        new_status: &str,
        actor: &str,
        notes: &str,
    ) -> Result<(Record<P>, StatusTransition)> {
        let mut tx = self.pool.begin().await?;

        // Write first: a deferred transaction that reads before writing
        // cannot wait for the lock and fails with SQLITE_BUSY instead.
        sqlx::query("UPDATE tracked_entity SET updated_at_us = updated_at_us WHERE kind = ? AND id = ?")
            .bind(P::KIND.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT id, current_status, partition_date, payload, created_at_us, updated_at_us
            FROM tracked_entity
            WHERE kind = ? AND id = ?
            "#,
        )
        .bind(P::KIND.as_str())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LintasError::NotFound { kind: P::KIND, id })?;

        let from = row.current_status.clone();
        graph.validate(&from, new_status)?;

        let last_us: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(transitioned_at_us) FROM status_transition WHERE entity_kind = ? AND entity_id = ?",
        )
        .bind(P::KIND.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let now_us = match last_us {
            Some(last) => Utc::now().timestamp_micros().max(last + 1),
            None => Utc::now().timestamp_micros(),
        };

        let updated = sqlx::query(
            r#"
            UPDATE tracked_entity
            SET current_status = ?, updated_at_us = ?
            WHERE kind = ? AND id = ? AND current_status = ?
            "#,
        )
        .bind(new_status)
        .bind(now_us)
        .bind(P::KIND.as_str())
        .bind(id)
        .bind(&from)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(LintasError::Conflict {
                kind: P::KIND,
                id,
                expected: from,
            });
        }

        let transition_id = sqlx::query(
            r#"
            INSERT INTO status_transition
                (entity_kind, entity_id, from_status, to_status, transitioned_at_us, transitioned_by, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(P::KIND.as_str())
        .bind(id)
        .bind(&from)
        .bind(new_status)
        .bind(now_us)
        .bind(actor)
        .bind(notes)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        let at = from_micros(now_us)?;
        let mut record: Record<P> = row.into_record()?;
        record.status = new_status.to_string();
        record.updated_at = at;

        let transition = StatusTransition {
            id: transition_id,
            entity_kind: P::KIND,
            entity_id: id,
            from_status: from,
            to_status: new_status.to_string(),
            transitioned_at: at,
            transitioned_by: actor.to_string(),
            notes: notes.to_string(),
        };

        Ok((record, transition))
    }

    /// The transition log of one record, oldest first.
    pub async fn transitions(&self, kind: EntityKind, id: i64) -> Result<Vec<StatusTransition>> {
        let rows = sqlx::query_as::<_, TransitionRow>(
            r#"
            SELECT id, entity_id, from_status, to_status, transitioned_at_us, transitioned_by, notes
            FROM status_transition
            WHERE entity_kind = ? AND entity_id = ?
            ORDER BY transitioned_at_us, id
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| row.into_transition(kind)).collect()
    }
}
