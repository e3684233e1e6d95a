//! PostgreSQL attendance store.
//!
//! `commit_transition` runs in one transaction: the participant row is locked
//! with `FOR UPDATE`, the event's sequence counter is bumped, the ledger row
//! is inserted and the roster row is updated only if the new stamp wins.
//! Concurrent scans for the same participant serialize on the row lock, and
//! scans anywhere in the event serialize briefly on the counter. The target
//! activity row is read `FOR SHARE`, so closing it for deletion waits for
//! in-flight check-ins and later check-ins see it closed.
//!
//! Snapshots are read in one `REPEATABLE READ READ ONLY` transaction so the
//! roster and the ledger come from the same database state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{AttendanceStore, CommittedTransition, StoreSnapshot, TransitionRequest};
use crate::config::StoreConfig;
use crate::engine::reconcile::{find_divergences, Divergence};
use crate::error::{ErrorCode, ErrorContext, Result, RollcallError};
use crate::model::{
    Activity, ActivityId, AttendanceLogEntry, EntryId, Event, EventId, Location, Participant,
    ParticipantCategory, ParticipantId, TransitionStamp,
};

/// Shared [`AttendanceStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the store configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| RollcallError::configuration("store.database_url is not set"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                RollcallError::new(ErrorCode::StoreQueryFailed, "Database migration failed")
                    .with_internal_message(e.to_string())
                    .with_source(e)
            })?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    active: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: EventId(row.id),
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    description: String,
    location: String,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Activity {
            id: ActivityId(row.id),
            event_id: EventId(row.event_id),
            name: row.name,
            description: row.description,
            location: row.location,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    affiliation: String,
    category: String,
    code: String,
    location_activity: Option<Uuid>,
    location_at: Option<DateTime<Utc>>,
    location_seq: Option<i64>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = RollcallError;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        let category = parse_category(&row.category)?;
        let location_stamp = match (row.location_at, row.location_seq) {
            (Some(at), Some(seq)) => Some(TransitionStamp::new(at, seq_from_db(seq))),
            _ => None,
        };
        Ok(Participant {
            id: ParticipantId(row.id),
            event_id: EventId(row.event_id),
            name: row.name,
            group: row.affiliation,
            category,
            code: row.code,
            location: Location::from(row.location_activity.map(ActivityId)),
            location_stamp,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    event_id: Uuid,
    participant_id: Uuid,
    activity_id: Option<Uuid>,
    ts: DateTime<Utc>,
    sequence: i64,
}

impl From<LogRow> for AttendanceLogEntry {
    fn from(row: LogRow) -> Self {
        AttendanceLogEntry {
            id: EntryId(row.id),
            event_id: EventId(row.event_id),
            participant_id: ParticipantId(row.participant_id),
            activity_id: row.activity_id.map(ActivityId),
            timestamp: row.ts,
            sequence: seq_from_db(row.sequence),
        }
    }
}

fn parse_category(value: &str) -> Result<ParticipantCategory> {
    match value {
        "student" => Ok(ParticipantCategory::Student),
        "leader" => Ok(ParticipantCategory::Leader),
        other => Err(RollcallError::with_internal(
            ErrorCode::SerializationError,
            "Unrecognized participant category",
            format!("category column holds {:?}", other),
        )),
    }
}

// Sequences start at 1 and never approach i64::MAX.
fn seq_from_db(value: i64) -> u64 {
    value.max(0) as u64
}

fn seq_to_db(value: u64) -> Result<i64> {
    i64::try_from(value).context("ledger sequence exceeds the BIGINT range")
}

const PARTICIPANT_COLUMNS: &str = "id, event_id, name, affiliation, category, code, \
     location_activity, location_at, location_seq";

const EVENT_COLUMNS: &str = "id, name, start_date, end_date, active";
const ACTIVITY_COLUMNS: &str = "id, event_id, name, description, location";
const LOG_COLUMNS: &str = "id, event_id, participant_id, activity_id, ts, sequence";

async fn select_event(conn: &mut PgConnection, event_id: EventId) -> Result<Option<Event>> {
    let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
    let row = sqlx::query_as::<_, EventRow>(&sql)
        .bind(event_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Event::from))
}

async fn select_participants(conn: &mut PgConnection, event_id: EventId) -> Result<Vec<Participant>> {
    let sql = format!(
        "SELECT {} FROM participants WHERE event_id = $1 ORDER BY id",
        PARTICIPANT_COLUMNS
    );
    let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
        .bind(event_id.0)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(Participant::try_from).collect()
}

async fn select_activities(conn: &mut PgConnection, event_id: EventId) -> Result<Vec<Activity>> {
    let sql = format!(
        "SELECT {} FROM activities WHERE event_id = $1 ORDER BY id",
        ACTIVITY_COLUMNS
    );
    let rows = sqlx::query_as::<_, ActivityRow>(&sql)
        .bind(event_id.0)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(Activity::from).collect())
}

async fn select_ledger(conn: &mut PgConnection, event_id: EventId) -> Result<Vec<AttendanceLogEntry>> {
    let sql = format!(
        "SELECT {} FROM attendance_log WHERE event_id = $1 ORDER BY sequence",
        LOG_COLUMNS
    );
    let rows = sqlx::query_as::<_, LogRow>(&sql)
        .bind(event_id.0)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(AttendanceLogEntry::from).collect())
}

async fn select_history(
    conn: &mut PgConnection,
    event_id: EventId,
    participant_id: ParticipantId,
) -> Result<Vec<AttendanceLogEntry>> {
    let sql = format!(
        "SELECT {} FROM attendance_log WHERE event_id = $1 AND participant_id = $2 ORDER BY sequence",
        LOG_COLUMNS
    );
    let rows = sqlx::query_as::<_, LogRow>(&sql)
        .bind(event_id.0)
        .bind(participant_id.0)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(AttendanceLogEntry::from).collect())
}

async fn lock_participant(
    tx: &mut Transaction<'_, Postgres>,
    event_id: EventId,
    participant_id: ParticipantId,
) -> Result<Option<Participant>> {
    let sql = format!(
        "SELECT {} FROM participants WHERE id = $1 AND event_id = $2 FOR UPDATE",
        PARTICIPANT_COLUMNS
    );
    let row = sqlx::query_as::<_, ParticipantRow>(&sql)
        .bind(participant_id.0)
        .bind(event_id.0)
        .fetch_optional(&mut **tx)
        .await?;
    row.map(Participant::try_from).transpose()
}

async fn write_location(
    tx: &mut Transaction<'_, Postgres>,
    participant: &Participant,
) -> Result<()> {
    let sequence = participant
        .location_stamp
        .map(|s| seq_to_db(s.sequence))
        .transpose()?;
    sqlx::query(
        r#"
        UPDATE participants
        SET location_activity = $2, location_at = $3, location_seq = $4
        WHERE id = $1
        "#,
    )
    .bind(participant.id.0)
    .bind(participant.location.activity().map(|a| a.0))
    .bind(participant.location_stamp.map(|s| s.timestamp))
    .bind(sequence)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl AttendanceStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_events(&self) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, name, start_date, end_date, active FROM events ORDER BY start_date",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn fetch_event(&self, event_id: EventId) -> Result<Option<Event>> {
        let mut conn = self.pool.acquire().await?;
        select_event(&mut conn, event_id).await
    }

    #[instrument(skip(self))]
    async fn fetch_participants(&self, event_id: EventId) -> Result<Vec<Participant>> {
        let mut conn = self.pool.acquire().await?;
        select_participants(&mut conn, event_id).await
    }

    #[instrument(skip(self))]
    async fn fetch_activities(&self, event_id: EventId) -> Result<Vec<Activity>> {
        let mut conn = self.pool.acquire().await?;
        select_activities(&mut conn, event_id).await
    }

    #[instrument(skip(self))]
    async fn fetch_ledger(&self, event_id: EventId) -> Result<Vec<AttendanceLogEntry>> {
        let mut conn = self.pool.acquire().await?;
        select_ledger(&mut conn, event_id).await
    }

    #[instrument(skip(self))]
    async fn fetch_snapshot(&self, event_id: EventId) -> Result<Option<StoreSnapshot>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(event) = select_event(&mut tx, event_id).await? else {
            return Ok(None);
        };
        let participants = select_participants(&mut tx, event_id).await?;
        let activities = select_activities(&mut tx, event_id).await?;
        let ledger = select_ledger(&mut tx, event_id).await?;
        tx.commit().await?;

        Ok(Some(StoreSnapshot {
            event,
            participants,
            activities,
            ledger,
        }))
    }

    async fn fetch_participant(&self, participant_id: ParticipantId) -> Result<Option<Participant>> {
        let sql = format!("SELECT {} FROM participants WHERE id = $1", PARTICIPANT_COLUMNS);
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(participant_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Participant::try_from).transpose()
    }

    async fn fetch_activity(&self, activity_id: ActivityId) -> Result<Option<Activity>> {
        let sql = format!("SELECT {} FROM activities WHERE id = $1", ACTIVITY_COLUMNS);
        let row = sqlx::query_as::<_, ActivityRow>(&sql)
            .bind(activity_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Activity::from))
    }

    async fn find_participant_by_code(
        &self,
        event_id: EventId,
        code: &str,
    ) -> Result<Option<Participant>> {
        let sql = format!(
            "SELECT {} FROM participants WHERE event_id = $1 AND code = $2",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(event_id.0)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Participant::try_from).transpose()
    }

    #[instrument(skip(self), fields(backend = "postgres"))]
    async fn commit_transition(&self, request: &TransitionRequest) -> Result<CommittedTransition> {
        let mut tx = self.pool.begin().await?;

        let mut participant = lock_participant(&mut tx, request.event_id, request.participant_id)
            .await?
            .ok_or_else(|| RollcallError::participant_not_found(request.participant_id))?;

        if let Location::Activity(activity_id) = request.target {
            let closed: Option<bool> = sqlx::query_scalar(
                "SELECT closed FROM activities WHERE id = $1 AND event_id = $2 FOR SHARE",
            )
            .bind(activity_id.0)
            .bind(request.event_id.0)
            .fetch_optional(&mut *tx)
            .await?;
            match closed {
                None => return Err(RollcallError::activity_not_found(activity_id)),
                Some(true) => return Err(RollcallError::activity_closed(activity_id)),
                Some(false) => {}
            }
        }

        let sequence: Option<i64> = sqlx::query_scalar(
            "UPDATE events SET last_sequence = last_sequence + 1 WHERE id = $1 RETURNING last_sequence",
        )
        .bind(request.event_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let sequence = sequence
            .map(seq_from_db)
            .ok_or_else(|| RollcallError::event_not_found(request.event_id))?;

        let entry = AttendanceLogEntry {
            id: EntryId::new(),
            event_id: request.event_id,
            participant_id: request.participant_id,
            activity_id: request.target.activity(),
            timestamp: request.timestamp,
            sequence,
        };

        sqlx::query(
            r#"
            INSERT INTO attendance_log (id, event_id, participant_id, activity_id, ts, sequence)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.0)
        .bind(entry.event_id.0)
        .bind(entry.participant_id.0)
        .bind(entry.activity_id.map(|a| a.0))
        .bind(entry.timestamp)
        .bind(seq_to_db(entry.sequence)?)
        .execute(&mut *tx)
        .await?;

        let previous = participant.location;
        let applied = participant.apply_location(request.target, entry.stamp());
        if applied {
            write_location(&mut tx, &participant).await?;
        }

        tx.commit().await?;
        debug!(sequence, applied, "Transition committed");

        Ok(CommittedTransition {
            entry,
            previous,
            current: participant.location,
            applied,
        })
    }

    #[instrument(skip(self), fields(backend = "postgres"))]
    async fn repair_location(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<Option<Divergence>> {
        let mut tx = self.pool.begin().await?;

        // Commits for this participant wait on the row lock, so the history
        // read below already contains every committed entry.
        let mut participant = lock_participant(&mut tx, event_id, participant_id)
            .await?
            .ok_or_else(|| RollcallError::participant_not_found(participant_id))?;
        let activities = select_activities(&mut tx, event_id).await?;
        let history = select_history(&mut tx, event_id, participant_id).await?;

        let divergence = find_divergences(std::slice::from_ref(&participant), &activities, &history)
            .into_iter()
            .next();
        if let Some(divergence) = &divergence {
            participant.force_location(divergence.expected, divergence.expected_stamp);
            write_location(&mut tx, &participant).await?;
        }

        tx.commit().await?;
        Ok(divergence)
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, name, start_date, end_date, active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id.0)
        .bind(&event.name)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_participant(&self, participant: &Participant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO participants
                (id, event_id, name, affiliation, category, code,
                 location_activity, location_at, location_seq)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(participant.id.0)
        .bind(participant.event_id.0)
        .bind(&participant.name)
        .bind(&participant.group)
        .bind(participant.category.as_str())
        .bind(&participant.code)
        .bind(participant.location.activity().map(|a| a.0))
        .bind(participant.location_stamp.map(|s| s.timestamp))
        .bind(
            participant
                .location_stamp
                .map(|s| seq_to_db(s.sequence))
                .transpose()?,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO activities (id, event_id, name, description, location)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(activity.id.0)
        .bind(activity.event_id.0)
        .bind(&activity.name)
        .bind(&activity.description)
        .bind(&activity.location)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let error = RollcallError::from(e);
                if error.code() == ErrorCode::DuplicateRecord {
                    Err(RollcallError::duplicate_activity(&activity.name).with_source(error))
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn update_activity(&self, activity: &Activity) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE activities
            SET name = $3, description = $4, location = $5
            WHERE id = $1 AND event_id = $2
            "#,
        )
        .bind(activity.id.0)
        .bind(activity.event_id.0)
        .bind(&activity.name)
        .bind(&activity.description)
        .bind(&activity.location)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(RollcallError::activity_not_found(activity.id)),
            Ok(_) => Ok(()),
            Err(e) => {
                let error = RollcallError::from(e);
                if error.code() == ErrorCode::DuplicateRecord {
                    Err(RollcallError::duplicate_activity(&activity.name).with_source(error))
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn close_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool> {
        let result = sqlx::query("UPDATE activities SET closed = TRUE WHERE event_id = $1 AND id = $2")
            .bind(event_id.0)
            .bind(activity_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_activity_entries(&self, event_id: EventId, activity_id: ActivityId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM attendance_log WHERE event_id = $1 AND activity_id = $2")
            .bind(event_id.0)
            .bind(activity_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn remove_activity(&self, event_id: EventId, activity_id: ActivityId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM activities WHERE event_id = $1 AND id = $2")
            .bind(event_id.0)
            .bind(activity_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_participant_entries(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM attendance_log WHERE event_id = $1 AND participant_id = $2")
                .bind(event_id.0)
                .bind(participant_id.0)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn remove_participant(&self, event_id: EventId, participant_id: ParticipantId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM participants WHERE event_id = $1 AND id = $2")
            .bind(event_id.0)
            .bind(participant_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
