use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::{EngineError, Result};
use crate::models::{
    ActualValues, PreviousValues, SessionExercise, SessionSet, SessionTotals, WorkoutSession,
    format_ts, parse_ts,
};
use crate::types::SessionStatus;

// Lexicographic sentinels for open-ended history ranges.
const TS_MIN: &str = "0000-01-01T00:00:00.000000Z";
const TS_MAX: &str = "9999-12-31T23:59:59.999999Z";

/// Persists whole session trees. A session is always loaded and saved as a
/// unit; updates rewrite the child rows inside one transaction so the
/// stored tree can never drift from the in-memory one.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    title: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    notes: Option<String>,
    total_sets: i64,
    total_tonnage: f64,
    total_volume: i64,
    average_intensity: f64,
    average_rest_seconds: f64,
    duration_seconds: i64,
}

#[derive(sqlx::FromRow)]
struct ExerciseRow {
    id: String,
    name: String,
    muscle: String,
    order_index: i64,
}

#[derive(sqlx::FromRow)]
struct SetRow {
    id: String,
    order_index: i64,
    planned_weight: Option<f64>,
    planned_reps: Option<i64>,
    previous_weight: Option<f64>,
    previous_reps: Option<i64>,
    actual_weight: Option<f64>,
    actual_weight_kg: Option<f64>,
    actual_reps: Option<i64>,
    rpe: Option<f64>,
    kind: Option<String>,
    note: Option<String>,
    comparison: Option<String>,
    completed_at: Option<String>,
}

const SESSION_COLUMNS: &str = "id, user_id, title, status, started_at, completed_at, notes, \
     total_sets, total_tonnage, total_volume, average_intensity, average_rest_seconds, duration_seconds";

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &WorkoutSession) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            r#"
            INSERT INTO sessions
            (id, user_id, title, status, started_at, completed_at, notes,
             total_sets, total_tonnage, total_volume, average_intensity, average_rest_seconds, duration_seconds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.title)
        .bind(session.status.as_str())
        .bind(format_ts(session.started_at))
        .bind(session.completed_at.map(format_ts))
        .bind(&session.notes)
        .bind(session.totals.total_sets)
        .bind(session.totals.total_tonnage)
        .bind(session.totals.total_volume)
        .bind(session.totals.average_intensity)
        .bind(session.totals.average_rest_seconds)
        .bind(session.totals.duration_seconds)
        .execute(&mut *tx)
        .await;

        match res {
            Ok(_) => {}
            // 2067 = SQLITE_CONSTRAINT_UNIQUE: the partial index on the
            // active-session slot lost the race to a concurrent start.
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some("2067".into()) => {
                return Err(EngineError::ConflictingState("a session is already in progress"));
            }
            Err(e) => return Err(e.into()),
        }

        insert_children(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rewrites the full tree: session row updated in place, child rows
    /// deleted and reinserted with their ids preserved.
    pub async fn update(&self, session: &WorkoutSession) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE sessions
            SET title = ?, status = ?, started_at = ?, completed_at = ?, notes = ?,
                total_sets = ?, total_tonnage = ?, total_volume = ?,
                average_intensity = ?, average_rest_seconds = ?, duration_seconds = ?
            WHERE id = ?
            "#,
        )
        .bind(&session.title)
        .bind(session.status.as_str())
        .bind(format_ts(session.started_at))
        .bind(session.completed_at.map(format_ts))
        .bind(&session.notes)
        .bind(session.totals.total_sets)
        .bind(session.totals.total_tonnage)
        .bind(session.totals.total_volume)
        .bind(session.totals.average_intensity)
        .bind(session.totals.average_rest_seconds)
        .bind(session.totals.duration_seconds)
        .bind(&session.id)
        .execute(&mut *tx)
        .await?;

        // Cascade removes the set rows.
        sqlx::query("DELETE FROM session_exercises WHERE session_id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        insert_children(&mut tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(&self, session_id: &str) -> Result<Option<WorkoutSession>> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_active_for_user(&self, user_id: &str) -> Result<Option<WorkoutSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ? AND status = 'in_progress'"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn history(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<WorkoutSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE user_id = ? AND started_at >= ? AND started_at <= ?
            ORDER BY started_at DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user_id)
        .bind(from.map(format_ts).unwrap_or_else(|| TS_MIN.to_string()))
        .bind(to.map(format_ts).unwrap_or_else(|| TS_MAX.to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(self.assemble(row).await?);
        }

        Ok(sessions)
    }

    pub async fn history_count(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ? AND started_at >= ? AND started_at <= ?",
        )
        .bind(user_id)
        .bind(from.map(format_ts).unwrap_or_else(|| TS_MIN.to_string()))
        .bind(to.map(format_ts).unwrap_or_else(|| TS_MAX.to_string()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn last_completed(&self, user_id: &str) -> Result<Option<WorkoutSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE user_id = ? AND status = 'completed'
            ORDER BY started_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn last_completed_with_exercise(
        &self,
        user_id: &str,
        exercise_name: &str,
    ) -> Result<Option<WorkoutSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT DISTINCT s.{}
            FROM sessions s
            JOIN session_exercises e ON e.session_id = s.id
            WHERE s.user_id = ? AND s.status = 'completed' AND e.name = ?
            ORDER BY s.started_at DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS.replace(", ", ", s.")
        ))
        .bind(user_id)
        .bind(exercise_name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    /// Completed sessions whose start time falls in `[from, to)`. This is
    /// the rollup input: abandoned and in-progress sessions never count.
    pub async fn completed_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkoutSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE user_id = ? AND status = 'completed' AND started_at >= ? AND started_at < ?
            ORDER BY started_at
            "#
        ))
        .bind(user_id)
        .bind(format_ts(from))
        .bind(format_ts(to))
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(self.assemble(row).await?);
        }

        Ok(sessions)
    }

    async fn assemble(&self, row: SessionRow) -> Result<WorkoutSession> {
        let ex_rows: Vec<ExerciseRow> = sqlx::query_as(
            "SELECT id, name, muscle, order_index FROM session_exercises WHERE session_id = ? ORDER BY order_index",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let mut exercises = Vec::with_capacity(ex_rows.len());
        for ex in ex_rows {
            let set_rows: Vec<SetRow> = sqlx::query_as(
                r#"
                SELECT id, order_index, planned_weight, planned_reps, previous_weight, previous_reps,
                       actual_weight, actual_weight_kg, actual_reps, rpe, kind, note, comparison, completed_at
                FROM session_sets
                WHERE exercise_id = ?
                ORDER BY order_index
                "#,
            )
            .bind(&ex.id)
            .fetch_all(&self.pool)
            .await?;

            let mut sets = Vec::with_capacity(set_rows.len());
            for set in set_rows {
                sets.push(set.try_into()?);
            }

            exercises.push(SessionExercise {
                id: ex.id,
                name: ex.name,
                muscle: ex.muscle.parse().map_err(EngineError::Corrupt)?,
                order_index: ex.order_index,
                sets,
            });
        }

        Ok(WorkoutSession {
            status: row.status.parse().map_err(EngineError::Corrupt)?,
            started_at: parse_ts(&row.started_at)?,
            completed_at: row.completed_at.as_deref().map(parse_ts).transpose()?,
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            notes: row.notes,
            exercises,
            totals: SessionTotals {
                total_sets: row.total_sets,
                total_tonnage: row.total_tonnage,
                total_volume: row.total_volume,
                average_intensity: row.average_intensity,
                average_rest_seconds: row.average_rest_seconds,
                duration_seconds: row.duration_seconds,
            },
        })
    }
}

impl TryFrom<SetRow> for SessionSet {
    type Error = EngineError;

    fn try_from(row: SetRow) -> Result<SessionSet> {
        let actual = match (row.actual_weight, row.actual_weight_kg, row.actual_reps, row.kind) {
            (Some(weight), Some(weight_kg), Some(reps), Some(kind)) => Some(ActualValues {
                weight,
                weight_kg,
                reps,
                rpe: row.rpe,
                kind: kind.parse().map_err(EngineError::Corrupt)?,
                note: row.note,
            }),
            _ => None,
        };

        Ok(SessionSet {
            id: row.id,
            order_index: row.order_index,
            planned_weight: row.planned_weight,
            planned_reps: row.planned_reps,
            previous: row
                .previous_weight
                .zip(row.previous_reps)
                .map(|(weight, reps)| PreviousValues { weight, reps }),
            actual,
            comparison: row
                .comparison
                .as_deref()
                .map(|c| c.parse().map_err(EngineError::Corrupt))
                .transpose()?,
            completed_at: row.completed_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

async fn insert_children(tx: &mut Transaction<'_, Sqlite>, session: &WorkoutSession) -> Result<()> {
    for ex in &session.exercises {
        sqlx::query(
            "INSERT INTO session_exercises (id, session_id, name, muscle, order_index) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&ex.id)
        .bind(&session.id)
        .bind(&ex.name)
        .bind(ex.muscle.to_string())
        .bind(ex.order_index)
        .execute(&mut **tx)
        .await?;

        for set in &ex.sets {
            sqlx::query(
                r#"
                INSERT INTO session_sets
                (id, exercise_id, order_index, planned_weight, planned_reps, previous_weight, previous_reps,
                 actual_weight, actual_weight_kg, actual_reps, rpe, kind, note, comparison, completed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&set.id)
            .bind(&ex.id)
            .bind(set.order_index)
            .bind(set.planned_weight)
            .bind(set.planned_reps)
            .bind(set.previous.map(|p| p.weight))
            .bind(set.previous.map(|p| p.reps))
            .bind(set.actual.as_ref().map(|a| a.weight))
            .bind(set.actual.as_ref().map(|a| a.weight_kg))
            .bind(set.actual.as_ref().map(|a| a.reps))
            .bind(set.actual.as_ref().and_then(|a| a.rpe))
            .bind(set.actual.as_ref().map(|a| a.kind.as_str()))
            .bind(set.actual.as_ref().and_then(|a| a.note.clone()))
            .bind(set.comparison.map(|c| c.as_str()))
            .bind(set.completed_at.map(format_ts))
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}
