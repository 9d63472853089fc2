use std::collections::BTreeMap;

use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{DailyExerciseStats, ExercisePr, RepRecord, WeeklyStats, format_ts, parse_ts};

/// Persists the derived records: per-exercise PRs, weekly and daily
/// rollups, and the rolling rest-time average. Rollup rows are always
/// replaced wholesale; only the rest average is maintained incrementally.
#[derive(Clone)]
pub struct StatsStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PrRow {
    user_id: String,
    exercise_name: String,
    best_weight: Option<f64>,
    best_weight_date: Option<String>,
    best_e1rm: Option<f64>,
    best_e1rm_date: Option<String>,
    best_session_volume: Option<i64>,
    best_session_volume_date: Option<String>,
    rep_records: String,
}

impl StatsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exercise_pr(&self, user_id: &str, exercise_name: &str) -> Result<Option<ExercisePr>> {
        let row: Option<PrRow> = sqlx::query_as(
            r#"
            SELECT user_id, exercise_name, best_weight, best_weight_date, best_e1rm, best_e1rm_date,
                   best_session_volume, best_session_volume_date, rep_records
            FROM exercise_prs
            WHERE user_id = ? AND exercise_name = ?
            "#,
        )
        .bind(user_id)
        .bind(exercise_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let rep_records: BTreeMap<String, RepRecord> = serde_json::from_str(&row.rep_records)?;

        Ok(Some(ExercisePr {
            best_weight_date: row.best_weight_date.as_deref().map(parse_ts).transpose()?,
            best_e1rm_date: row.best_e1rm_date.as_deref().map(parse_ts).transpose()?,
            best_session_volume_date: row
                .best_session_volume_date
                .as_deref()
                .map(parse_ts)
                .transpose()?,
            user_id: row.user_id,
            exercise_name: row.exercise_name,
            best_weight: row.best_weight,
            best_e1rm: row.best_e1rm,
            best_session_volume: row.best_session_volume,
            rep_records,
        }))
    }

    pub async fn upsert_exercise_pr(&self, pr: &ExercisePr) -> Result<()> {
        let rep_records = serde_json::to_string(&pr.rep_records)?;

        sqlx::query(
            r#"
            INSERT INTO exercise_prs
            (user_id, exercise_name, best_weight, best_weight_date, best_e1rm, best_e1rm_date,
             best_session_volume, best_session_volume_date, rep_records)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, exercise_name) DO UPDATE SET
                best_weight = excluded.best_weight,
                best_weight_date = excluded.best_weight_date,
                best_e1rm = excluded.best_e1rm,
                best_e1rm_date = excluded.best_e1rm_date,
                best_session_volume = excluded.best_session_volume,
                best_session_volume_date = excluded.best_session_volume_date,
                rep_records = excluded.rep_records
            "#,
        )
        .bind(&pr.user_id)
        .bind(&pr.exercise_name)
        .bind(pr.best_weight)
        .bind(pr.best_weight_date.map(format_ts))
        .bind(pr.best_e1rm)
        .bind(pr.best_e1rm_date.map(format_ts))
        .bind(pr.best_session_volume)
        .bind(pr.best_session_volume_date.map(format_ts))
        .bind(rep_records)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_weekly_stats(&self, stats: &WeeklyStats) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO weekly_stats
            (user_id, iso_year, iso_week, sessions, total_sets, total_tonnage, total_volume, total_duration_seconds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, iso_year, iso_week) DO UPDATE SET
                sessions = excluded.sessions,
                total_sets = excluded.total_sets,
                total_tonnage = excluded.total_tonnage,
                total_volume = excluded.total_volume,
                total_duration_seconds = excluded.total_duration_seconds
            "#,
        )
        .bind(&stats.user_id)
        .bind(stats.iso_year)
        .bind(stats.iso_week as i64)
        .bind(stats.sessions)
        .bind(stats.total_sets)
        .bind(stats.total_tonnage)
        .bind(stats.total_volume)
        .bind(stats.total_duration_seconds)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn weekly_stats(
        &self,
        user_id: &str,
        iso_year: i32,
        iso_week: u32,
    ) -> Result<Option<WeeklyStats>> {
        let row: Option<(i64, i64, f64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT sessions, total_sets, total_tonnage, total_volume, total_duration_seconds
            FROM weekly_stats
            WHERE user_id = ? AND iso_year = ? AND iso_week = ?
            "#,
        )
        .bind(user_id)
        .bind(iso_year)
        .bind(iso_week as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(sessions, total_sets, total_tonnage, total_volume, total_duration_seconds)| {
            WeeklyStats {
                user_id: user_id.to_string(),
                iso_year,
                iso_week,
                sessions,
                total_sets,
                total_tonnage,
                total_volume,
                total_duration_seconds,
            }
        }))
    }

    pub async fn upsert_daily_stats(&self, stats: &DailyExerciseStats) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_exercise_stats
            (user_id, exercise_name, day, sets, tonnage, volume, max_weight, best_e1rm)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, exercise_name, day) DO UPDATE SET
                sets = excluded.sets,
                tonnage = excluded.tonnage,
                volume = excluded.volume,
                max_weight = excluded.max_weight,
                best_e1rm = excluded.best_e1rm
            "#,
        )
        .bind(&stats.user_id)
        .bind(&stats.exercise_name)
        .bind(&stats.day)
        .bind(stats.sets)
        .bind(stats.tonnage)
        .bind(stats.volume)
        .bind(stats.max_weight)
        .bind(stats.best_e1rm)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn daily_stats(
        &self,
        user_id: &str,
        exercise_name: &str,
        day: &str,
    ) -> Result<Option<DailyExerciseStats>> {
        let row: Option<(i64, f64, i64, f64, f64)> = sqlx::query_as(
            r#"
            SELECT sets, tonnage, volume, max_weight, best_e1rm
            FROM daily_exercise_stats
            WHERE user_id = ? AND exercise_name = ? AND day = ?
            "#,
        )
        .bind(user_id)
        .bind(exercise_name)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(sets, tonnage, volume, max_weight, best_e1rm)| DailyExerciseStats {
            user_id: user_id.to_string(),
            exercise_name: exercise_name.to_string(),
            day: day.to_string(),
            sets,
            tonnage,
            volume,
            max_weight,
            best_e1rm,
        }))
    }

    /// Rolling average rest time between sets, `None` until the user has
    /// at least one completed session with two or more sets.
    pub async fn average_rest_seconds(&self, user_id: &str) -> Result<Option<f64>> {
        let avg: Option<f64> =
            sqlx::query_scalar("SELECT average_seconds FROM rest_stats WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(avg)
    }

    /// Folds a session's observed rest gaps into the rolling average by
    /// weighted mean over the sample count.
    pub async fn record_rest_observations(&self, user_id: &str, gaps: &[f64]) -> Result<()> {
        if gaps.is_empty() {
            return Ok(());
        }

        let current: Option<(f64, i64)> =
            sqlx::query_as("SELECT average_seconds, samples FROM rest_stats WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let (avg, samples) = current.unwrap_or((0.0, 0));
        let sum: f64 = gaps.iter().sum();
        let merged_samples = samples + gaps.len() as i64;
        let merged_avg = (avg * samples as f64 + sum) / merged_samples as f64;

        sqlx::query(
            r#"
            INSERT INTO rest_stats (user_id, average_seconds, samples)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                average_seconds = excluded.average_seconds,
                samples = excluded.samples
            "#,
        )
        .bind(user_id)
        .bind(merged_avg)
        .bind(merged_samples)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
