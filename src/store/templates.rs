use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{TemplateDay, TemplateExercise, TemplateSet};
use crate::types::cannonical_muscle;

/// Read-only plan data. The engine only consumes the three lookups; the
/// TOML import exists so the CLI can seed plans, mirroring how programs
/// were imported before.
#[derive(Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

#[derive(Deserialize)]
pub struct DayImport {
    pub name: String,
    #[serde(default)]
    pub exercise: Vec<ExerciseImport>,
}

#[derive(Deserialize)]
pub struct ExerciseImport {
    pub name: String,
    pub muscle: String,
    #[serde(default)]
    pub set: Vec<SetImport>,
}

#[derive(Deserialize)]
pub struct SetImport {
    pub weight: Option<f64>,
    pub reps: Option<i64>,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn day(&self, day_id: &str) -> Result<Option<TemplateDay>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM template_days WHERE id = ? OR name = ?")
                .bind(day_id)
                .bind(day_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, name)| TemplateDay { id, name }))
    }

    pub async fn days(&self) -> Result<Vec<TemplateDay>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM template_days ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id, name)| TemplateDay { id, name }).collect())
    }

    pub async fn exercises_by_day(&self, day_id: &str) -> Result<Vec<TemplateExercise>> {
        let rows: Vec<(String, String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, day_id, name, muscle, order_index
            FROM template_exercises
            WHERE day_id = ?
            ORDER BY order_index
            "#,
        )
        .bind(day_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, day_id, name, muscle, order_index)| {
                Ok(TemplateExercise {
                    id,
                    day_id,
                    name,
                    muscle: muscle.parse().map_err(EngineError::Corrupt)?,
                    order_index,
                })
            })
            .collect()
    }

    pub async fn sets_by_exercise(&self, exercise_id: &str) -> Result<Vec<TemplateSet>> {
        let rows: Vec<(String, String, i64, Option<f64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT id, exercise_id, order_index, weight, reps
            FROM template_sets
            WHERE exercise_id = ?
            ORDER BY order_index
            "#,
        )
        .bind(exercise_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, exercise_id, order_index, weight, reps)| TemplateSet {
                id,
                exercise_id,
                order_index,
                weight,
                reps,
            })
            .collect())
    }

    /// Inserts a parsed day plan. Muscle names are validated before any row
    /// is written; the whole import is one transaction.
    pub async fn import_day(&self, import: &DayImport) -> Result<TemplateDay> {
        for ex in &import.exercise {
            if cannonical_muscle(&ex.muscle).is_none() {
                return Err(EngineError::Corrupt(format!(
                    "unknown muscle group `{}` for exercise `{}`",
                    ex.muscle, ex.name
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        let day_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO template_days (id, name) VALUES (?, ?)")
            .bind(&day_id)
            .bind(&import.name)
            .execute(&mut *tx)
            .await?;

        for (order, ex) in import.exercise.iter().enumerate() {
            let ex_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO template_exercises (id, day_id, name, muscle, order_index) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&ex_id)
            .bind(&day_id)
            .bind(&ex.name)
            .bind(cannonical_muscle(&ex.muscle).unwrap())
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;

            for (set_order, set) in ex.set.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO template_sets (id, exercise_id, order_index, weight, reps) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&ex_id)
                .bind(set_order as i64)
                .bind(set.weight)
                .bind(set.reps)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        Ok(TemplateDay { id: day_id, name: import.name.clone() })
    }
}
