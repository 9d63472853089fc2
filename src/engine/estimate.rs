use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::DurationEstimate;

use super::lifecycle::SessionEngine;

/// Seconds of work assumed per set, on top of the rest interval.
const SECONDS_PER_SET: f64 = 30.0;

/// Rest assumed for users with no logged history yet.
const DEFAULT_REST_SECONDS: f64 = 90.0;

impl SessionEngine {
    /// Expected duration of a day plan: planned sets × (30 s of work +
    /// the user's average rest), truncated to whole minutes. A day with no
    /// exercises estimates to zero across the board rather than erroring.
    pub async fn estimate_duration(&self, user_id: &str, day_id: &str) -> Result<DurationEstimate> {
        let Some(day) = self.templates.day(day_id).await? else {
            return Err(EngineError::NotFound("template day"));
        };

        let mut total_sets = 0i64;
        for ex in self.templates.exercises_by_day(&day.id).await? {
            total_sets += self.templates.sets_by_exercise(&ex.id).await?.len() as i64;
        }

        if total_sets == 0 {
            return Ok(DurationEstimate::default());
        }

        // Best-effort lookup; no history (or a zero average) falls back to
        // the default rather than failing the estimate.
        let average_rest_seconds = match self.stats.average_rest_seconds(user_id).await {
            Ok(Some(avg)) if avg > 0.0 => avg,
            Ok(_) => DEFAULT_REST_SECONDS,
            Err(e) => {
                debug!(error = %e, "rest-average lookup failed, using default");
                DEFAULT_REST_SECONDS
            }
        };

        let estimated_seconds = total_sets as f64 * (SECONDS_PER_SET + average_rest_seconds);

        Ok(DurationEstimate {
            total_sets,
            average_rest_seconds,
            estimated_minutes: (estimated_seconds / 60.0) as i64,
        })
    }
}
