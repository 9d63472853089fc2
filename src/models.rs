use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Muscle, SessionStatus, SetComparison, SetKind};

/// Timestamps are stored as fixed-width RFC 3339 TEXT (microsecond
/// precision, `Z` suffix) so SQL range comparisons stay lexicographic.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// One logged (or in-progress) training session. The session exclusively
/// owns its exercise list, and each exercise its set list; all mutation
/// goes through the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub exercises: Vec<SessionExercise>,
    pub totals: SessionTotals,
}

/// Finalized aggregates, zero until the session completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub total_sets: i64,
    pub total_tonnage: f64,
    pub total_volume: i64,
    pub average_intensity: f64,
    pub average_rest_seconds: f64,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExercise {
    pub id: String,
    pub name: String,
    pub muscle: Muscle,
    pub order_index: i64,
    pub sets: Vec<SessionSet>,
}

/// Planned values are seeded at creation, actual values at completion.
/// Previous values are read-only ghosts from the user's last relevant
/// session, shown for comparison and never fed into any aggregate.
/// `completed_at` being set is the sole "this set is done" signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSet {
    pub id: String,
    pub order_index: i64,
    pub planned_weight: Option<f64>,
    pub planned_reps: Option<i64>,
    pub previous: Option<PreviousValues>,
    pub actual: Option<ActualValues>,
    pub comparison: Option<SetComparison>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviousValues {
    pub weight: f64,
    pub reps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualValues {
    pub weight: f64,
    pub weight_kg: f64,
    pub reps: i64,
    pub rpe: Option<f64>,
    pub kind: SetKind,
    pub note: Option<String>,
}

impl WorkoutSession {
    pub fn new(user_id: &str, title: String, notes: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title,
            status: SessionStatus::InProgress,
            started_at,
            completed_at: None,
            notes,
            exercises: Vec::new(),
            totals: SessionTotals::default(),
        }
    }

    /// Appends an exercise; order index = current exercise count.
    pub fn push_exercise(&mut self, name: String, muscle: Muscle) -> &mut SessionExercise {
        let order_index = self.exercises.len() as i64;
        self.exercises.push(SessionExercise {
            id: Uuid::new_v4().to_string(),
            name,
            muscle,
            order_index,
            sets: Vec::new(),
        });

        self.exercises.last_mut().unwrap()
    }

    /// Position of a set within the tree, id-indexed.
    pub fn locate_set(&self, set_id: &str) -> Option<(usize, usize)> {
        for (ei, ex) in self.exercises.iter().enumerate() {
            if let Some(si) = ex.sets.iter().position(|s| s.id == set_id) {
                return Some((ei, si));
            }
        }

        None
    }

    pub fn exercise_by_id(&self, exercise_id: &str) -> Option<usize> {
        self.exercises.iter().position(|e| e.id == exercise_id)
    }

    /// All completed sets, paired with their owning exercise.
    pub fn completed_sets(&self) -> impl Iterator<Item = (&SessionExercise, &SessionSet)> {
        self.exercises
            .iter()
            .flat_map(|ex| ex.sets.iter().map(move |s| (ex, s)))
            .filter(|(_, s)| s.completed_at.is_some())
    }
}

impl SessionExercise {
    /// Appends a set; order index = current set count within the exercise.
    pub fn push_set(&mut self, planned_weight: Option<f64>, planned_reps: Option<i64>) -> &mut SessionSet {
        let order_index = self.sets.len() as i64;
        self.sets.push(SessionSet {
            id: Uuid::new_v4().to_string(),
            order_index,
            planned_weight,
            planned_reps,
            previous: None,
            actual: None,
            comparison: None,
            completed_at: None,
        });

        self.sets.last_mut().unwrap()
    }
}

/// All-time bests for one (user, exercise name) pair. Mutated only by the
/// analytics pass, and only when a candidate strictly beats the stored
/// value. `rep_records` maps a weight bracket (weight formatted to one
/// decimal) to the best rep count ever achieved at that weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExercisePr {
    pub user_id: String,
    pub exercise_name: String,
    pub best_weight: Option<f64>,
    pub best_weight_date: Option<DateTime<Utc>>,
    pub best_e1rm: Option<f64>,
    pub best_e1rm_date: Option<DateTime<Utc>>,
    pub best_session_volume: Option<i64>,
    pub best_session_volume_date: Option<DateTime<Utc>>,
    pub rep_records: BTreeMap<String, RepRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepRecord {
    pub reps: i64,
    pub date: DateTime<Utc>,
}

impl ExercisePr {
    pub fn new(user_id: &str, exercise_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            exercise_name: exercise_name.to_string(),
            best_weight: None,
            best_weight_date: None,
            best_e1rm: None,
            best_e1rm_date: None,
            best_session_volume: None,
            best_session_volume_date: None,
            rep_records: BTreeMap::new(),
        }
    }
}

/// Per-(user, ISO week) rollup, always recomputed from the completed
/// session history for the week, never incremented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStats {
    pub user_id: String,
    pub iso_year: i32,
    pub iso_week: u32,
    pub sessions: i64,
    pub total_sets: i64,
    pub total_tonnage: f64,
    pub total_volume: i64,
    pub total_duration_seconds: i64,
}

/// Per-(user, exercise, day) rollup, same recompute-not-increment rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyExerciseStats {
    pub user_id: String,
    pub exercise_name: String,
    pub day: String,
    pub sets: i64,
    pub tonnage: f64,
    pub volume: i64,
    pub max_weight: f64,
    pub best_e1rm: f64,
}

/// One kind of newly achieved personal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordKind {
    Weight(f64),
    OneRepMax(f64),
    SessionVolume(i64),
    RepsAtWeight { bracket: String, reps: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordNotice {
    pub exercise: String,
    pub kind: RecordKind,
}

impl std::fmt::Display for RecordNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RecordKind::Weight(w) => write!(f, "{}: best weight {}", self.exercise, w),
            RecordKind::OneRepMax(e) => write!(f, "{}: estimated 1RM {:.1}", self.exercise, e),
            RecordKind::SessionVolume(v) => write!(f, "{}: session volume {} reps", self.exercise, v),
            RecordKind::RepsAtWeight { bracket, reps } => {
                write!(f, "{}: {} reps at {}", self.exercise, reps, bracket)
            }
        }
    }
}

/// Parameters for starting a session.
#[derive(Debug, Clone, Default)]
pub struct StartSession {
    pub day_id: Option<String>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub repeat_last: bool,
}

/// Parameters for logging one set.
#[derive(Debug, Clone)]
pub struct CompleteSet {
    pub set_id: String,
    pub weight: f64,
    pub weight_kg: f64,
    pub reps: i64,
    pub rpe: Option<f64>,
    pub kind: SetKind,
    pub note: Option<String>,
    /// Overrides "now" as the completion stamp, for backfilled logs.
    pub completed_at: Option<DateTime<Utc>>,
}

/// `complete_set` outcome: the updated set plus a same-call signal that it
/// beats the exercise's stored weight or estimated-1RM record.
#[derive(Debug, Clone)]
pub struct LoggedSet {
    pub exercise_name: String,
    pub set: SessionSet,
    pub new_record: bool,
}

/// Finalized session together with any records it set.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub session: WorkoutSession,
    pub new_records: Vec<RecordNotice>,
}

#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub sessions: Vec<WorkoutSession>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Completed sets from the most recent completed session containing the
/// exercise, in original order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousExerciseData {
    pub session_id: String,
    pub performed_at: DateTime<Utc>,
    pub sets: Vec<PreviousSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousSet {
    pub weight: f64,
    pub reps: i64,
    pub rpe: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationEstimate {
    pub total_sets: i64,
    pub average_rest_seconds: f64,
    pub estimated_minutes: i64,
}

/// Plan data read from the template store. Read-only here; the engine only
/// uses it to seed new sessions and duration estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDay {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateExercise {
    pub id: String,
    pub day_id: String,
    pub name: String,
    pub muscle: Muscle,
    pub order_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSet {
    pub id: String,
    pub exercise_id: String,
    pub order_index: i64,
    pub weight: Option<f64>,
    pub reps: Option<i64>,
}
