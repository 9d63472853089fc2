use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::models::{
    ActualValues, CompleteSet, CompletedSession, DailyExerciseStats, ExercisePr, HistoryPage,
    LoggedSet, PreviousExerciseData, PreviousSet, PreviousValues, SessionExercise, SessionSet,
    StartSession, WeeklyStats, WorkoutSession,
};
use crate::store::{SessionStore, StatsStore, TemplateStore};
use crate::types::{Muscle, SessionStatus};

use super::analytics;

/// The session state machine. Owns no state of its own; every operation is
/// a read-modify-write against the stores, and the finalized session is
/// handed to the analytics pass exactly once, at completion.
pub struct SessionEngine {
    pub(crate) sessions: SessionStore,
    pub(crate) stats: StatsStore,
    pub(crate) templates: TemplateStore,
}

impl SessionEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            sessions: SessionStore::new(pool.clone()),
            stats: StatsStore::new(pool.clone()),
            templates: TemplateStore::new(pool),
        }
    }

    /// Starts a session for `user_id`. Fails with a conflicting-state error
    /// while another session is in progress; the store's unique active-slot
    /// index backs this check against concurrent starts.
    pub async fn start(&self, user_id: &str, req: StartSession) -> Result<WorkoutSession> {
        if self.sessions.get_active_for_user(user_id).await?.is_some() {
            return Err(EngineError::ConflictingState("a session is already in progress"));
        }

        let now = Utc::now();
        let session = if req.repeat_last {
            self.seed_from_last(user_id, req, now).await?
        } else if req.day_id.is_some() {
            self.seed_from_template(user_id, req, now).await?
        } else {
            WorkoutSession::new(
                user_id,
                req.title.unwrap_or_else(|| "Workout".to_string()),
                req.notes,
                now,
            )
        };

        self.sessions.create(&session).await?;
        info!(session_id = %session.id, title = %session.title, "session started");
        Ok(session)
    }

    /// Copies the structure of the user's most recent completed session:
    /// same title, exercises and planned sets, with that session's actual
    /// values carried over as the new sets' ghost values.
    async fn seed_from_last(
        &self,
        user_id: &str,
        req: StartSession,
        now: DateTime<Utc>,
    ) -> Result<WorkoutSession> {
        let Some(last) = self.sessions.last_completed(user_id).await? else {
            return Err(EngineError::NotFound("completed session to repeat"));
        };

        let title = req.title.unwrap_or_else(|| last.title.clone());
        let mut session = WorkoutSession::new(user_id, title, req.notes, now);

        for old_ex in &last.exercises {
            let ex = session.push_exercise(old_ex.name.clone(), old_ex.muscle);
            for old_set in &old_ex.sets {
                let set = ex.push_set(old_set.planned_weight, old_set.planned_reps);
                set.previous = old_set
                    .actual
                    .as_ref()
                    .map(|a| PreviousValues { weight: a.weight, reps: a.reps });
            }
        }

        Ok(session)
    }

    /// Seeds from a day plan. Ghost values come from the user's last
    /// completed session containing a same-named exercise, mapped
    /// positionally; that lookup is best-effort and never fails the start.
    async fn seed_from_template(
        &self,
        user_id: &str,
        req: StartSession,
        now: DateTime<Utc>,
    ) -> Result<WorkoutSession> {
        let day_id = req.day_id.as_deref().unwrap();
        let Some(day) = self.templates.day(day_id).await? else {
            return Err(EngineError::NotFound("template day"));
        };

        let title = req.title.unwrap_or_else(|| day.name.clone());
        let mut session = WorkoutSession::new(user_id, title, req.notes, now);

        for tex in self.templates.exercises_by_day(&day.id).await? {
            let planned = self.templates.sets_by_exercise(&tex.id).await?;

            let ghosts = match self.sessions.last_completed_with_exercise(user_id, &tex.name).await {
                Ok(Some(prev)) => prev
                    .exercises
                    .iter()
                    .find(|e| e.name == tex.name)
                    .map(|e| {
                        e.sets
                            .iter()
                            .filter(|s| s.completed_at.is_some())
                            .filter_map(|s| s.actual.as_ref())
                            .map(|a| PreviousValues { weight: a.weight, reps: a.reps })
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    debug!(exercise = %tex.name, error = %e, "previous-set lookup failed, starting without ghosts");
                    Vec::new()
                }
            };

            let ex = session.push_exercise(tex.name, tex.muscle);
            for (i, tset) in planned.iter().enumerate() {
                let set = ex.push_set(tset.weight, tset.reps);
                set.previous = ghosts.get(i).copied();
            }
        }

        Ok(session)
    }

    /// Logs actual values onto a planned set and stamps its completion
    /// time. Returns the updated set together with a live signal of
    /// whether it beats the exercise's stored weight or e1RM record.
    pub async fn complete_set(
        &self,
        user_id: &str,
        session_id: &str,
        req: CompleteSet,
    ) -> Result<LoggedSet> {
        let mut session = self.owned(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::ConflictingState("session is not in progress"));
        }

        let Some((ei, si)) = session.locate_set(&req.set_id) else {
            return Err(EngineError::NotFound("set"));
        };

        let at = req.completed_at.unwrap_or_else(Utc::now);
        let exercise_name = session.exercises[ei].name.clone();

        let set = &mut session.exercises[ei].sets[si];
        set.comparison = set
            .previous
            .map(|p| analytics::compare_to_previous(p.weight, p.reps, req.weight, req.reps));
        set.actual = Some(ActualValues {
            weight: req.weight,
            weight_kg: req.weight_kg,
            reps: req.reps,
            rpe: req.rpe,
            kind: req.kind,
            note: req.note,
        });
        set.completed_at = Some(at);

        let stored = self.stats.exercise_pr(user_id, &exercise_name).await?;
        let new_record = analytics::beats_stored_pr(stored.as_ref(), req.weight, req.reps);

        self.sessions.update(&session).await?;
        debug!(session_id = %session.id, exercise = %exercise_name, new_record, "set logged");

        let set = session.exercises[ei].sets[si].clone();
        Ok(LoggedSet { exercise_name, set, new_record })
    }

    /// Clears the most recently completed set (by completion stamp) back
    /// to its planned state.
    pub async fn undo_last_set(&self, user_id: &str, session_id: &str) -> Result<SessionSet> {
        let mut session = self.owned(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::ConflictingState("session is not in progress"));
        }

        let target = session
            .exercises
            .iter()
            .enumerate()
            .flat_map(|(ei, ex)| {
                ex.sets
                    .iter()
                    .enumerate()
                    .filter_map(move |(si, s)| s.completed_at.map(|t| (t, ei, si)))
            })
            .max_by_key(|(t, ..)| *t);

        let Some((_, ei, si)) = target else {
            return Err(EngineError::ConflictingState("no completed sets to undo"));
        };

        let set = &mut session.exercises[ei].sets[si];
        set.actual = None;
        set.comparison = None;
        set.completed_at = None;

        self.sessions.update(&session).await?;
        Ok(session.exercises[ei].sets[si].clone())
    }

    /// Appends an exercise to an in-progress session; its order index is
    /// the current exercise count.
    pub async fn add_exercise(
        &self,
        user_id: &str,
        session_id: &str,
        name: &str,
        muscle: Muscle,
    ) -> Result<SessionExercise> {
        let mut session = self.owned(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::ConflictingState("session is not in progress"));
        }

        let ex = session.push_exercise(name.to_string(), muscle).clone();
        self.sessions.update(&session).await?;
        Ok(ex)
    }

    /// Appends a set. Omitted weight/reps fall back to the actual values
    /// of the exercise's most recently added set, so a lifter repeating
    /// their working weight logs nothing twice.
    pub async fn add_set(
        &self,
        user_id: &str,
        session_id: &str,
        exercise_id: &str,
        weight: Option<f64>,
        reps: Option<i64>,
    ) -> Result<SessionSet> {
        let mut session = self.owned(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::ConflictingState("session is not in progress"));
        }

        let Some(ei) = session.exercise_by_id(exercise_id) else {
            return Err(EngineError::NotFound("exercise"));
        };

        let ex = &mut session.exercises[ei];
        let continuity = ex.sets.last().and_then(|s| s.actual.as_ref()).map(|a| (a.weight, a.reps));
        let weight = weight.or(continuity.map(|(w, _)| w));
        let reps = reps.or(continuity.map(|(_, r)| r));

        let set = ex.push_set(weight, reps).clone();
        self.sessions.update(&session).await?;
        Ok(set)
    }

    /// Finalizes the session: aggregates, PR detection, rest average, and
    /// the weekly/daily rollup recomputation all happen here and nowhere
    /// else.
    pub async fn complete(
        &self,
        user_id: &str,
        session_id: &str,
        closing_note: Option<&str>,
    ) -> Result<CompletedSession> {
        let mut session = self.owned(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::ConflictingState("session is not in progress"));
        }

        let now = Utc::now();
        if let Some(note) = closing_note.filter(|n| !n.trim().is_empty()) {
            session.notes = Some(match session.notes.take() {
                Some(existing) => format!("{existing}\n{note}"),
                None => note.to_string(),
            });
        }

        session.totals = analytics::session_totals(&session, now);
        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        self.sessions.update(&session).await?;

        let mut new_records = Vec::new();
        for (name, cand) in analytics::pr_candidates(&session) {
            let mut pr = self
                .stats
                .exercise_pr(user_id, &name)
                .await?
                .unwrap_or_else(|| ExercisePr::new(user_id, &name));

            let notices = analytics::apply_candidate(&mut pr, &cand, now);
            if !notices.is_empty() {
                self.stats.upsert_exercise_pr(&pr).await?;
                new_records.extend(notices);
            }
        }

        // Optional enrichment: a failed rest-average update never fails
        // the completion.
        let gaps = analytics::rest_gaps(&session);
        if let Err(e) = self.stats.record_rest_observations(user_id, &gaps).await {
            warn!(error = %e, "failed to fold rest observations into the rolling average");
        }

        self.recompute_week(user_id, session.started_at).await?;
        let names: BTreeSet<String> = session.exercises.iter().map(|e| e.name.clone()).collect();
        for name in names {
            self.recompute_day(user_id, &name, session.started_at).await?;
        }

        info!(
            session_id = %session.id,
            sets = session.totals.total_sets,
            tonnage = session.totals.total_tonnage,
            records = new_records.len(),
            "session completed"
        );

        Ok(CompletedSession { session, new_records })
    }

    /// Marks the session abandoned. No aggregates, no PR or rollup writes;
    /// abandoned sessions are invisible to all analytics.
    pub async fn abandon(&self, user_id: &str, session_id: &str) -> Result<WorkoutSession> {
        let mut session = self.owned(user_id, session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::ConflictingState("session is not in progress"));
        }

        session.status = SessionStatus::Abandoned;
        session.completed_at = Some(Utc::now());
        self.sessions.update(&session).await?;

        info!(session_id = %session.id, "session abandoned");
        Ok(session)
    }

    pub async fn get_active(&self, user_id: &str) -> Result<Option<WorkoutSession>> {
        self.sessions.get_active_for_user(user_id).await
    }

    pub async fn get_by_id(&self, user_id: &str, session_id: &str) -> Result<WorkoutSession> {
        self.owned(user_id, session_id).await
    }

    /// Paged session history, newest first. `page` is 1-based.
    pub async fn get_history(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: i64,
        page_size: i64,
    ) -> Result<HistoryPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let sessions = self.sessions.history(user_id, from, to, offset, page_size).await?;
        let total = self.sessions.history_count(user_id, from, to).await?;

        Ok(HistoryPage { sessions, total, page, page_size })
    }

    /// Completed sets from the most recent completed session containing
    /// `exercise_name`. "Nothing there yet" is data, not an error.
    pub async fn previous_exercise_data(
        &self,
        user_id: &str,
        exercise_name: &str,
    ) -> Result<Option<PreviousExerciseData>> {
        let Some(session) = self.sessions.last_completed_with_exercise(user_id, exercise_name).await?
        else {
            return Ok(None);
        };

        let Some(ex) = session.exercises.iter().find(|e| e.name == exercise_name) else {
            return Ok(None);
        };

        let sets: Vec<PreviousSet> = ex
            .sets
            .iter()
            .filter(|s| s.completed_at.is_some())
            .filter_map(|s| s.actual.as_ref())
            .map(|a| PreviousSet { weight: a.weight, reps: a.reps, rpe: a.rpe })
            .collect();

        if sets.is_empty() {
            return Ok(None);
        }

        Ok(Some(PreviousExerciseData {
            session_id: session.id.clone(),
            performed_at: session.completed_at.unwrap_or(session.started_at),
            sets,
        }))
    }

    /// Recomputes the weekly rollup for the ISO week containing `at` from
    /// every completed session in that week, then overwrites the stored
    /// row. Idempotent by construction.
    pub async fn recompute_week(&self, user_id: &str, at: DateTime<Utc>) -> Result<WeeklyStats> {
        let (iso_year, iso_week) = analytics::iso_week_of(at);
        let (from, to) = analytics::week_range(iso_year, iso_week);

        let sessions = self.sessions.completed_in_range(user_id, from, to).await?;
        let stats = analytics::weekly_rollup(user_id, iso_year, iso_week, &sessions);
        self.stats.upsert_weekly_stats(&stats).await?;

        debug!(iso_year, iso_week, sessions = stats.sessions, "weekly rollup recomputed");
        Ok(stats)
    }

    /// Daily per-exercise counterpart of [`Self::recompute_week`].
    pub async fn recompute_day(
        &self,
        user_id: &str,
        exercise_name: &str,
        at: DateTime<Utc>,
    ) -> Result<DailyExerciseStats> {
        let (from, to) = analytics::day_range(at);
        let day = analytics::day_key(at);

        let sessions = self.sessions.completed_in_range(user_id, from, to).await?;
        let stats = analytics::daily_rollup(user_id, exercise_name, &day, &sessions);
        self.stats.upsert_daily_stats(&stats).await?;

        Ok(stats)
    }

    /// Ownership check. A session that exists but belongs to someone else
    /// reads exactly like one that does not exist.
    async fn owned(&self, user_id: &str, session_id: &str) -> Result<WorkoutSession> {
        match self.sessions.get_by_id(session_id).await? {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(EngineError::NotFound("session")),
        }
    }
}
