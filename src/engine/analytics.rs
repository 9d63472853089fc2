use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use itertools::Itertools;

use crate::models::{
    DailyExerciseStats, ExercisePr, RecordKind, RecordNotice, RepRecord, SessionSet,
    SessionTotals, WeeklyStats, WorkoutSession,
};
use crate::types::SetComparison;

/// Epley estimated one-rep max: weight × (1 + reps / 30).
pub fn epley_e1rm(weight: f64, reps: i64) -> f64 {
    if reps == 0 {
        0.0
    } else {
        weight * (1.0 + reps as f64 / 30.0)
    }
}

/// Key for the reps-at-weight record map: weight formatted to one decimal,
/// so 100 and 100.04 land in the same bracket.
pub fn bracket_key(weight: f64) -> String {
    format!("{:.1}", weight)
}

/// Gaps in seconds between consecutive completed sets, in completion order.
pub fn rest_gaps(session: &WorkoutSession) -> Vec<f64> {
    let mut stamps: Vec<DateTime<Utc>> =
        session.completed_sets().filter_map(|(_, s)| s.completed_at).collect();
    stamps.sort();

    stamps
        .windows(2)
        .map(|w| ((w[1] - w[0]).num_milliseconds() as f64 / 1000.0).max(0.0))
        .collect()
}

/// Session-level aggregates over completed sets only. Tonnage uses the
/// kilogram weight; intensity is tonnage per rep, zero when nothing was
/// lifted.
pub fn session_totals(session: &WorkoutSession, completed_at: DateTime<Utc>) -> SessionTotals {
    let mut total_sets = 0i64;
    let mut total_tonnage = 0.0;
    let mut total_volume = 0i64;

    for (_, set) in session.completed_sets() {
        let Some(actual) = &set.actual else { continue };
        total_sets += 1;
        total_tonnage += actual.weight_kg * actual.reps as f64;
        total_volume += actual.reps;
    }

    let average_intensity = if total_volume == 0 { 0.0 } else { total_tonnage / total_volume as f64 };

    let gaps = rest_gaps(session);
    let average_rest_seconds =
        if gaps.is_empty() { 0.0 } else { gaps.iter().sum::<f64>() / gaps.len() as f64 };

    SessionTotals {
        total_sets,
        total_tonnage,
        total_volume,
        average_intensity,
        average_rest_seconds,
        duration_seconds: (completed_at - session.started_at).num_seconds(),
    }
}

/// Better/same/worse against the previous-session ghost, judged on
/// estimated 1RM so 102.5×4 beats 100×5 the way a lifter would read it.
pub fn compare_to_previous(previous_weight: f64, previous_reps: i64, weight: f64, reps: i64) -> SetComparison {
    let prev = epley_e1rm(previous_weight, previous_reps);
    let now = epley_e1rm(weight, reps);

    if now > prev {
        SetComparison::Better
    } else if now == prev {
        SetComparison::Same
    } else {
        SetComparison::Worse
    }
}

/// True when a single logged set beats the stored weight or estimated-1RM
/// record. A first-ever set for the exercise always qualifies. This is the
/// same comparison the completion pass applies, evaluated live.
pub fn beats_stored_pr(stored: Option<&ExercisePr>, weight: f64, reps: i64) -> bool {
    let Some(pr) = stored else { return true };

    let e1rm = epley_e1rm(weight, reps);
    pr.best_weight.is_none_or(|b| weight > b) || pr.best_e1rm.is_none_or(|b| e1rm > b)
}

/// One session's best values for one exercise name, the input to PR
/// detection. Only exercises with at least one completed set produce a
/// candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct PrCandidate {
    pub max_weight: f64,
    pub best_e1rm: f64,
    pub session_volume: i64,
    pub reps_at_weight: BTreeMap<String, i64>,
}

pub fn pr_candidates(session: &WorkoutSession) -> BTreeMap<String, PrCandidate> {
    let by_name: BTreeMap<String, Vec<&SessionSet>> = session
        .completed_sets()
        .map(|(ex, set)| (ex.name.clone(), set))
        .into_group_map()
        .into_iter()
        .collect();

    let mut candidates = BTreeMap::new();
    for (name, sets) in by_name {
        let mut cand = PrCandidate {
            max_weight: 0.0,
            best_e1rm: 0.0,
            session_volume: 0,
            reps_at_weight: BTreeMap::new(),
        };

        for set in sets {
            let Some(actual) = &set.actual else { continue };
            cand.max_weight = cand.max_weight.max(actual.weight);
            cand.best_e1rm = cand.best_e1rm.max(epley_e1rm(actual.weight, actual.reps));
            cand.session_volume += actual.reps;

            let bracket = bracket_key(actual.weight);
            let entry = cand.reps_at_weight.entry(bracket).or_insert(0);
            *entry = (*entry).max(actual.reps);
        }

        candidates.insert(name, cand);
    }

    candidates
}

/// Applies a candidate to the stored PR record. Each of the four axes
/// updates independently and only on a strictly greater value, so
/// replaying the same session is a no-op after the first application.
pub fn apply_candidate(
    pr: &mut ExercisePr,
    cand: &PrCandidate,
    at: DateTime<Utc>,
) -> Vec<RecordNotice> {
    let mut notices = Vec::new();
    let exercise = pr.exercise_name.clone();

    if pr.best_weight.is_none_or(|b| cand.max_weight > b) {
        pr.best_weight = Some(cand.max_weight);
        pr.best_weight_date = Some(at);
        notices.push(RecordNotice { exercise: exercise.clone(), kind: RecordKind::Weight(cand.max_weight) });
    }

    if pr.best_e1rm.is_none_or(|b| cand.best_e1rm > b) {
        pr.best_e1rm = Some(cand.best_e1rm);
        pr.best_e1rm_date = Some(at);
        notices.push(RecordNotice { exercise: exercise.clone(), kind: RecordKind::OneRepMax(cand.best_e1rm) });
    }

    if pr.best_session_volume.is_none_or(|b| cand.session_volume > b) {
        pr.best_session_volume = Some(cand.session_volume);
        pr.best_session_volume_date = Some(at);
        notices.push(RecordNotice {
            exercise: exercise.clone(),
            kind: RecordKind::SessionVolume(cand.session_volume),
        });
    }

    for (bracket, &reps) in &cand.reps_at_weight {
        let beats = pr.rep_records.get(bracket).is_none_or(|r| reps > r.reps);
        if beats {
            pr.rep_records.insert(bracket.clone(), RepRecord { reps, date: at });
            notices.push(RecordNotice {
                exercise: exercise.clone(),
                kind: RecordKind::RepsAtWeight { bracket: bracket.clone(), reps },
            });
        }
    }

    notices
}

/// ISO week key of a timestamp.
pub fn iso_week_of(at: DateTime<Utc>) -> (i32, u32) {
    let week = at.iso_week();
    (week.year(), week.week())
}

/// UTC half-open range `[monday, next monday)` of an ISO week.
pub fn week_range(iso_year: i32, iso_week: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let monday = NaiveDate::from_isoywd_opt(iso_year, iso_week, Weekday::Mon)
        .expect("valid ISO week key");
    let start = Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0).unwrap());
    (start, start + Duration::days(7))
}

/// UTC half-open day range containing a timestamp.
pub fn day_range(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&at.date_naive().and_hms_opt(0, 0, 0).unwrap());
    (start, start + Duration::days(1))
}

pub fn day_key(at: DateTime<Utc>) -> String {
    at.date_naive().format("%Y-%m-%d").to_string()
}

/// Weekly rollup recomputed from scratch over the completed sessions of
/// the week. Summing the raw sets rather than the stored per-session
/// aggregates keeps the rollup honest across edits and undo sequences.
pub fn weekly_rollup(
    user_id: &str,
    iso_year: i32,
    iso_week: u32,
    sessions: &[WorkoutSession],
) -> WeeklyStats {
    let mut stats = WeeklyStats {
        user_id: user_id.to_string(),
        iso_year,
        iso_week,
        ..WeeklyStats::default()
    };

    for session in sessions {
        stats.sessions += 1;
        stats.total_duration_seconds += session
            .completed_at
            .map(|c| (c - session.started_at).num_seconds())
            .unwrap_or(0);

        for (_, set) in session.completed_sets() {
            let Some(actual) = &set.actual else { continue };
            stats.total_sets += 1;
            stats.total_tonnage += actual.weight_kg * actual.reps as f64;
            stats.total_volume += actual.reps;
        }
    }

    stats
}

/// Daily per-exercise rollup, same recompute-from-scratch rule.
pub fn daily_rollup(
    user_id: &str,
    exercise_name: &str,
    day: &str,
    sessions: &[WorkoutSession],
) -> DailyExerciseStats {
    let mut stats = DailyExerciseStats {
        user_id: user_id.to_string(),
        exercise_name: exercise_name.to_string(),
        day: day.to_string(),
        ..DailyExerciseStats::default()
    };

    for session in sessions {
        for (ex, set) in session.completed_sets() {
            if ex.name != exercise_name {
                continue;
            }

            let Some(actual) = &set.actual else { continue };
            stats.sets += 1;
            stats.tonnage += actual.weight_kg * actual.reps as f64;
            stats.volume += actual.reps;
            stats.max_weight = stats.max_weight.max(actual.weight);
            stats.best_e1rm = stats.best_e1rm.max(epley_e1rm(actual.weight, actual.reps));
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActualValues, WorkoutSession};
    use crate::types::{Muscle, SetKind};
    use chrono::TimeZone;

    fn log(session: &mut WorkoutSession, ex_idx: usize, weight: f64, reps: i64, at_secs: i64) {
        let started = session.started_at;
        let ex = &mut session.exercises[ex_idx];
        let set = ex.push_set(Some(weight), Some(reps));
        set.actual = Some(ActualValues {
            weight,
            weight_kg: weight,
            reps,
            rpe: None,
            kind: SetKind::Working,
            note: None,
        });
        set.completed_at = Some(started + Duration::seconds(at_secs));
    }

    fn squat_session() -> WorkoutSession {
        let started = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
        let mut s = WorkoutSession::new("u1", "Leg Day".into(), None, started);
        s.push_exercise("Squat".into(), Muscle::Quads);
        s
    }

    #[test]
    fn epley_matches_hand_computation() {
        assert_eq!(epley_e1rm(100.0, 5), 100.0 * (1.0 + 5.0 / 30.0));
        assert_eq!(epley_e1rm(100.0, 0), 0.0);
    }

    #[test]
    fn bracket_key_rounds_to_one_decimal() {
        assert_eq!(bracket_key(100.0), "100.0");
        assert_eq!(bracket_key(102.54), "102.5");
    }

    #[test]
    fn totals_count_only_completed_sets() {
        let mut s = squat_session();
        log(&mut s, 0, 100.0, 5, 60);
        log(&mut s, 0, 100.0, 4, 180);
        // A planned but never-logged set must not count.
        s.exercises[0].push_set(Some(100.0), Some(5));

        let done = s.started_at + Duration::seconds(600);
        let totals = session_totals(&s, done);

        assert_eq!(totals.total_sets, 2);
        assert_eq!(totals.total_tonnage, 900.0);
        assert_eq!(totals.total_volume, 9);
        assert_eq!(totals.average_intensity, 100.0);
        assert_eq!(totals.average_rest_seconds, 120.0);
        assert_eq!(totals.duration_seconds, 600);
    }

    #[test]
    fn tonnage_is_order_invariant() {
        let mut a = squat_session();
        log(&mut a, 0, 100.0, 5, 60);
        log(&mut a, 0, 80.0, 8, 180);

        let mut b = squat_session();
        log(&mut b, 0, 80.0, 8, 60);
        log(&mut b, 0, 100.0, 5, 180);

        let done = a.started_at + Duration::seconds(300);
        assert_eq!(session_totals(&a, done).total_tonnage, session_totals(&b, done).total_tonnage);
    }

    #[test]
    fn comparison_judges_on_estimated_1rm() {
        assert_eq!(compare_to_previous(100.0, 5, 102.5, 4), SetComparison::Better);
        assert_eq!(compare_to_previous(100.0, 5, 100.0, 5), SetComparison::Same);
        assert_eq!(compare_to_previous(100.0, 5, 95.0, 5), SetComparison::Worse);
    }

    #[test]
    fn first_set_for_exercise_is_always_a_live_record() {
        assert!(beats_stored_pr(None, 60.0, 5));

        let mut pr = ExercisePr::new("u1", "Squat");
        pr.best_weight = Some(100.0);
        pr.best_e1rm = Some(116.7);
        assert!(!beats_stored_pr(Some(&pr), 90.0, 3));
        assert!(beats_stored_pr(Some(&pr), 105.0, 1));
    }

    #[test]
    fn candidates_cover_all_four_axes() {
        let mut s = squat_session();
        log(&mut s, 0, 100.0, 5, 60);
        log(&mut s, 0, 90.0, 8, 180);

        let cands = pr_candidates(&s);
        let squat = &cands["Squat"];

        assert_eq!(squat.max_weight, 100.0);
        assert_eq!(squat.session_volume, 13);
        assert_eq!(squat.best_e1rm, epley_e1rm(100.0, 5).max(epley_e1rm(90.0, 8)));
        assert_eq!(squat.reps_at_weight["100.0"], 5);
        assert_eq!(squat.reps_at_weight["90.0"], 8);
    }

    #[test]
    fn applying_same_candidate_twice_changes_nothing() {
        let mut s = squat_session();
        log(&mut s, 0, 100.0, 5, 60);

        let cands = pr_candidates(&s);
        let at = s.started_at + Duration::seconds(300);

        let mut pr = ExercisePr::new("u1", "Squat");
        let first = apply_candidate(&mut pr, &cands["Squat"], at);
        assert_eq!(first.len(), 4); // weight, e1rm, volume, one bracket

        let snapshot = pr.clone();
        let second = apply_candidate(&mut pr, &cands["Squat"], at + Duration::days(1));
        assert!(second.is_empty());
        assert_eq!(pr.best_weight, snapshot.best_weight);
        assert_eq!(pr.best_weight_date, snapshot.best_weight_date);
        assert_eq!(pr.rep_records, snapshot.rep_records);
    }

    #[test]
    fn pr_updates_are_monotonic() {
        let mut pr = ExercisePr::new("u1", "Squat");
        pr.best_weight = Some(100.0);
        pr.best_e1rm = Some(120.0);
        pr.best_session_volume = Some(30);

        let cand = PrCandidate {
            max_weight: 100.0, // ties never update
            best_e1rm: 119.0,
            session_volume: 31,
            reps_at_weight: BTreeMap::new(),
        };

        let notices = apply_candidate(&mut pr, &cand, Utc::now());
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0].kind, RecordKind::SessionVolume(31)));
        assert_eq!(pr.best_weight, Some(100.0));
        assert_eq!(pr.best_e1rm, Some(120.0));
    }

    #[test]
    fn weekly_rollup_sums_completed_sessions() {
        let mut a = squat_session();
        log(&mut a, 0, 100.0, 5, 60);
        a.completed_at = Some(a.started_at + Duration::seconds(600));

        let mut b = squat_session();
        b.started_at = a.started_at + Duration::days(2);
        log(&mut b, 0, 100.0, 5, 60);
        b.completed_at = Some(b.started_at + Duration::seconds(300));

        let stats = weekly_rollup("u1", 2026, 10, &[a, b]);
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.total_sets, 2);
        assert_eq!(stats.total_tonnage, 1000.0);
        assert_eq!(stats.total_volume, 10);
        assert_eq!(stats.total_duration_seconds, 900);
    }

    #[test]
    fn week_range_brackets_its_own_key() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let (year, week) = iso_week_of(at);
        let (start, end) = week_range(year, week);
        assert!(start <= at && at < end);
        assert_eq!(end - start, Duration::days(7));
    }
}
