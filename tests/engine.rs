use chrono::{DateTime, Duration, Utc};

use ferrum::db;
use ferrum::engine::{SessionEngine, analytics};
use ferrum::error::EngineError;
use ferrum::models::{CompleteSet, StartSession, WorkoutSession};
use ferrum::store::{StatsStore, TemplateStore};
use ferrum::types::{Muscle, SessionStatus, SetComparison, SetKind};

const USER: &str = "u1";

async fn engine() -> (SessionEngine, sqlx::SqlitePool) {
    let pool = db::open_memory().await.expect("in-memory pool");
    (SessionEngine::new(pool.clone()), pool)
}

fn log_req(set_id: &str, weight: f64, reps: i64) -> CompleteSet {
    CompleteSet {
        set_id: set_id.to_string(),
        weight,
        weight_kg: weight,
        reps,
        rpe: None,
        kind: SetKind::Working,
        note: None,
        completed_at: None,
    }
}

fn log_req_at(set_id: &str, weight: f64, reps: i64, at: DateTime<Utc>) -> CompleteSet {
    CompleteSet { completed_at: Some(at), ..log_req(set_id, weight, reps) }
}

async fn start_titled(engine: &SessionEngine, title: &str) -> WorkoutSession {
    engine
        .start(USER, StartSession { title: Some(title.to_string()), ..Default::default() })
        .await
        .expect("start session")
}

/// Starts a session, logs one squat set, and completes it.
async fn complete_squat_session(engine: &SessionEngine, weight: f64, reps: i64) -> WorkoutSession {
    let session = start_titled(engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let set = engine.add_set(USER, &session.id, &ex.id, Some(weight), Some(reps)).await.unwrap();
    engine.complete_set(USER, &session.id, log_req(&set.id, weight, reps)).await.unwrap();
    engine.complete(USER, &session.id, None).await.unwrap().session
}

fn push_day_toml(name: &str, sets: usize) -> String {
    let mut toml =
        format!("name = \"{name}\"\n\n[[exercise]]\nname = \"Bench Press\"\nmuscle = \"chest\"\n");
    for _ in 0..sets {
        toml.push_str("\n[[exercise.set]]\nweight = 80.0\nreps = 5\n");
    }
    toml
}

#[tokio::test]
async fn leg_day_start_to_finish() {
    let (engine, pool) = engine().await;
    let stats = StatsStore::new(pool);

    let session = start_titled(&engine, "Leg Day").await;
    assert_eq!(session.status, SessionStatus::InProgress);

    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let set = engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(5)).await.unwrap();

    let logged = engine.complete_set(USER, &session.id, log_req(&set.id, 100.0, 5)).await.unwrap();
    assert!(logged.new_record, "first ever set for an exercise is a live record");
    assert_eq!(logged.set.comparison, None, "no ghost means no comparison");
    assert!(logged.set.completed_at.is_some());

    let done = engine.complete(USER, &session.id, Some("felt strong")).await.unwrap();
    assert_eq!(done.session.status, SessionStatus::Completed);
    assert_eq!(done.session.totals.total_sets, 1);
    assert_eq!(done.session.totals.total_tonnage, 500.0);
    assert_eq!(done.session.totals.total_volume, 5);
    assert_eq!(done.session.totals.average_intensity, 100.0);
    assert!(done.session.notes.as_deref().unwrap().contains("felt strong"));
    assert!(!done.new_records.is_empty());

    let pr = stats.exercise_pr(USER, "Squat").await.unwrap().unwrap();
    assert_eq!(pr.best_weight, Some(100.0));
    let expected_e1rm = 100.0 * (1.0 + 5.0 / 30.0);
    assert!((pr.best_e1rm.unwrap() - expected_e1rm).abs() < 1e-9);
    assert_eq!(pr.best_session_volume, Some(5));
    assert_eq!(pr.rep_records["100.0"].reps, 5);

    let (year, week) = analytics::iso_week_of(done.session.started_at);
    let weekly = stats.weekly_stats(USER, year, week).await.unwrap().unwrap();
    assert_eq!(weekly.sessions, 1);
    assert_eq!(weekly.total_sets, 1);
    assert_eq!(weekly.total_tonnage, 500.0);

    let day = analytics::day_key(done.session.started_at);
    let daily = stats.daily_stats(USER, "Squat", &day).await.unwrap().unwrap();
    assert_eq!(daily.sets, 1);
    assert_eq!(daily.max_weight, 100.0);

    assert!(engine.get_active(USER).await.unwrap().is_none());
}

#[tokio::test]
async fn second_start_conflicts_until_the_first_ends() {
    let (engine, _pool) = engine().await;

    start_titled(&engine, "Push").await;

    // Every start flavor conflicts while a session is active.
    let attempts = [
        StartSession::default(),
        StartSession { repeat_last: true, ..Default::default() },
        StartSession { day_id: Some("Pull".to_string()), ..Default::default() },
        StartSession { title: Some("Other".to_string()), notes: Some("n".to_string()), ..Default::default() },
    ];
    for req in attempts {
        let err = engine.start(USER, req).await.unwrap_err();
        assert!(matches!(err, EngineError::ConflictingState(_)));
    }

    // Another user is unaffected.
    engine.start("u2", StartSession::default()).await.unwrap();

    let active = engine.get_active(USER).await.unwrap().unwrap();
    engine.abandon(USER, &active.id).await.unwrap();
    start_titled(&engine, "Push again").await;
}

#[tokio::test]
async fn repeat_last_without_history_is_not_found() {
    let (engine, _pool) = engine().await;

    let err = engine
        .start(USER, StartSession { repeat_last: true, ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn repeat_last_copies_structure_and_seeds_ghosts() {
    let (engine, _pool) = engine().await;

    complete_squat_session(&engine, 100.0, 5).await;

    let repeat = engine
        .start(USER, StartSession { repeat_last: true, ..Default::default() })
        .await
        .unwrap();

    assert_eq!(repeat.title, "Leg Day");
    assert_eq!(repeat.exercises.len(), 1);
    assert_eq!(repeat.exercises[0].name, "Squat");

    let set = &repeat.exercises[0].sets[0];
    assert_eq!(set.planned_weight, Some(100.0));
    assert_eq!(set.planned_reps, Some(5));
    let ghost = set.previous.unwrap();
    assert_eq!((ghost.weight, ghost.reps), (100.0, 5));
    assert!(set.actual.is_none());

    // The ghost feeds the comparison on the next log.
    let logged = engine
        .complete_set(USER, &repeat.id, log_req(&set.id, 102.5, 5))
        .await
        .unwrap();
    assert_eq!(logged.set.comparison, Some(SetComparison::Better));
}

#[tokio::test]
async fn undo_clears_the_most_recent_set_only() {
    let (engine, _pool) = engine().await;

    let session = start_titled(&engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let s1 = engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(5)).await.unwrap();
    let s2 = engine.add_set(USER, &session.id, &ex.id, None, None).await.unwrap();

    let base = Utc::now();
    engine.complete_set(USER, &session.id, log_req_at(&s1.id, 100.0, 5, base)).await.unwrap();
    engine
        .complete_set(USER, &session.id, log_req_at(&s2.id, 100.0, 4, base + Duration::seconds(150)))
        .await
        .unwrap();

    let undone = engine.undo_last_set(USER, &session.id).await.unwrap();
    assert_eq!(undone.id, s2.id);
    assert!(undone.actual.is_none() && undone.completed_at.is_none());

    let current = engine.get_by_id(USER, &session.id).await.unwrap();
    assert!(current.exercises[0].sets[0].completed_at.is_some(), "earlier set untouched");

    // Relog and finish: totals reflect the relogged value, not the undone one.
    engine
        .complete_set(USER, &session.id, log_req_at(&s2.id, 100.0, 5, base + Duration::seconds(300)))
        .await
        .unwrap();
    let done = engine.complete(USER, &session.id, None).await.unwrap();
    assert_eq!(done.session.totals.total_sets, 2);
    assert_eq!(done.session.totals.total_volume, 10);
}

#[tokio::test]
async fn undo_with_nothing_logged_conflicts() {
    let (engine, _pool) = engine().await;

    let session = start_titled(&engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(5)).await.unwrap();

    let err = engine.undo_last_set(USER, &session.id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictingState(_)));
}

#[tokio::test]
async fn add_set_defaults_to_the_last_logged_values() {
    let (engine, _pool) = engine().await;

    let session = start_titled(&engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let s1 = engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(5)).await.unwrap();
    engine.complete_set(USER, &session.id, log_req(&s1.id, 102.5, 5)).await.unwrap();

    let s2 = engine.add_set(USER, &session.id, &ex.id, None, None).await.unwrap();
    assert_eq!(s2.planned_weight, Some(102.5), "continuity from the logged actual, not the plan");
    assert_eq!(s2.planned_reps, Some(5));

    let s3 = engine.add_set(USER, &session.id, &ex.id, Some(90.0), None).await.unwrap();
    assert_eq!(s3.planned_weight, Some(90.0));
}

#[tokio::test]
async fn abandoned_sessions_are_invisible_to_analytics() {
    let (engine, pool) = engine().await;
    let stats = StatsStore::new(pool);

    let session = start_titled(&engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let set = engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(5)).await.unwrap();
    engine.complete_set(USER, &session.id, log_req(&set.id, 100.0, 5)).await.unwrap();

    let abandoned = engine.abandon(USER, &session.id).await.unwrap();
    assert_eq!(abandoned.status, SessionStatus::Abandoned);
    assert_eq!(abandoned.totals.total_sets, 0, "no aggregates on abandon");

    assert!(stats.exercise_pr(USER, "Squat").await.unwrap().is_none());
    let (year, week) = analytics::iso_week_of(abandoned.started_at);
    assert!(stats.weekly_stats(USER, year, week).await.unwrap().is_none());
    assert!(engine.previous_exercise_data(USER, "Squat").await.unwrap().is_none());
}

#[tokio::test]
async fn terminal_sessions_reject_further_mutation() {
    let (engine, _pool) = engine().await;

    let done = complete_squat_session(&engine, 100.0, 5).await;

    let err = engine.complete(USER, &done.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictingState(_)));

    let err = engine.add_exercise(USER, &done.id, "Bench Press", Muscle::Chest).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictingState(_)));

    let err = engine.abandon(USER, &done.id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConflictingState(_)));
}

#[tokio::test]
async fn foreign_sessions_read_as_not_found() {
    let (engine, _pool) = engine().await;

    let session = start_titled(&engine, "Leg Day").await;

    let err = engine.get_by_id("intruder", &session.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    let err = engine.complete("intruder", &session.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // The owner still sees it.
    engine.get_by_id(USER, &session.id).await.unwrap();
}

#[tokio::test]
async fn weaker_session_sets_no_new_records() {
    let (engine, pool) = engine().await;
    let stats = StatsStore::new(pool);

    complete_squat_session(&engine, 100.0, 5).await;

    // Same weight, fewer reps: loses on every axis, ties on weight.
    let session = start_titled(&engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let set = engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(4)).await.unwrap();

    let logged = engine.complete_set(USER, &session.id, log_req(&set.id, 100.0, 4)).await.unwrap();
    assert!(!logged.new_record);

    let done = engine.complete(USER, &session.id, None).await.unwrap();
    assert!(done.new_records.is_empty());

    let pr = stats.exercise_pr(USER, "Squat").await.unwrap().unwrap();
    assert_eq!(pr.best_weight, Some(100.0));
    assert_eq!(pr.best_session_volume, Some(5));
    assert_eq!(pr.rep_records["100.0"].reps, 5);
}

#[tokio::test]
async fn history_pages_newest_first() {
    let (engine, _pool) = engine().await;

    for title in ["First", "Second", "Third"] {
        let session = start_titled(&engine, title).await;
        engine.complete(USER, &session.id, None).await.unwrap();
    }

    let page1 = engine.get_history(USER, None, None, 1, 2).await.unwrap();
    assert_eq!(page1.total, 3);
    assert_eq!(page1.sessions.len(), 2);
    assert_eq!(page1.sessions[0].title, "Third");
    assert_eq!(page1.sessions[1].title, "Second");

    let page2 = engine.get_history(USER, None, None, 2, 2).await.unwrap();
    assert_eq!(page2.sessions.len(), 1);
    assert_eq!(page2.sessions[0].title, "First");

    // Out-of-range pages are empty but keep the count.
    let page9 = engine.get_history(USER, None, None, 9, 2).await.unwrap();
    assert!(page9.sessions.is_empty());
    assert_eq!(page9.total, 3);

    // A window in the far past matches nothing.
    let from = Utc::now() - Duration::days(30);
    let to = Utc::now() - Duration::days(20);
    let old = engine.get_history(USER, Some(from), Some(to), 1, 10).await.unwrap();
    assert_eq!(old.total, 0);
}

#[tokio::test]
async fn previous_exercise_data_returns_the_latest_completed_sets() {
    let (engine, _pool) = engine().await;

    assert!(engine.previous_exercise_data(USER, "Squat").await.unwrap().is_none());

    complete_squat_session(&engine, 100.0, 5).await;
    let latest = complete_squat_session(&engine, 102.5, 5).await;

    let prev = engine.previous_exercise_data(USER, "Squat").await.unwrap().unwrap();
    assert_eq!(prev.session_id, latest.id);
    assert_eq!(prev.sets.len(), 1);
    assert_eq!(prev.sets[0].weight, 102.5);
    assert_eq!(prev.sets[0].reps, 5);

    assert!(engine.previous_exercise_data(USER, "Deadlift").await.unwrap().is_none());
}

#[tokio::test]
async fn template_start_seeds_plan_and_ghosts() {
    let (engine, pool) = engine().await;
    let templates = TemplateStore::new(pool);

    let import = toml::from_str(&push_day_toml("Push", 3)).unwrap();
    let day = templates.import_day(&import).await.unwrap();

    let session = engine
        .start(USER, StartSession { day_id: Some(day.name.clone()), ..Default::default() })
        .await
        .unwrap();

    assert_eq!(session.title, "Push");
    assert_eq!(session.exercises.len(), 1);
    assert_eq!(session.exercises[0].name, "Bench Press");
    assert_eq!(session.exercises[0].sets.len(), 3);
    assert_eq!(session.exercises[0].sets[0].planned_weight, Some(80.0));
    assert!(session.exercises[0].sets[0].previous.is_none(), "no history, no ghosts");

    // Log the first set and finish, then start the same day again: the new
    // session's first set should carry the logged value as its ghost.
    let set_id = session.exercises[0].sets[0].id.clone();
    engine.complete_set(USER, &session.id, log_req(&set_id, 80.0, 5)).await.unwrap();
    engine.complete(USER, &session.id, None).await.unwrap();

    let again = engine
        .start(USER, StartSession { day_id: Some(day.id), ..Default::default() })
        .await
        .unwrap();
    let ghost = again.exercises[0].sets[0].previous.unwrap();
    assert_eq!((ghost.weight, ghost.reps), (80.0, 5));
    assert!(again.exercises[0].sets[1].previous.is_none(), "only one logged set to map");
}

#[tokio::test]
async fn starting_an_unknown_template_is_not_found() {
    let (engine, _pool) = engine().await;

    let err = engine
        .start(USER, StartSession { day_id: Some("Pull".to_string()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn estimate_defaults_to_ninety_second_rests() {
    let (engine, pool) = engine().await;
    let templates = TemplateStore::new(pool);

    let import = toml::from_str(&push_day_toml("Push", 5)).unwrap();
    let day = templates.import_day(&import).await.unwrap();

    // 5 sets × (30 s work + 90 s default rest) = 600 s.
    let estimate = engine.estimate_duration(USER, &day.id).await.unwrap();
    assert_eq!(estimate.total_sets, 5);
    assert_eq!(estimate.average_rest_seconds, 90.0);
    assert_eq!(estimate.estimated_minutes, 10);

    // A single planned set still lands at 2 minutes.
    let import = toml::from_str(&push_day_toml("Quick", 1)).unwrap();
    let quick = templates.import_day(&import).await.unwrap();
    let estimate = engine.estimate_duration(USER, &quick.id).await.unwrap();
    assert_eq!(estimate.estimated_minutes, 2);
}

#[tokio::test]
async fn estimate_uses_the_observed_rest_average() {
    let (engine, pool) = engine().await;
    let templates = TemplateStore::new(pool);

    // One completed session with a single 120 s gap between sets.
    let session = start_titled(&engine, "Leg Day").await;
    let ex = engine.add_exercise(USER, &session.id, "Squat", Muscle::Quads).await.unwrap();
    let s1 = engine.add_set(USER, &session.id, &ex.id, Some(100.0), Some(5)).await.unwrap();
    let s2 = engine.add_set(USER, &session.id, &ex.id, None, None).await.unwrap();

    let base = Utc::now();
    engine.complete_set(USER, &session.id, log_req_at(&s1.id, 100.0, 5, base)).await.unwrap();
    engine
        .complete_set(USER, &session.id, log_req_at(&s2.id, 100.0, 5, base + Duration::seconds(120)))
        .await
        .unwrap();
    engine.complete(USER, &session.id, None).await.unwrap();

    let import = toml::from_str(&push_day_toml("Push", 5)).unwrap();
    let day = templates.import_day(&import).await.unwrap();

    // 5 sets × (30 + 120) = 750 s, truncated to whole minutes.
    let estimate = engine.estimate_duration(USER, &day.id).await.unwrap();
    assert_eq!(estimate.average_rest_seconds, 120.0);
    assert_eq!(estimate.estimated_minutes, 12);
}

#[tokio::test]
async fn rollups_recompute_to_the_same_values() {
    let (engine, pool) = engine().await;
    let stats = StatsStore::new(pool);

    let done = complete_squat_session(&engine, 100.0, 5).await;

    let first = engine.recompute_week(USER, done.started_at).await.unwrap();
    let second = engine.recompute_week(USER, done.started_at).await.unwrap();
    assert_eq!(first, second);

    let stored = stats
        .weekly_stats(USER, first.iso_year, first.iso_week)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, second);

    let daily_first = engine.recompute_day(USER, "Squat", done.started_at).await.unwrap();
    let daily_second = engine.recompute_day(USER, "Squat", done.started_at).await.unwrap();
    assert_eq!(daily_first, daily_second);
    assert_eq!(daily_first.tonnage, 500.0);
}

#[tokio::test]
async fn weekly_rollup_covers_every_completed_session_of_the_week() {
    let (engine, pool) = engine().await;
    let stats = StatsStore::new(pool);

    complete_squat_session(&engine, 100.0, 5).await;
    let second = complete_squat_session(&engine, 90.0, 8).await;

    let (year, week) = analytics::iso_week_of(second.started_at);
    let weekly = stats.weekly_stats(USER, year, week).await.unwrap().unwrap();
    assert_eq!(weekly.sessions, 2);
    assert_eq!(weekly.total_sets, 2);
    assert_eq!(weekly.total_tonnage, 500.0 + 720.0);
    assert_eq!(weekly.total_volume, 13);
}
