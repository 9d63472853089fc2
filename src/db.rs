use std::str::FromStr;

use anyhow::Result;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub type DB = SqlitePool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id                   TEXT PRIMARY KEY,
    user_id              TEXT NOT NULL,
    title                TEXT NOT NULL,
    status               TEXT NOT NULL,
    started_at           TEXT NOT NULL,
    completed_at         TEXT,
    notes                TEXT,
    total_sets           INTEGER NOT NULL DEFAULT 0,
    total_tonnage        REAL NOT NULL DEFAULT 0,
    total_volume         INTEGER NOT NULL DEFAULT 0,
    average_intensity    REAL NOT NULL DEFAULT 0,
    average_rest_seconds REAL NOT NULL DEFAULT 0,
    duration_seconds     INTEGER NOT NULL DEFAULT 0
);

-- The store-level guarantee behind "one in-progress session per user":
-- two concurrent starts race on this index, not on the application check.
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_active
    ON sessions (user_id) WHERE status = 'in_progress';

CREATE INDEX IF NOT EXISTS idx_sessions_user_started
    ON sessions (user_id, started_at);

CREATE TABLE IF NOT EXISTS session_exercises (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    muscle      TEXT NOT NULL,
    order_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS session_sets (
    id               TEXT PRIMARY KEY,
    exercise_id      TEXT NOT NULL REFERENCES session_exercises(id) ON DELETE CASCADE,
    order_index      INTEGER NOT NULL,
    planned_weight   REAL,
    planned_reps     INTEGER,
    previous_weight  REAL,
    previous_reps    INTEGER,
    actual_weight    REAL,
    actual_weight_kg REAL,
    actual_reps      INTEGER,
    rpe              REAL,
    kind             TEXT,
    note             TEXT,
    comparison       TEXT,
    completed_at     TEXT
);

CREATE TABLE IF NOT EXISTS exercise_prs (
    user_id                  TEXT NOT NULL,
    exercise_name            TEXT NOT NULL,
    best_weight              REAL,
    best_weight_date         TEXT,
    best_e1rm                REAL,
    best_e1rm_date           TEXT,
    best_session_volume      INTEGER,
    best_session_volume_date TEXT,
    rep_records              TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (user_id, exercise_name)
);

CREATE TABLE IF NOT EXISTS weekly_stats (
    user_id                TEXT NOT NULL,
    iso_year               INTEGER NOT NULL,
    iso_week               INTEGER NOT NULL,
    sessions               INTEGER NOT NULL,
    total_sets             INTEGER NOT NULL,
    total_tonnage          REAL NOT NULL,
    total_volume           INTEGER NOT NULL,
    total_duration_seconds INTEGER NOT NULL,
    PRIMARY KEY (user_id, iso_year, iso_week)
);

CREATE TABLE IF NOT EXISTS daily_exercise_stats (
    user_id       TEXT NOT NULL,
    exercise_name TEXT NOT NULL,
    day           TEXT NOT NULL,
    sets          INTEGER NOT NULL,
    tonnage       REAL NOT NULL,
    volume        INTEGER NOT NULL,
    max_weight    REAL NOT NULL,
    best_e1rm     REAL NOT NULL,
    PRIMARY KEY (user_id, exercise_name, day)
);

CREATE TABLE IF NOT EXISTS rest_stats (
    user_id         TEXT PRIMARY KEY,
    average_seconds REAL NOT NULL,
    samples         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS template_days (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS template_exercises (
    id          TEXT PRIMARY KEY,
    day_id      TEXT NOT NULL REFERENCES template_days(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    muscle      TEXT NOT NULL,
    order_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS template_sets (
    id          TEXT PRIMARY KEY,
    exercise_id TEXT NOT NULL REFERENCES template_exercises(id) ON DELETE CASCADE,
    order_index INTEGER NOT NULL,
    weight      REAL,
    reps        INTEGER
);
"#;

pub async fn open(path: &str) -> Result<DB> {
    let opts = SqliteConnectOptions::from_str(path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    bootstrap(&pool).await?;
    Ok(pool)
}

/// In-memory database on a single-connection pool. More than one
/// connection would mean more than one empty database.
pub async fn open_memory() -> Result<DB> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;

    bootstrap(&pool).await?;
    Ok(pool)
}

async fn bootstrap(pool: &DB) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
