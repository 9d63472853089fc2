use once_cell::sync::Lazy;
use std::{collections::HashSet, fmt::Display, str::FromStr};
use strsim::jaro_winkler;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Muscle {
    Biceps,
    Triceps,
    Forearms,
    Chest,
    Shoulders,
    Back,
    Quads,
    Hamstrings,
    Glutes,
    Calves,
    Abs,
}

impl Display for Muscle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Biceps => "biceps",
            Self::Triceps => "triceps",
            Self::Forearms => "forearms",
            Self::Chest => "chest",
            Self::Shoulders => "shoulders",
            Self::Back => "back",
            Self::Quads => "quads",
            Self::Hamstrings => "hamstrings",
            Self::Glutes => "glutes",
            Self::Calves => "calves",
            Self::Abs => "abs",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for Muscle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "biceps" => Ok(Self::Biceps),
            "triceps" => Ok(Self::Triceps),
            "forearms" => Ok(Self::Forearms),
            "chest" => Ok(Self::Chest),
            "shoulders" => Ok(Self::Shoulders),
            "back" => Ok(Self::Back),
            "quads" => Ok(Self::Quads),
            "hamstrings" => Ok(Self::Hamstrings),
            "glutes" => Ok(Self::Glutes),
            "calves" => Ok(Self::Calves),
            "abs" => Ok(Self::Abs),
            other => Err(format!("unknown muscle group `{}`", other)),
        }
    }
}

pub static ALLOWED_MUSCLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "biceps",
        "triceps",
        "forearms",
        "chest",
        "shoulders",
        "back",
        "quads",
        "hamstrings",
        "glutes",
        "calves",
        "abs",
    ])
});

/// Returns the canonical lowercase muscle name or `None` if not allowed.
pub fn cannonical_muscle<S: AsRef<str>>(m: S) -> Option<String> {
    let raw = m.as_ref();
    assert!(raw.chars().all(|c| !c.is_control()), "received control chars in muscle name: {raw:?}");

    let m = raw.to_ascii_lowercase();
    if ALLOWED_MUSCLES.contains(m.as_str()) {
        Some(m)
    } else {
        None
    }
}

/// Return the closest allowed muscle for `input`
/// if similarity ≥ 0.80 *and* clearly better than the runner-up.
/// Otherwise return `None` (no suggestion shown).
pub fn best_muscle_suggestions(input: &str) -> Option<&'static str> {
    assert!(!ALLOWED_MUSCLES.is_empty(), "ALLOWED_MUSCLES must contain at least one entry");

    let inp = input.to_ascii_lowercase();
    assert!(!inp.trim().is_empty(), "best_muscle_suggestions called with empty input"); // Sanity check.

    // Collect (muscle, score) pairs.
    let mut scores: Vec<(&'static str, f64)> = ALLOWED_MUSCLES
        .iter()
        .copied()
        .map(|m| (m, jaro_winkler(&inp, m)))
        .collect();

    // Highest score first.
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let (best_muscle, best_score) = scores[0];
    let second_score = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0);

    // Tune these two constants to taste.
    const MIN_SCORE: f64 = 0.80;
    const GAP: f64 = 0.02;

    if best_score >= MIN_SCORE && best_score - second_score >= GAP {
        Some(best_muscle)
    } else {
        None
    }
}

/// Where a session sits in its lifecycle. At most one `InProgress` session
/// may exist per user; terminal sessions are never mutated again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown session status `{}`", other)),
        }
    }
}

/// How a logged set was intended: warmup ramp, working weight, drop set,
/// or a set taken to failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    Warmup,
    #[default]
    Working,
    Drop,
    Failure,
}

impl SetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Working => "working",
            Self::Drop => "drop",
            Self::Failure => "failure",
        }
    }
}

impl Display for SetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warmup" => Ok(Self::Warmup),
            "working" => Ok(Self::Working),
            "drop" => Ok(Self::Drop),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown set kind `{}`", other)),
        }
    }
}

/// Result of comparing a freshly logged set against the ghost value from
/// the user's previous session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetComparison {
    Better,
    Same,
    Worse,
}

impl SetComparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Better => "better",
            Self::Same => "same",
            Self::Worse => "worse",
        }
    }
}

impl FromStr for SetComparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "better" => Ok(Self::Better),
            "same" => Ok(Self::Same),
            "worse" => Ok(Self::Worse),
            other => Err(format!("unknown set comparison `{}`", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muscle_roundtrips_through_display() {
        for m in [Muscle::Chest, Muscle::Quads, Muscle::Abs] {
            assert_eq!(m, m.to_string().parse::<Muscle>().unwrap());
        }
    }

    #[test]
    fn canonical_muscle_accepts_any_case() {
        assert_eq!(cannonical_muscle("Chest"), Some("chest".to_string()));
        assert_eq!(cannonical_muscle("HAMSTRINGS"), Some("hamstrings".to_string()));
        assert_eq!(cannonical_muscle("neck"), None);
    }

    #[test]
    fn suggestion_catches_close_typo() {
        assert_eq!(best_muscle_suggestions("quds"), Some("quads"));
    }

    #[test]
    fn status_roundtrips() {
        for s in [SessionStatus::InProgress, SessionStatus::Completed, SessionStatus::Abandoned] {
            assert_eq!(s, s.as_str().parse::<SessionStatus>().unwrap());
        }
    }
}
