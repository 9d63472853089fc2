use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use colored::Colorize;

use crate::cli::SessionCmd;
use crate::engine::SessionEngine;
use crate::error::EngineError;
use crate::models::{CompleteSet, StartSession, WorkoutSession};
use crate::types::SetComparison;

pub async fn handle(cmd: SessionCmd, engine: &SessionEngine, user: &str) -> Result<()> {
    match cmd {
        SessionCmd::Start { day, title, notes, repeat_last } => {
            let req = StartSession { day_id: day, title, notes, repeat_last };
            let session = match engine.start(user, req).await {
                Ok(s) => s,
                Err(e) => return report(e),
            };

            println!(
                "{} session started: {} (id: {})",
                "ok:".green().bold(),
                session.title.bold(),
                session.id
            );

            if !session.exercises.is_empty() {
                println!("\n{}", "Exercises:".cyan().bold());
                for (i, ex) in session.exercises.iter().enumerate() {
                    let idx = format!("{}", i + 1).yellow();
                    println!("{} • {} - {} sets", idx, ex.name.bold(), ex.sets.len());
                }
            }

            Ok(())
        }

        SessionCmd::Show => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };

            print_session(&session);
            Ok(())
        }

        SessionCmd::Set { exercise, weight, reps, kg, set, rpe, kind, note } => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };

            let Some(ex) = exercise.checked_sub(1).and_then(|i| session.exercises.get(i)) else {
                println!("{} no exercise at index {}", "error:".red().bold(), exercise);
                return Ok(());
            };

            // Default to the next unlogged set of the exercise.
            let set_index = match set {
                Some(s) => match s.checked_sub(1) {
                    Some(i) => i,
                    None => {
                        println!("{} set indexes start at 1", "error:".red().bold());
                        return Ok(());
                    }
                },
                None => match ex.sets.iter().position(|s| s.completed_at.is_none()) {
                    Some(i) => i,
                    None => {
                        println!(
                            "{} all sets of {} are logged - use `session add-set {}`",
                            "error:".red().bold(),
                            ex.name.bold(),
                            exercise
                        );
                        return Ok(());
                    }
                },
            };

            let Some(target) = ex.sets.get(set_index) else {
                println!(
                    "{} no set at index {} (max: {})",
                    "error:".red().bold(),
                    set_index + 1,
                    ex.sets.len()
                );
                return Ok(());
            };

            let req = CompleteSet {
                set_id: target.id.clone(),
                weight,
                weight_kg: kg.unwrap_or(weight),
                reps,
                rpe,
                kind,
                note,
                completed_at: None,
            };

            let logged = match engine.complete_set(user, &session.id, req).await {
                Ok(l) => l,
                Err(e) => return report(e),
            };

            print!(
                "{} logged set {} for {} ({}kg × {})",
                "ok:".green().bold(),
                set_index + 1,
                logged.exercise_name.bold(),
                weight,
                reps
            );

            match logged.set.comparison {
                Some(SetComparison::Better) => println!(" {}", "▲ better than last time".green()),
                Some(SetComparison::Same) => println!(" {}", "= same as last time".dimmed()),
                Some(SetComparison::Worse) => println!(" {}", "▼ below last time".red()),
                None => println!(),
            }

            if logged.new_record {
                println!("{} new personal record!", "note:".yellow().bold());
            }

            Ok(())
        }

        SessionCmd::Undo => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };

            match engine.undo_last_set(user, &session.id).await {
                Ok(set) => {
                    println!("{} cleared set {} back to planned", "ok:".green().bold(), set.order_index + 1);
                    Ok(())
                }
                Err(e) => report(e),
            }
        }

        SessionCmd::AddEx { name, muscle, sets } => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };

            let ex = match engine.add_exercise(user, &session.id, &name, muscle).await {
                Ok(ex) => ex,
                Err(e) => return report(e),
            };

            for _ in 0..sets {
                engine.add_set(user, &session.id, &ex.id, None, None).await?;
            }

            println!(
                "{} added {} [{}] at position {}",
                "ok:".green().bold(),
                ex.name.bold(),
                muscle,
                ex.order_index + 1
            );

            Ok(())
        }

        SessionCmd::AddSet { exercise, weight, reps } => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };

            let Some(ex) = exercise.checked_sub(1).and_then(|i| session.exercises.get(i)) else {
                println!("{} no exercise at index {}", "error:".red().bold(), exercise);
                return Ok(());
            };

            match engine.add_set(user, &session.id, &ex.id, weight, reps).await {
                Ok(set) => {
                    let plan = match (set.planned_weight, set.planned_reps) {
                        (Some(w), Some(r)) => format!(" ({}kg × {})", w, r),
                        _ => String::new(),
                    };
                    println!("{} added set {} to {}{}", "ok:".green().bold(), set.order_index + 1, ex.name.bold(), plan);
                    Ok(())
                }
                Err(e) => report(e),
            }
        }

        SessionCmd::Finish { note } => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session", "error:".red().bold());
                return Ok(());
            };

            let done = match engine.complete(user, &session.id, note.as_deref()).await {
                Ok(d) => d,
                Err(e) => return report(e),
            };

            let t = &done.session.totals;
            println!("{} session finished: {}", "ok:".green().bold(), done.session.title.bold());
            println!(
                "  {} sets, {:.0}kg tonnage, {} reps, {:.1}kg avg intensity, {} min",
                t.total_sets,
                t.total_tonnage,
                t.total_volume,
                t.average_intensity,
                t.duration_seconds / 60
            );

            if !done.new_records.is_empty() {
                println!("\n{}", "New records:".yellow().bold());
                for record in &done.new_records {
                    println!("  ★ {}", record);
                }
            }

            Ok(())
        }

        SessionCmd::Cancel => {
            let Some(session) = engine.get_active(user).await? else {
                println!("{} no active session to cancel", "error:".red().bold());
                return Ok(());
            };

            match engine.abandon(user, &session.id).await {
                Ok(s) => {
                    println!("{} session abandoned (id: {})", "ok:".green().bold(), s.id);
                    Ok(())
                }
                Err(e) => report(e),
            }
        }

        SessionCmd::History { from, to, page, page_size } => {
            let from = from.as_deref().map(parse_day_start).transpose()?;
            let to = to.as_deref().map(parse_day_end).transpose()?;

            let history = engine.get_history(user, from, to, page, page_size).await?;

            if history.sessions.is_empty() {
                println!("{}", "(no sessions in range)".dimmed());
                return Ok(());
            }

            println!(
                "{} (page {} - {} total)",
                "Sessions:".cyan().bold(),
                history.page,
                history.total
            );

            for session in &history.sessions {
                let t = &session.totals;
                println!(
                    "• {} {} [{}] - {} sets, {:.0}kg",
                    session.started_at.format("%Y-%m-%d"),
                    session.title.bold(),
                    session.status,
                    t.total_sets,
                    t.total_tonnage
                );
            }

            Ok(())
        }

        SessionCmd::Prev { exercise } => {
            match engine.previous_exercise_data(user, &exercise).await? {
                Some(prev) => {
                    println!(
                        "{} {} on {}",
                        "Last:".cyan().bold(),
                        exercise.bold(),
                        prev.performed_at.format("%Y-%m-%d")
                    );
                    for (i, set) in prev.sets.iter().enumerate() {
                        let rpe = set.rpe.map(|r| format!(" @ RPE {}", r)).unwrap_or_default();
                        println!("  {} • {}kg × {}{}", i + 1, set.weight, set.reps, rpe);
                    }
                }
                None => println!("{} no previous data for `{}`", "warning:".yellow().bold(), exercise),
            }

            Ok(())
        }

        SessionCmd::Estimate { day } => {
            let estimate = match engine.estimate_duration(user, &day).await {
                Ok(e) => e,
                Err(e) => return report(e),
            };

            println!(
                "{} {} sets, ~{:.0}s rest → about {} minutes",
                "Estimate:".cyan().bold(),
                estimate.total_sets,
                estimate.average_rest_seconds,
                estimate.estimated_minutes
            );

            Ok(())
        }
    }
}

/// Expected engine failures become plain messages; anything else bubbles.
fn report(err: EngineError) -> Result<()> {
    if err.is_expected() {
        println!("{} {}", "error:".red().bold(), err);
        Ok(())
    } else {
        Err(err.into())
    }
}

fn parse_day_start(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%d-%m-%Y")?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()))
}

fn parse_day_end(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%d-%m-%Y")?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap()))
}

fn print_session(session: &WorkoutSession) {
    println!(
        "{} {} (started {}, {})",
        "Session:".cyan().bold(),
        session.title.bold(),
        session.started_at.format("%Y-%m-%d %H:%M"),
        session.status
    );

    if let Some(notes) = &session.notes {
        println!("{}", notes.dimmed());
    }

    if session.exercises.is_empty() {
        println!("\n{}", "(no exercises yet - `session add-ex`)".dimmed());
        return;
    }

    println!("\n{}", "Exercises:".cyan().bold());
    for (ei, ex) in session.exercises.iter().enumerate() {
        let idx = format!("{}", ei + 1).yellow();
        println!("{} • {} {}", idx, ex.name.bold(), format!("[{}]", ex.muscle).dimmed());

        for (si, set) in ex.sets.iter().enumerate() {
            let set_idx = format!("{}", si + 1).yellow();

            let plan = match (set.planned_weight, set.planned_reps) {
                (Some(w), Some(r)) => format!("{}kg × {}", w, r),
                (None, Some(r)) => format!("× {}", r),
                _ => "do your thing".to_string(),
            };

            let ghost = set
                .previous
                .map(|p| format!(" (prev {}kg × {})", p.weight, p.reps))
                .unwrap_or_default();

            let logged = match &set.actual {
                Some(a) => {
                    let rpe = a.rpe.map(|r| format!(" @ RPE {}", r)).unwrap_or_default();
                    let marker = match set.comparison {
                        Some(SetComparison::Better) => " ▲".green().to_string(),
                        Some(SetComparison::Worse) => " ▼".red().to_string(),
                        _ => String::new(),
                    };
                    format!("{}kg × {}{}{}", a.weight, a.reps, rpe, marker)
                }
                None => String::new(),
            };

            println!("    {} • {}{} | {}", set_idx, plan, ghost.dimmed(), logged);
        }
    }
}
