use std::fs;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::TemplateCmd;
use crate::engine::SessionEngine;
use crate::store::templates::DayImport;
use crate::types::{best_muscle_suggestions, cannonical_muscle};

pub async fn handle(cmd: TemplateCmd, engine: &SessionEngine) -> Result<()> {
    match cmd {
        TemplateCmd::Import { files } => {
            if files.is_empty() {
                println!("{} no files given", "error:".red().bold());
                return Ok(());
            }

            for file in files {
                let content = fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read template file: {file}"))?;
                let import: DayImport = toml::from_str(&content)
                    .with_context(|| format!("Invalid template file: {file}"))?;

                // Validate muscles here so we can suggest a fix; the store
                // re-checks before writing.
                let mut bad = false;
                for ex in &import.exercise {
                    if cannonical_muscle(&ex.muscle).is_none() {
                        print!(
                            "{} unknown muscle `{}` for exercise `{}` in {}",
                            "error:".red().bold(),
                            ex.muscle,
                            ex.name,
                            file
                        );
                        match Some(ex.muscle.as_str())
                            .filter(|m| !m.trim().is_empty())
                            .and_then(best_muscle_suggestions)
                        {
                            Some(s) => println!(" - did you mean `{}`?", s.bold()),
                            None => println!(),
                        }
                        bad = true;
                    }
                }
                if bad {
                    continue;
                }

                let day = engine.templates.import_day(&import).await?;
                println!("{} imported day: {} (id: {})", "ok:".green().bold(), day.name.bold(), day.id);
            }

            Ok(())
        }

        TemplateCmd::List => {
            let days = engine.templates.days().await?;
            if days.is_empty() {
                println!("{}", "(no day templates - `template import`)".dimmed());
                return Ok(());
            }

            println!("{}", "Days:".cyan().bold());
            for day in days {
                println!("• {} {}", day.name.bold(), format!("({})", day.id).dimmed());
            }

            Ok(())
        }

        TemplateCmd::Show { day } => {
            let Some(day) = engine.templates.day(&day).await? else {
                println!("{} template day not found", "error:".red().bold());
                return Ok(());
            };

            println!("{} {}", "Day:".cyan().bold(), day.name.bold());

            for ex in engine.templates.exercises_by_day(&day.id).await? {
                println!(
                    "{} • {} {}",
                    format!("{}", ex.order_index + 1).yellow(),
                    ex.name.bold(),
                    format!("[{}]", ex.muscle).dimmed()
                );

                for set in engine.templates.sets_by_exercise(&ex.id).await? {
                    let plan = match (set.weight, set.reps) {
                        (Some(w), Some(r)) => format!("{}kg × {}", w, r),
                        (None, Some(r)) => format!("× {}", r),
                        (Some(w), None) => format!("{}kg", w),
                        (None, None) => "open".to_string(),
                    };
                    println!("    {} • {}", format!("{}", set.order_index + 1).yellow(), plan);
                }
            }

            Ok(())
        }
    }
}
