use clap::{Parser, Subcommand};

use crate::types::{Muscle, SetKind};

#[derive(Parser)]
#[command(name = "ferrum", version, about = "CLI workout tracker")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Act as this user (defaults to the `user` config key).
    #[arg(global = true, long)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Session-scoped commands
    #[command(subcommand, visible_alias = "s")]
    Session(SessionCmd),

    /// Day template management
    #[command(subcommand, visible_alias = "t")]
    Template(TemplateCmd),

    /// View or edit ferrum config
    #[command(subcommand)]
    Config(ConfigCmd),
}

//
// Commands
//

#[derive(Subcommand)]
pub enum SessionCmd {
    /// Start a session
    #[command(visible_alias = "s")]
    Start {
        /// Seed from this day template (id or name)
        #[arg(short, long)]
        day: Option<String>,

        /// Session title
        #[arg(short, long)]
        title: Option<String>,

        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Repeat the structure of the last completed session
        #[arg(short, long)]
        repeat_last: bool,
    },

    /// Show current session details
    #[command(visible_alias = "i")]
    Show,

    /// Log a set in the current session - Usage: session set EXERCISE WEIGHT REPS
    #[command(visible_alias = "e")]
    #[command(override_usage = "session set <EXERCISE> <WEIGHT> <REPS>")]
    Set {
        /// Exercise index (1-based, same order shown in `session show`)
        #[arg(value_name = "EXERCISE")]
        exercise: usize,

        /// Weight lifted
        #[arg(value_name = "WEIGHT")]
        weight: f64,

        /// Number of reps
        #[arg(value_name = "REPS")]
        reps: i64,

        /// Weight in kilograms, when the display weight is in another unit
        #[arg(long)]
        kg: Option<f64>,

        /// Specific set index to log (defaults to the next unlogged set)
        #[arg(long, short = 's')]
        set: Option<usize>,

        /// Perceived exertion (RPE)
        #[arg(long)]
        rpe: Option<f64>,

        /// Set classification
        #[arg(long, value_enum, default_value_t)]
        kind: SetKind,

        /// Free-form note on the set
        #[arg(long)]
        note: Option<String>,
    },

    /// Undo the most recently logged set
    #[command(visible_alias = "u")]
    Undo,

    /// Add an exercise to the current session
    AddEx {
        /// Exercise name
        name: String,

        /// Primary muscle group
        #[arg(short, long, value_enum)]
        muscle: Muscle,

        /// Number of empty sets to append right away
        #[arg(short, long, default_value = "0")]
        sets: i64,
    },

    /// Add a set to an exercise in the current session
    AddSet {
        /// Exercise index (1-based)
        exercise: usize,

        /// Planned weight (defaults to the last logged set's weight)
        #[arg(long)]
        weight: Option<f64>,

        /// Planned reps (defaults to the last logged set's reps)
        #[arg(long)]
        reps: Option<i64>,
    },

    /// Finish the current session and run analytics
    #[command(visible_alias = "f")]
    Finish {
        /// Closing note appended to the session notes
        #[arg(long)]
        note: Option<String>,
    },

    /// Abandon the current session (kept in history, ignored by analytics)
    #[command(visible_alias = "c")]
    Cancel,

    /// List past sessions
    History {
        /// Start date, DD-MM-YYYY
        #[arg(long)]
        from: Option<String>,

        /// End date, DD-MM-YYYY
        #[arg(long)]
        to: Option<String>,

        #[arg(long, default_value = "1")]
        page: i64,

        #[arg(long, default_value = "10")]
        page_size: i64,
    },

    /// Show the last logged sets for an exercise
    #[command(visible_alias = "p")]
    Prev {
        /// Exercise name (exact)
        exercise: String,
    },

    /// Estimate how long a day template will take
    Estimate {
        /// Day template id or name
        day: String,
    },
}

#[derive(Subcommand)]
pub enum TemplateCmd {
    /// Import one or more day templates from TOML files
    #[command(visible_alias = "i")]
    Import { files: Vec<String> },

    /// List day templates
    #[command(visible_alias = "l")]
    List,

    /// Show a single day template in detail
    #[command(visible_alias = "s")]
    Show {
        /// Day template id or name
        day: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show all config keys
    List,

    /// Get the value of a key
    Get { key: String },

    /// Set or override a key
    Set { key: String, val: String },

    /// Remove a key
    Unset { key: String },
}
