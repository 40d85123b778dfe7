use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stride_core::models::{GlobalGoalStatus, HabitFrequency, Resolution};

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "Goals, habits and daily reviews that sync across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage daily goals
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Manage habits
    Habit {
        #[command(subcommand)]
        command: HabitCommands,
    },
    /// Manage long-term goals
    #[command(alias = "global-goal")]
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Manage milestones of a long-term goal
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },
    /// End-of-day review
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Sync with the configured server
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Export all local data as JSON
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Merge an export from another device into local data
    Import {
        /// Export file to merge
        path: PathBuf,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Create a goal
    #[command(alias = "new")]
    Add {
        /// Goal title
        title: Vec<String>,
        /// Day to schedule it on (YYYY-MM-DD, today, tomorrow)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
    /// List goals
    List {
        /// Only goals scheduled on this day
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a goal as done
    Done {
        /// Goal ID or unique ID prefix
        id: String,
    },
    /// Move a goal to another day
    Reschedule {
        /// Goal ID or unique ID prefix
        id: String,
        /// New day (YYYY-MM-DD, today, tomorrow)
        date: String,
    },
    /// Delete a goal
    Delete {
        /// Goal ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum HabitCommands {
    /// Create a habit
    #[command(alias = "new")]
    Add {
        /// Habit title
        title: Vec<String>,
        #[arg(long, value_enum, default_value_t = FrequencyArg::Daily)]
        frequency: FrequencyArg,
    },
    /// List habits
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a habit off for a day
    Check {
        /// Habit ID or unique ID prefix
        id: String,
        /// Day to check (defaults to today)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
    /// Delete a habit
    Delete {
        /// Habit ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a long-term goal
    #[command(alias = "new")]
    Add {
        /// Title
        title: Vec<String>,
        #[arg(long)]
        category: Option<String>,
        /// Target day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        target_date: Option<String>,
    },
    /// List long-term goals
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the status of a long-term goal
    Status {
        /// Goal ID or unique ID prefix
        id: String,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Delete a long-term goal and its milestones
    Delete {
        /// Goal ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum MilestoneCommands {
    /// Add a milestone to a long-term goal
    Add {
        /// Parent goal ID or unique ID prefix
        plan: String,
        /// Milestone title
        title: Vec<String>,
    },
    /// List milestones of a long-term goal
    List {
        /// Parent goal ID or unique ID prefix
        plan: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a milestone as done
    Done {
        /// Milestone ID or unique ID prefix
        id: String,
    },
    /// Delete a milestone
    Delete {
        /// Milestone ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// Show days still waiting for a review
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flag a day as needing a review
    Mark {
        /// Day (YYYY-MM-DD, today, yesterday)
        date: String,
    },
    /// Close the review for a day
    EndDay {
        /// Day to close (defaults to today)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show sync state, queue size and last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List pending conflicts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve every pending conflict, then sync
    Resolve {
        /// Choices as `kind:id=local|server`
        #[arg(value_name = "CHOICE")]
        choices: Vec<String>,
        /// Use one side for every conflict
        #[arg(long, value_enum, value_name = "SIDE")]
        all: Option<ResolutionArg>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Sync server base URL
        #[arg(long, value_name = "URL")]
        sync_url: Option<String>,
        /// Account to sync as
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
        /// Bearer token presented to the sync server
        #[arg(long, value_name = "TOKEN")]
        api_token: Option<String>,
        /// Seconds between background polls
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FrequencyArg {
    Daily,
    Weekdays,
    Weekly,
}

impl From<FrequencyArg> for HabitFrequency {
    fn from(value: FrequencyArg) -> Self {
        match value {
            FrequencyArg::Daily => Self::Daily,
            FrequencyArg::Weekdays => Self::Weekdays,
            FrequencyArg::Weekly => Self::Weekly,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    NotStarted,
    InProgress,
    Achieved,
    Abandoned,
}

impl From<StatusArg> for GlobalGoalStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::NotStarted => Self::NotStarted,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Achieved => Self::Achieved,
            StatusArg::Abandoned => Self::Abandoned,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    Local,
    Server,
}

impl From<ResolutionArg> for Resolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Local => Self::Local,
            ResolutionArg::Server => Self::Server,
        }
    }
}
