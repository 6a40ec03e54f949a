//! CLI argument parsing for taskgraph.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use taskgraph::{Priority, TaskFields, TaskId, TaskStatus};

#[derive(Parser)]
#[command(
    name = "tg",
    about = "A task dependency graph with cycle detection and cached queries",
    version,
    after_help = "Logs are written to: ~/.local/share/taskgraph/logs/taskgraph.log"
)]
pub struct Cli {
    /// Path to the store directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Every field of a task; updates replace all of them.
#[derive(Args, Debug)]
pub struct FieldArgs {
    /// Task title
    pub title: String,

    /// Description
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// Priority (low, medium, high)
    #[arg(short, long, default_value = "medium")]
    pub priority: Priority,

    /// Status (pending, in_progress, completed)
    #[arg(short, long, default_value = "pending")]
    pub status: TaskStatus,

    /// Due date, RFC 3339 (e.g. 2026-01-31T17:00:00Z)
    #[arg(long)]
    pub due: Option<DateTime<Utc>>,
}

impl From<FieldArgs> for TaskFields {
    fn from(args: FieldArgs) -> Self {
        TaskFields {
            title: args.title,
            description: args.description,
            priority: args.priority,
            status: args.status,
            due_at: args.due,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new store in the current directory
    Init,

    /// Create a new task
    Create(FieldArgs),

    /// List one page of tasks
    List {
        /// Zero-based page number
        #[arg(long, default_value = "0")]
        page: u32,

        /// Tasks per page
        #[arg(long, default_value = "10")]
        size: u32,

        /// Filter by status (pending, in_progress, completed)
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// Get a task by ID
    Get {
        /// Task ID
        id: TaskId,
    },

    /// Replace every field of a task
    Update {
        /// Task ID
        id: TaskId,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete a task and all of its dependency edges
    Delete {
        /// Task ID
        id: TaskId,
    },

    /// Add a dependency
    Depend {
        /// Task that depends on the other
        task_id: TaskId,

        /// Task that must be done first
        depends_on_id: TaskId,
    },

    /// Show every task a task depends on, directly or transitively
    Deps {
        /// Task ID
        id: TaskId,
    },

    /// Report overdue and upcoming tasks once
    Notify {
        /// Look-ahead window for upcoming tasks, in hours
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(i64).range(0..))]
        window_hours: i64,
    },

    /// Serve JSON-lines requests on stdin, responding on stdout
    Serve {
        /// Maximum requests executing at once
        #[arg(short, long, default_value = "8")]
        workers: usize,

        /// Seconds between overdue/upcoming scans
        #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
        notify_secs: u64,

        /// Look-ahead window for upcoming tasks, in hours
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(i64).range(0..))]
        window_hours: i64,
    },
}
