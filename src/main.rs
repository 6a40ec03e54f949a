//! Taskgraph CLI - a task dependency graph with cached queries.

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use taskgraph::notify::scan_store;
use taskgraph::{ErrorKind, Server, ServerConfig, Store, Task, TaskStatus};

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskgraph")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskgraph.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn window_from_hours(hours: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_hours(hours).ok_or_else(|| eyre!("Window of {} hours is out of range", hours))
}

fn format_status(status: &TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => "pending".green(),
        TaskStatus::InProgress => "in_progress".yellow(),
        TaskStatus::Completed => "completed".blue(),
    }
}

fn print_task(task: &Task) {
    println!("{}: {}", "ID".bold(), task.id.to_string().cyan());
    println!("{}: {}", "Title".bold(), task.title);
    println!("{}: {}", "Status".bold(), format_status(&task.status));
    println!("{}: {}", "Priority".bold(), task.priority);
    if let Some(desc) = &task.description {
        println!("{}: {}", "Description".bold(), desc);
    }
    if let Some(due) = &task.due_at {
        println!("{}: {}", "Due".bold(), due);
    }
    println!("{}: {}", "Created".bold(), task.created_at);
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize task store")?;
            println!("{} Initialized task store in {}", "✓".green(), store_dir.display());
        }

        Command::Create(fields) => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.create_task(fields.into()).context("Failed to create task")?;

            println!("{} Created: {} {}", "✓".green(), task.id.to_string().cyan(), task.title);
        }

        Command::List { page, size, status } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let listing = store.list_tasks(page, size, status).context("Failed to list tasks")?;

            if listing.tasks.is_empty() {
                println!("{}", "No tasks found".dimmed());
            } else {
                for task in &listing.tasks {
                    let due = task
                        .due_at
                        .map(|d| format!(" due {}", d.format("%Y-%m-%d %H:%M")))
                        .unwrap_or_default();
                    println!(
                        "{} {} {} {}{}",
                        format_status(&task.status),
                        task.id.to_string().cyan(),
                        task.priority,
                        task.title,
                        due.dimmed()
                    );
                }
            }
            println!(
                "{}",
                format!(
                    "page {} ({} per page), {} task(s) total",
                    listing.page, listing.page_size, listing.total
                )
                .dimmed()
            );
        }

        Command::Get { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;

            match store.get_task(id) {
                Ok(task) => print_task(&task),
                Err(e) if e.kind() == ErrorKind::NotFound => return Err(eyre!("Task not found: {}", id)),
                Err(e) => return Err(e).context("Failed to get task"),
            }
        }

        Command::Update { id, fields } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let task = store.update_task(id, fields.into()).context("Failed to update task")?;

            println!("{} Updated: {} {}", "✓".green(), task.id.to_string().cyan(), task.title);
        }

        Command::Delete { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            store.delete_task(id).context("Failed to delete task")?;

            println!("{} Deleted task {}", "✓".green(), id.to_string().cyan());
        }

        Command::Depend { task_id, depends_on_id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            store
                .add_dependency(task_id, depends_on_id)
                .context("Failed to add dependency")?;

            println!(
                "{} {} now depends on {}",
                "✓".green(),
                task_id.to_string().cyan(),
                depends_on_id.to_string().cyan()
            );
        }

        Command::Deps { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let deps = store.dependencies(id).context("Failed to resolve dependencies")?;

            if deps.is_empty() {
                println!("{}", "No dependencies".dimmed());
            } else {
                println!("{} {} depends on {} task(s):", "→".blue(), id.to_string().cyan(), deps.len());
                for dep in deps {
                    match store.get_task(dep) {
                        Ok(task) => println!("  {} {}", dep.to_string().cyan(), task.title),
                        Err(_) => println!("  {}", dep.to_string().cyan()),
                    }
                }
            }
        }

        Command::Notify { window_hours } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let report = scan_store(&store, window_from_hours(window_hours)?).context("Failed to scan tasks")?;

            for id in &report.overdue {
                println!("{} overdue: {}", "!".red(), id.to_string().cyan());
            }
            for id in &report.upcoming {
                println!("{} upcoming: {}", "→".yellow(), id.to_string().cyan());
            }
            if report.overdue.is_empty() && report.upcoming.is_empty() {
                println!("{}", "Nothing overdue or upcoming".dimmed());
            }
        }

        Command::Serve {
            workers,
            notify_secs,
            window_hours,
        } => {
            let config = ServerConfig::new(&store_dir)
                .workers(workers)
                .notify_interval(Duration::from_secs(notify_secs))
                .upcoming_window(window_from_hours(window_hours)?);
            let server = Server::new(config).context("Failed to create server")?;

            // Run server in async runtime
            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(async {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                server.run(stdin, tokio::io::stdout()).await
            })
            .context("Server error")?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
