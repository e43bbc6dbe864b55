//! UniFlow - class schedule and task reminders.
//!
//! # Commands
//!
//! - `uniflow run`: Start the reminder daemon
//! - `uniflow check`: Evaluate reminders once and deliver what is due
//! - `uniflow import <pdf>`: Import a class routine from a PDF
//! - `uniflow class ...` / `uniflow task ...`: Manage the schedule and tasks,
//!   show the next class, edit tasks
//! - `uniflow settings ...`: Show or change preferences
//! - `uniflow notifications ...`: Inspect or request notification permission
//! - `uniflow export`: Write a JSON backup
//! - `uniflow reset`: Delete all stored data
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use uniflow::clock::SystemClock;
use uniflow::config::Config;
use uniflow::delivery::{
    DeliveryRouter, DesktopNotifier, NotificationCapability, PushRelay, ToastQueue,
    VisibilityFlag, WorkerSurface,
};
use uniflow::export::write_backup;
use uniflow::import::{read_pdf, review, GeminiClient};
use uniflow::reminders::{next_class, sort_for_listing, ReminderScheduler};
use uniflow::state::StateContainer;
use uniflow::storage::Storage;
use uniflow::types::{
    generate_id, parse_deadline, parse_hhmm, ClassSession, DayOfWeek, Preferences, Priority,
    Task, TaskEdit, THEME_IDS,
};
use uniflow::watcher::{spawn_reloader, StoreWatcher};

/// Canonical form deadlines are stored in.
const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// UniFlow - class schedule and task reminders.
///
/// Keeps your weekly classes and assignments, and reminds you 30 minutes
/// before each class and ahead of every deadline.
#[derive(Parser, Debug)]
#[command(name = "uniflow")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    UNIFLOW_DATA_DIR            Data directory (default: <user data dir>/uniflow)
    UNIFLOW_POLL_INTERVAL_SECS  Reminder poll period (default: 60)
    UNIFLOW_TOAST_SECS          In-app toast lifetime (default: 5)
    UNIFLOW_PUSH_URL            Push relay endpoint, e.g. https://ntfy.sh/<topic>
    GEMINI_API_KEY              Gemini API key for PDF import (or API_KEY)
    UNIFLOW_GEMINI_MODEL        Gemini model (default: gemini-3-flash-preview)

EXAMPLES:
    # Import your routine and review it before saving
    uniflow import routine.pdf

    # Add a task due next Friday evening
    uniflow task add CSE220 \"Lab report\" --deadline 2024-01-19T18:00 --priority high

    # Allow desktop notifications, then start the daemon
    uniflow notifications request
    uniflow run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the reminder daemon.
    Run,

    /// Evaluate reminders once, deliver what is due, and exit.
    Check,

    /// Import a class routine from a PDF using Gemini.
    Import {
        /// Path to the routine PDF.
        pdf: PathBuf,

        /// Save without asking for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage class sessions.
    #[command(subcommand)]
    Class(ClassCommand),

    /// Manage tasks.
    #[command(subcommand)]
    Task(TaskCommand),

    /// Show or change preferences.
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Inspect or request notification permission.
    #[command(subcommand)]
    Notifications(NotificationsCommand),

    /// Write a JSON backup of the schedule and tasks.
    Export {
        /// Output file (default: ./unisync-backup-YYYY-MM-DD.json).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete all stored schedule, task, and preference data.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ClassCommand {
    /// Add a class session.
    Add {
        /// Course code, e.g. CSE220.
        code: String,
        /// Course name.
        name: String,
        /// Day of the week (full name or three letters).
        day: DayOfWeek,
        /// Start time, HH:MM (24-hour).
        start: String,
        /// End time, HH:MM (24-hour).
        end: String,
        #[arg(long, default_value = "")]
        room: String,
        #[arg(long, default_value = "")]
        faculty: String,
    },
    /// List class sessions by day and start time.
    List,
    /// Show today's ongoing and upcoming class.
    Next,
    /// Remove a class session.
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Add a task.
    Add {
        /// Course code the task belongs to.
        course: String,
        title: String,
        /// Deadline, e.g. 2024-01-19T18:00.
        #[arg(short, long)]
        deadline: Option<String>,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Change a task's course, title, description, deadline, or priority.
    Edit {
        id: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(short, long)]
        title: Option<String>,
        /// New deadline, e.g. 2024-01-19T18:00. An empty value removes it.
        #[arg(short, long)]
        deadline: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
    },
    /// List tasks, open ones first by earliest deadline.
    List {
        /// Include completed tasks.
        #[arg(short, long)]
        all: bool,
    },
    /// Mark a task as done (or not done with --undo).
    Done {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Remove a task.
    Rm { id: String },
    /// Suggest study tasks for a course.
    Suggest { course_name: String },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the current preferences.
    Show,
    /// Change one preference.
    Set { key: SettingKey, value: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SettingKey {
    /// Master switch for all reminders.
    Notifications,
    ClassReminders,
    TaskDayBefore,
    TaskDeadline,
    TaskHourBefore,
    Theme,
    Quotes,
}

#[derive(Subcommand, Debug)]
enum NotificationsCommand {
    /// Show permission and channel status.
    Status,
    /// Ask for permission to show desktop notifications.
    Request,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Command::Run) {
        "info"
    } else {
        "warn"
    };
    init_logging(default_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli.command))
}

async fn run(command: Command) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let state = StateContainer::with_storage(Storage::new(&config.data_dir));

    match command {
        Command::Run => run_daemon(config, state).await,
        Command::Check => run_check(&config, state).await,
        Command::Import { pdf, yes } => run_import(&config, &state, pdf, yes).await,
        Command::Class(cmd) => run_class(&state, cmd).await,
        Command::Task(cmd) => run_task(&config, &state, cmd).await,
        Command::Settings(cmd) => run_settings(&state, cmd).await,
        Command::Notifications(cmd) => run_notifications(&config, cmd).await,
        Command::Export { output } => {
            let snapshot = state.snapshot().await;
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            let path = write_backup(&snapshot, output.as_deref(), &cwd, Utc::now())
                .context("Failed to write backup")?;
            println!("Backup written to {}", path.display());
            Ok(())
        }
        Command::Reset { force } => {
            if !force && !confirm("Delete all classes, tasks, and preferences?")? {
                eprintln!("Aborted.");
                return Ok(());
            }
            state.reset().await.context("Failed to reset data")?;
            println!("All data cleared.");
            Ok(())
        }
    }
}

/// Runs the reminder daemon until Ctrl+C or SIGTERM.
async fn run_daemon(config: Config, state: StateContainer) -> Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        poll_secs = config.poll_interval.as_secs(),
        push_relay = config.push_url.is_some(),
        "Starting UniFlow"
    );

    let toasts = ToastQueue::new(config.toast_lifetime);
    let router = build_router(&config, Some(toasts.clone()))?;
    let renderer = tokio::spawn(render_toasts(toasts.subscribe()));

    let (change_tx, change_rx) = mpsc::channel(16);
    let _watcher = StoreWatcher::new(config.data_dir.clone(), change_tx)
        .context("Failed to watch data directory")?;
    let reloader = spawn_reloader(state.clone(), change_rx);

    let mut scheduler = ReminderScheduler::new(state, router, Arc::new(SystemClock))
        .with_period(config.poll_interval);

    info!("UniFlow running. Press Ctrl+C to stop.");
    scheduler.run_until(wait_for_shutdown()).await;

    info!("Shutting down...");
    reloader.abort();
    renderer.abort();
    Ok(())
}

async fn run_check(config: &Config, state: StateContainer) -> Result<()> {
    let router = build_router(config, Some(ToastQueue::new(config.toast_lifetime)))?;
    let scheduler = ReminderScheduler::new(state, router, Arc::new(SystemClock));

    let fired = scheduler.tick_once().await;
    if fired.is_empty() {
        println!("No reminders due right now.");
    }
    for reminder in fired {
        println!("{}: {}", reminder.title, reminder.body);
    }
    Ok(())
}

fn build_router(config: &Config, toasts: Option<ToastQueue>) -> Result<DeliveryRouter> {
    let visibility = VisibilityFlag::new(io::stderr().is_terminal());
    let desktop = DesktopNotifier::load(&config.data_dir, DesktopNotifier::terminal_prompt());
    let relay = PushRelay::new(config.push_url.clone()).context("Failed to create push relay")?;

    let mut router = DeliveryRouter::new(Arc::new(visibility)).with_system(Arc::new(desktop));
    if relay.is_ready() {
        router = router.with_worker(Arc::new(relay));
    }
    if let Some(toasts) = toasts {
        router = router.with_toasts(toasts);
    }
    Ok(router)
}

/// Prints toasts to stderr as they arrive.
async fn render_toasts(mut rx: broadcast::Receiver<uniflow::delivery::Toast>) {
    loop {
        match rx.recv().await {
            Ok(toast) => {
                eprintln!("[{}] {}: {}", Local::now().format("%H:%M"), toast.title, toast.message);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Toast renderer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_import(config: &Config, state: &StateContainer, pdf: PathBuf, yes: bool) -> Result<()> {
    let bytes = read_pdf(&pdf).await?;
    let client = GeminiClient::from_config(&config.gemini)?;

    eprintln!("Analyzing routine with AI...");
    let raw = client
        .parse_schedule(&bytes)
        .await
        .context("Failed to process PDF")?;
    let reviewed = review(raw);

    for rejected in &reviewed.rejected {
        eprintln!("Skipping row {}: {}", rejected.index + 1, rejected.reason);
    }
    if reviewed.sessions.is_empty() {
        bail!("No classes found in {}", pdf.display());
    }

    print_classes(&reviewed.sessions);
    if !yes && !confirm("Replace your current schedule with these classes?")? {
        eprintln!("Aborted.");
        return Ok(());
    }

    let count = reviewed.sessions.len();
    state.replace_schedule(reviewed.sessions).await?;
    println!("Saved {count} classes.");
    Ok(())
}

async fn run_class(state: &StateContainer, cmd: ClassCommand) -> Result<()> {
    match cmd {
        ClassCommand::Add {
            code,
            name,
            day,
            start,
            end,
            room,
            faculty,
        } => {
            for time in [&start, &end] {
                if parse_hhmm(time).is_none() {
                    bail!("Invalid time '{time}', expected HH:MM");
                }
            }
            let session = ClassSession {
                id: generate_id(),
                course_name: name,
                course_code: code,
                faculty,
                room,
                day,
                start_time: start,
                end_time: end,
                color: None,
            };
            let id = session.id.clone();
            state.add_class(session).await?;
            println!("Added class {id}.");
        }
        ClassCommand::List => {
            let schedule = state.snapshot().await.schedule;
            if schedule.is_empty() {
                println!("No classes yet. Import a routine with `uniflow import <pdf>`.");
            } else {
                print_classes(&schedule);
            }
        }
        ClassCommand::Next => {
            let schedule = state.snapshot().await.schedule;
            let next = next_class(Local::now().naive_local(), &schedule);
            match next.ongoing {
                Some(session) => println!(
                    "Now:  {} {} until {} in {}",
                    session.course_code,
                    session.display_name(),
                    session.end_time,
                    session.room
                ),
                None => println!("Now:  no class in progress"),
            }
            match next.upcoming {
                Some(session) => println!(
                    "Next: {} {} at {} in {}",
                    session.course_code,
                    session.display_name(),
                    session.start_time,
                    session.room
                ),
                None => println!("Next: no more classes today"),
            }
        }
        ClassCommand::Rm { id } => {
            let removed = state.delete_class(&id).await?;
            println!("Removed {}.", removed.display_name());
        }
    }
    Ok(())
}

async fn run_task(config: &Config, state: &StateContainer, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            course,
            title,
            deadline,
            priority,
            description,
        } => {
            let deadline = match deadline {
                Some(raw) => normalize_deadline(&raw)?,
                None => String::new(),
            };
            let task = Task {
                id: generate_id(),
                course_code: course,
                title,
                description,
                deadline,
                completed: false,
                priority,
            };
            let id = task.id.clone();
            state.add_task(task).await?;
            println!("Added task {id}.");
        }
        TaskCommand::Edit {
            id,
            course,
            title,
            deadline,
            description,
            priority,
        } => {
            let edit = TaskEdit {
                course_code: course,
                title,
                description,
                deadline: deadline.as_deref().map(normalize_deadline).transpose()?,
                priority,
            };
            if edit.is_empty() {
                bail!("Nothing to change, pass at least one of --course, --title, --deadline, --description, --priority");
            }

            let mut task = state.find_task(&id).await?;
            edit.apply_to(&mut task);
            let title = task.title.clone();
            state.update_task(task).await?;
            println!("Updated '{title}'.");
        }
        TaskCommand::List { all } => {
            let mut tasks: Vec<Task> = state
                .snapshot()
                .await
                .tasks
                .into_iter()
                .filter(|task| all || !task.completed)
                .collect();
            sort_for_listing(&mut tasks);
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                let mark = if task.completed { "x" } else { " " };
                let deadline = if task.deadline.is_empty() {
                    "no deadline"
                } else {
                    task.deadline.as_str()
                };
                println!(
                    "[{mark}] {}  {:<8} {} ({deadline}, {:?})",
                    task.id, task.course_code, task.title, task.priority
                );
            }
        }
        TaskCommand::Done { id, undo } => {
            let task = state.set_task_completed(&id, !undo).await?;
            let status = if task.completed { "done" } else { "not done" };
            println!("Marked '{}' as {status}.", task.title);
        }
        TaskCommand::Rm { id } => {
            let removed = state.delete_task(&id).await?;
            println!("Removed '{}'.", removed.title);
        }
        TaskCommand::Suggest { course_name } => {
            let client = GeminiClient::from_config(&config.gemini)?;
            for suggestion in client.suggest_tasks(&course_name).await {
                println!("- {suggestion}");
            }
        }
    }
    Ok(())
}

async fn run_settings(state: &StateContainer, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => print_preferences(&state.preferences()),
        SettingsCommand::Set { key, value } => {
            if let SettingKey::Theme = key {
                if !THEME_IDS.contains(&value.as_str()) {
                    bail!("Unknown theme '{value}', expected one of {}", THEME_IDS.join(", "));
                }
                let prefs = state
                    .update_preferences(|prefs| prefs.theme_id = value)
                    .await?;
                print_preferences(&prefs);
                return Ok(());
            }

            let enabled = parse_switch(&value)?;
            let prefs = state
                .update_preferences(|prefs| {
                    let settings = &mut prefs.notification_settings;
                    match key {
                        SettingKey::Notifications => prefs.enable_notifications = enabled,
                        SettingKey::ClassReminders => settings.class_reminders = enabled,
                        SettingKey::TaskDayBefore => settings.task_day_before = enabled,
                        SettingKey::TaskDeadline => settings.task_deadline = enabled,
                        SettingKey::TaskHourBefore => settings.task_hour_before = enabled,
                        SettingKey::Quotes => prefs.show_quotes = enabled,
                        SettingKey::Theme => {}
                    }
                })
                .await?;
            print_preferences(&prefs);
        }
    }
    Ok(())
}

async fn run_notifications(config: &Config, cmd: NotificationsCommand) -> Result<()> {
    let desktop = DesktopNotifier::load(&config.data_dir, DesktopNotifier::terminal_prompt());

    match cmd {
        NotificationsCommand::Status => {
            println!("Desktop notifications: {:?}", desktop.permission());
            match &config.push_url {
                Some(url) => println!("Push relay: {url}"),
                None => println!("Push relay: not configured (set UNIFLOW_PUSH_URL)"),
            }
        }
        NotificationsCommand::Request => {
            let permission = desktop.request_permission().await;
            println!("Desktop notifications: {permission:?}");
        }
    }
    Ok(())
}

fn print_classes(schedule: &[ClassSession]) {
    let mut sorted: Vec<&ClassSession> = schedule.iter().collect();
    sorted.sort_by_key(|session| {
        (
            DayOfWeek::ALL.iter().position(|day| *day == session.day),
            session.start_minutes(),
        )
    });

    for session in sorted {
        println!(
            "{}  {:<9} {}-{}  {:<8} {:<28} {:<10} {}",
            session.id,
            session.day,
            session.start_time,
            session.end_time,
            session.course_code,
            session.course_name,
            session.room,
            session.faculty
        );
    }
}

fn print_preferences(prefs: &Preferences) {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    let settings = &prefs.notification_settings;

    println!("notifications     {}", on_off(prefs.enable_notifications));
    println!("class-reminders   {}", on_off(settings.class_reminders));
    println!("task-day-before   {}", on_off(settings.task_day_before));
    println!("task-deadline     {}", on_off(settings.task_deadline));
    println!("task-hour-before  {}", on_off(settings.task_hour_before));
    println!("theme             {}", prefs.theme_id);
    println!("quotes            {}", on_off(prefs.show_quotes));
}

/// Parses a deadline and returns it in the stored form. Empty input means
/// "no deadline".
fn normalize_deadline(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    let parsed = parse_deadline(raw)
        .with_context(|| format!("Invalid deadline '{raw}', expected YYYY-MM-DDTHH:MM"))?;
    Ok(parsed.format(DEADLINE_FORMAT).to_string())
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => bail!("Expected on or off, got '{value}'"),
    }
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Initializes the tracing subscriber. Logs go to stderr so command output
/// on stdout stays clean.
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
