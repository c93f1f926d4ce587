use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use estate_core::{Clock, Priority, Session, Status, StoreConnection, SystemClock, TaskRepository};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod state;
mod tasks;
mod views;

use config::Config;
use tasks::{AddArgs, ListFilter};

#[derive(Parser, Debug)]
#[command(
    name = "estate",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ESTATE_BUILD_SHA"), ")"),
    about = "Estate maintenance task tracker"
)]
struct Cli {
    /// Log filter (e.g. debug, estate_core=trace); overrides [log] level
    #[arg(long, global = true, env = "ESTATE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage ~/.estate/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Sign in; admins (per [access] admin_emails) may change tasks
    Login { email: String },

    /// Forget the signed-in session
    Logout,

    /// Show who is signed in
    Whoami,

    /// List tasks (deleted ones are hidden unless --all)
    List {
        #[arg(long)]
        all: bool,

        /// Only tasks with this status (e.g. "In Progress")
        #[arg(long)]
        status: Option<Status>,

        /// Case-insensitive match on the responsible person
        #[arg(long)]
        responsible: Option<String>,

        /// Only tasks in this category
        #[arg(long)]
        category: Option<String>,

        /// Only tasks with this priority (High, Medium, Low)
        #[arg(long)]
        priority: Option<Priority>,

        /// Case-insensitive text to look for in descriptions
        #[arg(long)]
        search: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one task
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Add a task (admin)
    Add {
        #[arg(long)]
        description: String,
        #[arg(long)]
        responsible: String,
        #[arg(long)]
        category: Option<String>,
        /// Start date (default: today)
        #[arg(long)]
        start: Option<String>,
        /// Deadline (default: a week from today)
        #[arg(long)]
        deadline: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        progress: Option<u8>,
        #[arg(long)]
        remarks: Option<String>,
    },

    /// Change fields of a task (admin): estate update 7 status=Completed progress=100
    Update {
        id: String,
        #[arg(required = true)]
        changes: Vec<String>,
    },

    /// Mark a task Deleted (admin); the row stays in the table
    Delete { id: String },

    /// Report task ids that appear on more than one row
    Duplicates,

    /// Dashboard: totals, overdue, upcoming, progress, counts by category/status/person
    Summary,

    /// Tasks grouped by workflow status
    Board,

    /// Deadlines for the next seven days
    Week,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config (and an empty CSV table) if missing
    Init,
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&cfg.log.level));

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                println!("# {}", config::config_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },

        Command::Login { email } => {
            let session = Session::login(&email, &cfg.access.admin_emails)?;
            state::write_session(&session)?;
            info!(email = %session.email, role = %session.role, "signed in");
            println!("Signed in as {} ({})", session.email, session.role);
        }

        Command::Logout => {
            if state::clear_session()? {
                println!("Signed out.");
            } else {
                println!("Not signed in.");
            }
        }

        Command::Whoami => match current_session(&cfg)? {
            Some(s) => println!("{} ({})", s.email, s.role),
            None => println!("Not signed in."),
        },

        Command::List {
            all,
            status,
            responsible,
            category,
            priority,
            search,
            json,
        } => {
            let repo = open_repository(&cfg)?;
            let snap = repo.fetch_all();
            let filter = ListFilter {
                all,
                status,
                responsible,
                category,
                priority,
                search,
            };
            if json {
                let rows: Vec<_> = snap.tasks.iter().filter(|t| filter.matches(t)).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                if let Some(err) = &snap.failure {
                    eprintln!("Could not read the task table: {err}");
                }
            } else {
                tasks::print_snapshot(&snap, &filter);
            }
        }

        Command::Show { id, json } => {
            let repo = open_repository(&cfg)?;
            let (row, task) = repo.find_by_id(&id)?;
            info!(task_id = %id, row, "found task");
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                tasks::print_task(&task);
            }
        }

        Command::Add {
            description,
            responsible,
            category,
            start,
            deadline,
            status,
            priority,
            progress,
            remarks,
        } => {
            require_admin(&cfg)?;
            let today = today(&cfg)?;
            let new = tasks::build_new_task(
                AddArgs {
                    description,
                    responsible,
                    category,
                    start,
                    deadline,
                    status,
                    priority,
                    progress,
                    remarks,
                },
                today,
            )?;
            let repo = open_repository(&cfg)?;
            let task = repo.append_task(new)?;
            println!("Added task {}: {}", task.id, task.description);
        }

        Command::Update { id, changes } => {
            require_admin(&cfg)?;
            let changes = tasks::parse_assignments(&changes)?;
            let repo = open_repository(&cfg)?;
            repo.update_fields(&id, &changes)?;
            println!("Updated task {id} ({} field(s)).", changes.len());
        }

        Command::Delete { id } => {
            require_admin(&cfg)?;
            let repo = open_repository(&cfg)?;
            repo.soft_delete(&id)?;
            println!("Task {id} marked Deleted.");
        }

        Command::Duplicates => {
            let repo = open_repository(&cfg)?;
            let snap = repo.try_fetch_all()?;
            let dups = snap.duplicate_ids();
            if dups.is_empty() {
                println!("No duplicate task ids.");
            } else {
                for id in dups {
                    let rows = snap.tasks.iter().filter(|t| t.id == id).count();
                    println!("Task ID {id} appears on {rows} rows");
                }
            }
        }

        Command::Summary => {
            let snap = fetch_for_view(&cfg)?;
            views::print_summary(&views::Summary::of(snap.active(), today(&cfg)?));
        }

        Command::Board => {
            let snap = fetch_for_view(&cfg)?;
            views::print_board(&views::board(snap.active()));
        }

        Command::Week => {
            let snap = fetch_for_view(&cfg)?;
            views::print_week(&views::week(snap.active(), today(&cfg)?));
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Connect to the configured table. A failed connection is reported once and
/// the commands carry on against an offline store: reads come back empty and
/// writes fail.
fn open_repository(cfg: &Config) -> Result<TaskRepository> {
    let backend = cfg.store.backend()?;
    if !cfg.store.backend.is_persistent() {
        eprintln!("Note: backend = \"memory\" is a dry run; changes are discarded when the command exits.");
    }
    let conn = match estate_sheets::connect(&backend) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Error connecting to the task table: {e}");
            StoreConnection::offline(e)
        }
    };
    let clock = SystemClock::from_name(&cfg.time.timezone)?;
    Ok(TaskRepository::new(conn).with_clock(clock))
}

fn today(cfg: &Config) -> Result<NaiveDate> {
    Ok(SystemClock::from_name(&cfg.time.timezone)?.now().date())
}

/// Snapshot for the read-only views; deleted tasks are left to `active()`.
fn fetch_for_view(cfg: &Config) -> Result<estate_core::Snapshot> {
    let snap = open_repository(cfg)?.fetch_all();
    if let Some(err) = &snap.failure {
        eprintln!("Could not read the task table: {err}");
    }
    for f in &snap.faults {
        eprintln!("warning: {f}");
    }
    Ok(snap)
}

fn require_admin(cfg: &Config) -> Result<Session> {
    authorize(state::read_session()?, &cfg.access.admin_emails)
}

/// Only the email is taken from the stored session; the role is worked out
/// again from the current admin list.
fn authorize(stored: Option<Session>, admin_emails: &[String]) -> Result<Session> {
    let Some(stored) = stored else {
        bail!("not signed in (run: estate login <email>)");
    };
    let session = Session::login(&stored.email, admin_emails)?;
    session.require_admin()?;
    Ok(session)
}

fn current_session(cfg: &Config) -> Result<Option<Session>> {
    match state::read_session()? {
        Some(s) => Ok(Some(Session::login(&s.email, &cfg.access.admin_emails)?)),
        None => Ok(None),
    }
}
