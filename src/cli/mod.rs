#![forbid(unsafe_code)]

use std::io::{BufRead as _, IsTerminal as _, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgAction, CommandFactory as _, Parser, Subcommand};

use crate::api::http::HttpBackend;
use crate::config::{self, Config};
use crate::core::controller::{DeleteOutcome, TaskListController};
use crate::error::TasklistError;
use crate::logging::{self, LogTarget};
use crate::output::table::Table;
use crate::task::model::{RecordId, Task, TaskId, TaskStatus};
use crate::task::sort::FieldPath;
use crate::task::user::{self, User};
use crate::tui;

#[derive(Debug, Parser)]
#[command(name = "tasklist", version, about = "Task list client for the todos REST API")]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "ls")]
    List(ListArgs),
    Users(UsersArgs),
    Whoami,
    Add(AddArgs),
    Edit(EditArgs),
    Assign(AssignArgs),
    Status(StatusArgs),
    #[command(alias = "rm")]
    Delete(DeleteArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Sort by field path (id, description, assigned.username, status, createdAt.date, ...)
    #[arg(short = 's', long = "sort")]
    pub sort: Option<String>,
    /// Reverse the sort order
    #[arg(short = 'r', long = "reverse")]
    pub reverse: bool,
    /// Only show tasks whose id, text, assignee or status contains this
    #[arg(short = 'f', long = "filter", default_value = "")]
    pub filter: String,
    /// Output as JSON
    #[arg(long = "json", conflicts_with = "csv")]
    pub json: bool,
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct UsersArgs {
    /// Output as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Task description
    pub description: String,
    /// Initial status
    #[arg(short = 's', long = "status", default_value = "WAITING")]
    pub status: TaskStatus,
    /// Username to assign the task to
    #[arg(short = 'a', long = "assign")]
    pub assign: Option<String>,
}

#[derive(Debug, Parser)]
pub struct EditArgs {
    /// Task ID
    pub id: String,
    /// New description
    #[arg(short = 'd', long = "description")]
    pub description: Option<String>,
    /// New status
    #[arg(short = 's', long = "status")]
    pub status: Option<TaskStatus>,
    /// Username to assign the task to
    #[arg(short = 'a', long = "assign", conflicts_with = "unassign")]
    pub assign: Option<String>,
    /// Remove the assignee
    #[arg(long = "unassign")]
    pub unassign: bool,
}

#[derive(Debug, Parser)]
pub struct AssignArgs {
    /// Username
    pub username: String,
    /// Task IDs
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// WAITING, IN_PROGRESS, COMPLETED or CANCELED
    pub status: TaskStatus,
    /// Task IDs
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Task IDs
    #[arg(required = true)]
    pub ids: Vec<String>,
    /// Do not ask for confirmation
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let verbose = cli.verbose;
    match cli.cmd {
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "tasklist", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Version) => Ok(cmd_version()),
        Some(Commands::Config(args)) => cmd_config(args),
        None => cmd_default(verbose).await,
        Some(Commands::List(args)) => cmd_list(verbose, args).await,
        Some(Commands::Users(args)) => cmd_users(verbose, args).await,
        Some(Commands::Whoami) => cmd_whoami(verbose).await,
        Some(Commands::Add(args)) => cmd_add(verbose, args).await,
        Some(Commands::Edit(args)) => cmd_edit(verbose, args).await,
        Some(Commands::Assign(args)) => cmd_assign(verbose, args).await,
        Some(Commands::Status(args)) => cmd_status(verbose, args).await,
        Some(Commands::Delete(args)) => cmd_delete(verbose, args).await,
    }
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<ExitCode> {
    match args.cmd {
        ConfigCmd::List => {
            print!("{}", config::list_resolved_toml()?);
        }
        ConfigCmd::Set(set) => {
            config::set_value_string(&set.key, &set.value)?;
            println!("Set {} = {}", set.key, set.value);
        }
        ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
            Some(v) => println!("{v}"),
            None => anyhow::bail!(
                "configuration key '{}' not found - use 'tasklist config list' to see available keys",
                get.key
            ),
        },
    }
    Ok(ExitCode::SUCCESS)
}

async fn load_cfg() -> anyhow::Result<Config> {
    let cfg = tokio::task::spawn_blocking(|| -> anyhow::Result<Config> {
        let (cfg, _paths) = config::load()?;
        Ok(cfg)
    })
    .await??;
    Ok(cfg)
}

/// Loads config, installs the logger and connects to the backend. Does not load data.
async fn setup(verbose: u8, target: LogTarget) -> anyhow::Result<(Config, TaskListController<HttpBackend>)> {
    let cfg = load_cfg().await?;
    logging::init(&cfg.log.level, verbose, target)?;
    let backend = HttpBackend::new(&cfg.server)?;
    tracing::debug!(url = %backend.tasks_url(), "backend configured");
    Ok((cfg, TaskListController::new(backend)))
}

async fn connect(verbose: u8) -> anyhow::Result<TaskListController<HttpBackend>> {
    let (_cfg, mut ctl) = setup(verbose, LogTarget::Stderr).await?;
    ctl.load_all().await.context("failed to load data from server")?;
    Ok(ctl)
}

async fn cmd_default(verbose: u8) -> anyhow::Result<ExitCode> {
    if !tui::is_tty() {
        let args = ListArgs {
            sort: None,
            reverse: false,
            filter: String::new(),
            json: false,
            csv: false,
        };
        return cmd_list(verbose, args).await;
    }

    let cfg = load_cfg().await?;
    let target = if cfg.log.file.trim().is_empty() {
        LogTarget::Off
    } else {
        LogTarget::File(PathBuf::from(config::expand_tilde(cfg.log.file.trim())))
    };
    logging::init(&cfg.log.level, verbose, target)?;
    let ctl = TaskListController::new(HttpBackend::new(&cfg.server)?);
    tui::app::run(&cfg, ctl).await?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list(verbose: u8, args: ListArgs) -> anyhow::Result<ExitCode> {
    let (cfg, mut ctl) = setup(verbose, LogTarget::Stderr).await?;
    ctl.load_all().await.context("failed to load data from server")?;

    let state = ctl.state_mut();
    let reverse = match &args.sort {
        Some(_) => args.reverse,
        None => args.reverse || cfg.ui.default_reverse,
    };
    let sort = args.sort.unwrap_or_else(|| cfg.ui.default_sort.clone());
    if !sort.trim().is_empty() {
        let key = FieldPath::new(&sort);
        state.sort(key.clone());
        if reverse {
            state.sort(key);
        }
    }
    state.set_filter(args.filter);

    let view = ctl.state().sorted_view();
    if args.json {
        let tasks: Vec<&Task> = view.iter().collect();
        let mut out = serde_json::to_string_pretty(&tasks)?;
        out.push('\n');
        print!("{out}");
        return Ok(ExitCode::SUCCESS);
    }

    let table = Table::tasks(&view);
    if args.csv {
        table.print_csv()?;
    } else if table.is_empty() {
        println!("No tasks.");
    } else {
        table.print()?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_users(verbose: u8, args: UsersArgs) -> anyhow::Result<ExitCode> {
    let ctl = connect(verbose).await?;
    let users = ctl.state().users();
    if args.json {
        let mut out = serde_json::to_string_pretty(users)?;
        out.push('\n');
        print!("{out}");
    } else {
        Table::users(users).print()?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_whoami(verbose: u8) -> anyhow::Result<ExitCode> {
    let ctl = connect(verbose).await?;
    match ctl.state().current_user() {
        Some(u) => {
            println!("{} ({})", u.username, u.rank);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("Not signed in.");
            Ok(ExitCode::from(2))
        }
    }
}

fn resolve_user(users: &[User], username: &str) -> Result<User, TasklistError> {
    user::find_by_username(users, username)
        .cloned()
        .ok_or_else(|| TasklistError::UserNotFound(username.to_owned()))
}

fn resolve_ids(
    ctl: &TaskListController<HttpBackend>,
    raw: &[String],
) -> Result<Vec<TaskId>, TasklistError> {
    raw.iter()
        .map(|s| {
            let id = RecordId::parse(s);
            match ctl.state().task(&id) {
                Some(_) => Ok(id),
                None => Err(TasklistError::TaskNotFound(s.clone())),
            }
        })
        .collect()
}

async fn cmd_add(verbose: u8, args: AddArgs) -> anyhow::Result<ExitCode> {
    let mut ctl = connect(verbose).await?;

    let mut task = Task::draft();
    task.description = args.description;
    task.status = args.status;
    if let Some(name) = args.assign.as_deref() {
        task.assigned = Some(resolve_user(ctl.state().users(), name)?);
    }

    let before = ctl.state().tasks().len();
    ctl.save(vec![task]).await?;
    match ctl.state().tasks().get(before).and_then(|t| t.id.as_ref()) {
        Some(id) => println!("Created task {id}"),
        None => println!("Saved task"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_edit(verbose: u8, args: EditArgs) -> anyhow::Result<ExitCode> {
    let mut ctl = connect(verbose).await?;
    let id = resolve_ids(&ctl, std::slice::from_ref(&args.id))?.remove(0);
    let Some(mut task) = ctl.state().task(&id).cloned() else {
        return Err(TasklistError::TaskNotFound(args.id).into());
    };

    if let Some(description) = args.description {
        task.description = description;
    }
    if let Some(status) = args.status {
        task.status = status;
    }
    if args.unassign {
        task.assigned = None;
    } else if let Some(name) = args.assign.as_deref() {
        task.assigned = Some(resolve_user(ctl.state().users(), name)?);
    }

    ctl.save(vec![task]).await?;
    println!("Updated task {id}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_assign(verbose: u8, args: AssignArgs) -> anyhow::Result<ExitCode> {
    let mut ctl = connect(verbose).await?;
    let ids = resolve_ids(&ctl, &args.ids)?;
    let user = resolve_user(ctl.state().users(), &args.username)?;

    ctl.state_mut().select_only(&ids);
    let n = ctl.assign_to(Some(user)).await?;
    println!("Assigned {n} task(s) to {}", args.username);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(verbose: u8, args: StatusArgs) -> anyhow::Result<ExitCode> {
    let mut ctl = connect(verbose).await?;
    let ids = resolve_ids(&ctl, &args.ids)?;

    ctl.state_mut().select_only(&ids);
    let n = ctl.change_status(args.status).await?;
    println!("Set {n} task(s) to {}", args.status);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_delete(verbose: u8, args: DeleteArgs) -> anyhow::Result<ExitCode> {
    let mut ctl = connect(verbose).await?;
    let ids = resolve_ids(&ctl, &args.ids)?;
    let targets: Vec<Task> = ids
        .iter()
        .filter_map(|id| ctl.state().task(id).cloned())
        .collect();

    if !args.yes && !std::io::stdin().is_terminal() {
        anyhow::bail!("refusing to delete without confirmation; pass --yes");
    }
    let yes = args.yes;
    let outcome = ctl
        .delete_tasks(Some(targets), |msg| yes || confirm_on_stdin(msg))
        .await?;

    let (message, code) = delete_report(outcome);
    println!("{message}");
    Ok(ExitCode::from(code))
}

/// Message and exit code. A declined prompt exits 2, distinct from failures (1).
fn delete_report(outcome: DeleteOutcome) -> (String, u8) {
    match outcome {
        DeleteOutcome::Deleted(n) => (format!("Deleted {n} task(s)"), 0),
        DeleteOutcome::Declined => ("Cancelled.".to_owned(), 2),
        DeleteOutcome::Nothing => ("Nothing to delete.".to_owned(), 0),
    }
}

fn confirm_on_stdin(message: &str) -> bool {
    print!("{message} [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    is_yes(&line)
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "o" | "oui"
    )
}

fn cmd_version() -> ExitCode {
    println!("tasklist version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}
