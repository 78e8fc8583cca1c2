//! insights - query workspace activity insights from the command line
//!
//! Runs one engine query against the SQLite activity store and prints the
//! result as JSON.

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use insights_core::timezone::parse_timezone;
use insights_core::transport::{encode, to_json, ErrorResponse};
use insights_core::window::resolve_token;
use insights_core::{Config, Database, InsightsEngine, Scope};
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_CODES: &str = "\
Exit codes:
  0  success
  1  setup failure (configuration, database file)
  4  rejected request: invalid range, pagination or scope
  5  data source or serialization failure

Query failures also print {\"kind\", \"status\", \"message\"} to stderr.";

#[derive(Parser, Debug)]
#[command(name = "insights")]
#[command(about = "Ranked, time-windowed workspace activity insights")]
#[command(version, after_help = EXIT_CODES)]
struct Cli {
    /// Time range: today, 7_day, 28_day or all_time
    #[arg(long, short, default_value = "today", global = true)]
    range: String,

    /// IANA timezone for calendar boundaries (default: the user's stored
    /// preference, then the configured default)
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Zero-based page
    #[arg(long, global = true, allow_negative_numbers = true)]
    page: Option<i64>,

    /// Items per page
    #[arg(long, global = true, allow_negative_numbers = true)]
    per_page: Option<i64>,

    /// Activity database (overrides the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Configuration file (default: $XDG_CONFIG_HOME/insights/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long, global = true)]
    pretty: bool,

    /// Evaluate the range as of this RFC 3339 instant instead of now
    #[arg(long, global = true, hide = true)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Most used emoji reactions
    Reactions(ScopeArgs),
    /// Most active channels with post counts over time
    Channels(ScopeArgs),
    /// Threads with the most replies
    Threads(ScopeArgs),
    /// Members who recently joined a team
    Members {
        /// Team id
        #[arg(long)]
        team: String,
    },
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Team id; alone it selects team scope, with --user it narrows user scope
    #[arg(long, required_unless_present = "user")]
    team: Option<String>,

    /// User id; selects user scope
    #[arg(long)]
    user: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> insights_core::Result<Scope> {
        match (&self.user, &self.team) {
            (Some(user), team) => Scope::user(user.clone(), team.clone()),
            (None, Some(team)) => Scope::team(team.clone()),
            (None, None) => Err(insights_core::Error::InvalidScope(
                "either --team or --user is required".to_string(),
            )),
        }
    }
}

/// Failure of a run: either host setup or a query the engine rejected.
enum Failure {
    Setup(anyhow::Error),
    Query(insights_core::Error),
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure::Setup(err)
    }
}

impl From<insights_core::Error> for Failure {
    fn from(err: insights_core::Error) -> Self {
        Failure::Query(err)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(Failure::Setup(err)) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
        Err(Failure::Query(err)) => {
            let response = ErrorResponse::from(&err);
            match to_json(&response) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("error: {}", err),
            }
            ExitCode::from((response.status / 100) as u8)
        }
    }
}

fn run(cli: &Cli) -> std::result::Result<String, Failure> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {:?}", path))?,
        None => Config::load().context("failed to load configuration")?,
    };
    let _log_guard = insights_core::logging::init(&config.logging).ok();

    let result = query(cli, &config);
    if let Err(Failure::Query(err)) = &result {
        let kind = err.kind();
        if kind.is_caller_error() {
            tracing::info!(kind = kind.code(), error = %err, "Query failed");
        } else {
            tracing::warn!(kind = kind.code(), error = %err, "Query failed");
        }
    }
    result
}

/// Open the store, resolve the window and run the selected query.
fn query(cli: &Cli, config: &Config) -> std::result::Result<String, Failure> {
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database {:?}", db_path))?;
    db.migrate().context("failed to run migrations")?;

    let user = match &cli.command {
        Command::Reactions(args) | Command::Channels(args) | Command::Threads(args) => {
            args.user.as_deref()
        }
        Command::Members { .. } => None,
    };
    let timezone = caller_timezone(cli, config, &db, user)?;

    let now = cli.now.unwrap_or_else(Utc::now);
    let window = resolve_token(&cli.range, timezone, now)?;
    let (page, per_page) = config.paging.normalize(cli.page, cli.per_page);
    let opts = window.query_options(page, per_page)?;

    let engine = InsightsEngine::new(db);
    let output = match &cli.command {
        Command::Reactions(args) => {
            encode(&engine.top_reactions(&args.scope()?, &opts)?, cli.pretty)?
        }
        Command::Channels(args) => encode(
            &engine.top_channels(&args.scope()?, &window, &opts)?,
            cli.pretty,
        )?,
        Command::Threads(args) => encode(&engine.top_threads(&args.scope()?, &opts)?, cli.pretty)?,
        Command::Members { team } => encode(&engine.new_team_members(team, &opts)?, cli.pretty)?,
    };

    Ok(output)
}

/// Explicit flag, then the user's stored preference, then the configured default.
fn caller_timezone(
    cli: &Cli,
    config: &Config,
    db: &Database,
    user: Option<&str>,
) -> std::result::Result<Tz, Failure> {
    if let Some(name) = &cli.timezone {
        return Ok(parse_timezone(name));
    }

    if let Some(user) = user {
        if let Some(preference) = db.user_timezone(user)? {
            if !preference.active_name().is_empty() {
                return Ok(preference.location());
            }
        }
    }

    Ok(config
        .timezone
        .zone()
        .context("invalid default timezone")?)
}
