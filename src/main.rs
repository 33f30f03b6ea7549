use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use pickems::cache::ResultsCache;
use pickems::config::TrackerConfig;
use pickems::service::PickemsService;
use pickems::source::{FixtureSource, LiquipediaSource, ResultsSource};
use pickems::store::{SnapshotStore, SqliteStore};

const USAGE: &str = "usage: pickems [--db PATH] <command>
  set <user_id> <user_name> <team>...   store picks (quote multi-word names)
  check <user_id> <user_name>           score one user's picks
  leaderboard                           rank every user
  teams                                 list teams valid for this stage
  details                               show tournament, stage, format and pick count
  upcoming                              list scheduled matches with confirmed teams
  help                                  show the chat help text
  chat                                  read `user_id<TAB>user_name<TAB>message` lines from stdin";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let (db_override, args) = split_db_arg(std::env::args().skip(1).collect());
    let Some((command, rest)) = args.split_first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let mut config = TrackerConfig::from_env()?;
    if let Some(path) = db_override {
        config.db_path = path;
    }
    let service = build_service(config)?;

    match command.as_str() {
        "set" => {
            let [user_id, user_name, teams @ ..] = rest else {
                return Err(anyhow!("set needs <user_id> <user_name> <team>..."));
            };
            match service.set_predictions(user_id, user_name, teams) {
                Ok(_) => println!("{user_name}'s Pickems have been updated"),
                Err(err) => println!("{}", err.user_message(user_name)),
            }
        }
        "check" => {
            let [user_id, user_name] = rest else {
                return Err(anyhow!("check needs <user_id> <user_name>"));
            };
            println!("{}", service.check_predictions(user_id, user_name)?);
        }
        "leaderboard" => println!("{}", service.leaderboard()?),
        "teams" => println!("{}", service.teams_message()?),
        "details" => println!("{}", service.details_message()),
        "upcoming" => println!("{}", service.upcoming_message()?),
        "help" => println!("{}", service.help_message()),
        "chat" => run_chat(&service)?,
        other => return Err(anyhow!("unknown command {other:?}\n{USAGE}")),
    }
    Ok(())
}

fn build_service(config: TrackerConfig) -> Result<PickemsService> {
    let config = Arc::new(config);
    let store = Arc::new(
        SqliteStore::open(&config.db_path, config.tournament.clone(), config.stage)
            .with_context(|| format!("open store {}", config.db_path.display()))?,
    );
    let source: Arc<dyn ResultsSource> = match (&config.fixture_path, &config.api_key) {
        (Some(path), _) => Arc::new(FixtureSource::new(path.clone())),
        (None, Some(key)) => Arc::new(LiquipediaSource::new(key.clone())),
        (None, None) => {
            return Err(anyhow!(
                "set LIQUIPEDIA_API_KEY or PICKEMS_FIXTURE to choose a results source"
            ));
        }
    };
    let snapshots: Arc<dyn SnapshotStore> = store.clone();
    let cache = ResultsCache::new(Arc::clone(&config), source, Some(snapshots));
    Ok(PickemsService::new(config, cache, store))
}

fn run_chat(service: &PickemsService) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        let mut parts = line.splitn(3, '\t');
        let (Some(user_id), Some(user_name), Some(message)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if let Some(reply) = service.handle_command(user_id, user_name, message) {
            writeln!(stdout, "{reply}")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn split_db_arg(args: Vec<String>) -> (Option<PathBuf>, Vec<String>) {
    let mut db = None;
    let mut rest = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--db=") {
            if !path.trim().is_empty() {
                db = Some(PathBuf::from(path.trim()));
            }
            continue;
        }
        if arg == "--db" {
            if let Some(next) = iter.next().filter(|n| !n.trim().is_empty()) {
                db = Some(PathBuf::from(next));
            }
            continue;
        }
        rest.push(arg);
    }
    (db, rest)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
