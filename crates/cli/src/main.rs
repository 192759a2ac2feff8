// matchlens - entity resolution analyst console
// Connects to a resolution engine and explains how its entities came together

mod browse;
mod command;
mod exit_codes;
mod http_engine;
mod prompt;
mod render;
mod session;
mod sqlite_store;
mod util;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use matchlens_config::Settings;
use matchlens_evidence::{ConfigIndex, EvidenceError, EvidenceStore};

use exit_codes::{
    EXIT_CONFIG_INVALID, EXIT_CONFIG_PARSE, EXIT_CONFIG_READ, EXIT_ENGINE_CONNECT, EXIT_ENGINE_UNSET,
    EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE,
};
use http_engine::HttpEngine;
use prompt::Console;
use render::Renderer;
use session::Session;
use sqlite_store::SqliteStore;

#[derive(Parser)]
#[command(name = "matchlens")]
#[command(about = "Explain how a resolution engine matched, or did not match, its records")]
#[command(long_version = long_version())]
#[command(version)]
#[command(after_help = "\
Examples:
  matchlens --engine-url http://localhost:8250
  matchlens --engine-url http://localhost:8250 --database G2C.db --snapshot snapshot.json
  matchlens --config g2config.json why 1001
  matchlens get CUSTOMERS 1001
  MATCHLENS_ENGINE_URL=http://localhost:8250 matchlens why 1001,1002

With no command the interactive console starts; type help there for the command list.")]
struct Cli {
    /// Engine configuration document (G2_CONFIG); fetched from the engine when omitted
    #[arg(long, env = "MATCHLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the engine's REST gateway
    #[arg(long, env = "MATCHLENS_ENGINE_URL")]
    engine_url: Option<String>,

    /// Engine SQLite repository, opened read-only for feature and ambiguity lookups
    #[arg(long, env = "MATCHLENS_DATABASE")]
    database: Option<PathBuf>,

    /// Snapshot or audit statistics to load at startup
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Settings file (default: the user config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long)]
    debug: bool,

    /// Run a single console command and exit
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nbuild:   ", env!("BUILD_PROFILE"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Map a configuration failure to its exit code.
    pub fn config(err: EvidenceError) -> Self {
        let code = match err {
            EvidenceError::ConfigValidation(_) => EXIT_CONFIG_INVALID,
            _ => EXIT_CONFIG_PARSE,
        };
        Self::new(code, err.to_string())
    }

    pub fn command(err: session::CommandError) -> Self {
        let hint = match &err {
            session::CommandError::Parse(_) => Some("run `matchlens help` for the command list".to_string()),
            session::CommandError::Evidence(EvidenceError::StaleData(_)) => {
                Some("regenerate the snapshot statistics".to_string())
            }
            _ => None,
        };
        Self { code: err.exit_code(), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// startup
// ============================================================================

fn run(cli: Cli) -> Result<(), CliError> {
    let (settings, settings_path) = match &cli.settings {
        Some(path) => (Settings::load_from(path), path.clone()),
        None => (Settings::load(), Settings::config_path()),
    };
    log::debug!("settings from {}", settings_path.display());

    let engine_url = cli
        .engine_url
        .clone()
        .or_else(|| settings.engine_url.clone())
        .ok_or_else(|| {
            CliError::new(EXIT_ENGINE_UNSET, "no engine URL configured")
                .with_hint("pass --engine-url or set MATCHLENS_ENGINE_URL")
        })?;
    let engine = HttpEngine::new(&engine_url).map_err(|e| CliError::new(EXIT_ENGINE_CONNECT, e.to_string()))?;
    log::debug!("engine at {}", engine.base_url());

    let index = load_config(&cli, &settings, &engine)?;
    let store = open_store(cli.database.as_ref().or(settings.database.as_ref()));

    let scheme = settings.color_scheme;
    let mut session = Session::new(Box::new(engine), store, index, settings).with_settings_path(settings_path);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut input = prompt::line_source();
    let renderer = Renderer::new(scheme, atty::is(atty::Stream::Stdout));
    let mut console = Console::new(&mut out, &mut *input, renderer);

    if let Some(path) = &cli.snapshot {
        session
            .load_file(path, &mut console)
            .map_err(|e| CliError::usage(e.to_string()))?;
    }

    if !cli.command.is_empty() {
        let line = cli.command.join(" ");
        log::debug!("one-shot command: {}", line);
        session.execute_line(&line, &mut console).map_err(CliError::command)?;
        return Ok(());
    }

    session.run(&mut console).map_err(|e| CliError::io(format!("console: {}", e)))
}

/// `--config` file first, then the engine's own configuration.
fn load_config(cli: &Cli, settings: &Settings, engine: &HttpEngine) -> Result<ConfigIndex, CliError> {
    if let Some(path) = cli.config.as_ref().or(settings.engine_config.as_ref()) {
        let text = fs::read_to_string(path).map_err(|e| {
            CliError::new(EXIT_CONFIG_READ, format!("cannot read {}: {}", path.display(), e))
        })?;
        return ConfigIndex::from_json(&text).map_err(CliError::config);
    }

    let doc = engine.engine_config().map_err(|e| {
        CliError::new(EXIT_ENGINE_CONNECT, e.to_string()).with_hint("pass --config to read the configuration from a file")
    })?;
    ConfigIndex::from_value(&doc).map_err(CliError::config)
}

/// Without a database the console still runs; ambiguous widening and
/// audit review are the parts that go missing.
fn open_store(path: Option<&PathBuf>) -> Option<Box<dyn EvidenceStore>> {
    let path = path?;
    match SqliteStore::open(path) {
        Ok(store) => {
            log::debug!("database {}", path.display());
            Some(Box::new(store))
        }
        Err(e) => {
            log::warn!("{}; continuing without database lookups", e);
            None
        }
    }
}
