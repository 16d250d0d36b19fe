//! taskdeckctl - command-line view of Taskdeck reasoning logs
//!
//! Prints a task's reasoning log once, or follows it live with automatic
//! reconnection, using the same binding the dashboard renders from.

use std::collections::HashMap;
use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{LevelFilter, debug, info};
use taskdeck::api::TaskdeckClient;
use taskdeck::config::{self, AppConfig};
use taskdeck::logs::sort_logs;
use taskdeck::stream::Backoff;
use taskdeck::{LogView, ReasoningLogBinding};
use taskdeck_protocol::{ConnectionState, ReasoningLogEntry};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(&cli)?;
    ctx.init_logging();
    debug!("using config file {}", ctx.config_file.display());

    match cli.command {
        Command::Status => handle_status(&ctx).await,
        Command::Logs { task_id, follow } => handle_logs(&ctx, &task_id, follow).await,
        Command::Config { command } => handle_config(&ctx, command),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "taskdeckctl",
    author,
    version,
    about = "Inspect and follow Taskdeck task reasoning logs."
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Orchestrator server URL (overrides the config file)
    #[arg(long, short = 's', env = "TASKDECK_SERVER_URL", global = true)]
    server: Option<String>,

    /// Bearer token for the API (overrides the config file)
    #[arg(long, env = "TASKDECK_AUTH_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Override the config file path
    #[arg(long, short = 'c', value_name = "PATH", env = "TASKDECK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,

    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,

    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the orchestrator is reachable
    Status,

    /// Print a task's reasoning log
    Logs {
        /// Task ID
        task_id: String,

        /// Keep streaming new and updated entries until interrupted
        #[arg(long, short = 'f')]
        follow: bool,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(cli: &Cli) -> Result<Self> {
        let common = cli.common.clone();
        let config_file = config::config_file_path(common.config.clone())?;
        // `config` subcommands must work even when the file they repair is broken.
        let repairing = matches!(cli.command, Command::Config { .. });
        let mut config = load_effective_config(&config_file, repairing)?;

        if let Some(server) = common.server.as_ref() {
            config.server.url = server.clone();
        }
        if let Some(token) = common.token.as_ref() {
            config.auth.token = Some(token.clone());
        }
        if !repairing {
            config.validate()?;
        }

        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn client(&self) -> TaskdeckClient {
        TaskdeckClient::from_config(&self.config)
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return;
        }

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "taskdeck={level},taskdeckctl={level}",
                level = level.as_str().to_lowercase()
            ))
        });

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_target(false)
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(level);
        builder.try_init().ok();
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            return LevelFilter::Trace;
        }
        if self.common.debug {
            return LevelFilter::Debug;
        }
        match self.common.verbose {
            0 => self
                .config
                .logging
                .level
                .parse()
                .unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn load_effective_config(path: &Path, repairing: bool) -> Result<AppConfig> {
    match config::load_config(path) {
        Ok(config) => Ok(config),
        Err(err) if repairing => {
            eprintln!("Warning: ignoring invalid config file: {err:#}");
            Ok(AppConfig::default())
        }
        Err(err) => Err(err),
    }
}

async fn handle_status(ctx: &RuntimeContext) -> Result<()> {
    let client = ctx.client();
    let result = client.health().await;

    if ctx.common.json {
        let body = match &result {
            Ok(()) => serde_json::json!({ "status": "ok", "server": client.base_url() }),
            Err(err) => serde_json::json!({
                "status": "error",
                "server": client.base_url(),
                "error": err.to_string(),
            }),
        };
        println!("{body}");
    } else if result.is_ok() {
        println!("Server is running at {}", client.base_url());
    }

    result.with_context(|| format!("checking server health at {}", client.base_url()))
}

async fn handle_logs(ctx: &RuntimeContext, task_id: &str, follow: bool) -> Result<()> {
    let client = ctx.client();

    if !follow {
        let entries = client
            .reasoning_logs(task_id)
            .await
            .with_context(|| format!("fetching reasoning log for task {task_id}"))?;
        let mut out = io::stdout().lock();
        for entry in sort_logs(&entries) {
            write_entry(&mut out, &entry, ctx.common.json)?;
        }
        return Ok(());
    }

    let mut binding = ReasoningLogBinding::from_client(client, Backoff::from(&ctx.config.stream));
    binding.bind(task_id);
    let mut rx = binding.subscribe();
    let mut printer = ViewPrinter::new(ctx.common.json);
    info!("Following reasoning log for task {}", task_id);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let view = rx.borrow_and_update().clone();
        printer.render(&view)?;

        tokio::select! {
            _ = &mut shutdown => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    binding.unbind();
    Ok(())
}

/// Prints each entry when it first appears or changes, and stream status
/// transitions to stderr.
struct ViewPrinter {
    json: bool,
    printed: HashMap<String, ReasoningLogEntry>,
    state: Option<ConnectionState>,
    warning: Option<String>,
    error: Option<String>,
}

impl ViewPrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            printed: HashMap::new(),
            state: None,
            warning: None,
            error: None,
        }
    }

    fn render(&mut self, view: &LogView) -> Result<()> {
        if self.state != Some(view.stream_state) {
            self.state = Some(view.stream_state);
            eprintln!("-- stream {}", view.stream_state);
        }
        if self.warning != view.stream_warning {
            self.warning = view.stream_warning.clone();
            if let Some(warning) = &view.stream_warning {
                eprintln!("-- {warning}");
            }
        }
        if self.error != view.error {
            self.error = view.error.clone();
            if let Some(error) = &view.error {
                eprintln!("-- history unavailable: {error}");
            }
        }

        let mut out = io::stdout().lock();
        for entry in &view.logs {
            if self.printed.get(&entry.id) == Some(entry) {
                continue;
            }
            write_entry(&mut out, entry, self.json)?;
            self.printed.insert(entry.id.clone(), entry.clone());
        }
        out.flush().context("flushing stdout")
    }
}

fn write_entry(out: &mut impl Write, entry: &ReasoningLogEntry, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(entry).context("serializing log entry")?;
        writeln!(out, "{line}")?;
    } else {
        writeln!(out, "{}", format_entry(entry))?;
    }
    Ok(())
}

fn format_entry(entry: &ReasoningLogEntry) -> String {
    let mut line = format!("{:>6}  {}", entry.sequence, entry.created_at);
    if !entry.status.is_empty() {
        line.push_str(&format!("  [{}]", entry.status));
    }
    if !entry.event_type.is_empty() {
        line.push_str(&format!("  {}:", entry.event_type));
    }
    if !entry.message.is_empty() {
        line.push(' ');
        line.push_str(&entry.message);
    }
    line
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
        }
        ConfigCommand::Show => {
            let mut shown = ctx.config.clone();
            if shown.auth.token.is_some() {
                shown.auth.token = Some("********".to_string());
            }
            if ctx.common.json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&shown).context("serializing config")?
                );
            }
        }
        ConfigCommand::Init { force } => {
            if ctx.config_file.exists() && !force {
                bail!(
                    "config file already exists at {} (use --force to overwrite)",
                    ctx.config_file.display()
                );
            }
            config::write_default_config(&ctx.config_file)?;
            println!("Wrote {}", ctx.config_file.display());
        }
    }
    Ok(())
}
