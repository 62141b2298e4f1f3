use std::io::{self, BufRead, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mjbot_contracts::chat::parse_intent;
use mjbot_contracts::events::EventLog;
use mjbot_contracts::tasks::TaskStore;
use mjbot_engine::{
    BotConfig, DryrunClient, HitokotoQuotes, MidjourneyBot, MidjourneyClient, Retrier,
    RetrySettings, Session, DEFAULT_QUOTE_URL,
};
use serde_json::json;
use tracing::{error, info};

const DEFAULT_DB_PATH: &str = "mjbot/tasks.db";
const DEFAULT_OUT_DIR: &str = "mjbot/images";

#[derive(Debug, Parser)]
#[command(name = "mjbot", version, about = "Midjourney chat bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read chat commands from stdin, one per line.
    Chat(ChatArgs),
    /// Inspect or clear the task table.
    Tasks(TasksArgs),
}

#[derive(Debug, Args)]
struct ChatArgs {
    #[arg(long, env = "MJ_SERVER_ID")]
    server_id: Option<String>,
    #[arg(long, env = "MJ_CHANNEL_ID")]
    channel_id: Option<String>,
    #[arg(long, env = "MJ_SALAI_TOKEN", hide_env_values = true)]
    salai_token: Option<String>,
    #[arg(long, env = "MJBOT_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    #[arg(long, env = "MJBOT_OUT", default_value = DEFAULT_OUT_DIR)]
    out: PathBuf,
    #[arg(long, env = "MJBOT_EVENTS")]
    events: Option<PathBuf>,
    #[arg(long, env = "MJBOT_QUOTE_URL", default_value = DEFAULT_QUOTE_URL)]
    quote_url: String,
    /// Skip the quote lookup logged after each failed remote call.
    #[arg(long)]
    no_quotes: bool,
    #[arg(long, env = "MJBOT_RETRY_ATTEMPTS")]
    retry_attempts: Option<usize>,
    #[arg(long, env = "MJBOT_RETRY_DELAY_MS")]
    retry_delay_ms: Option<u64>,
    /// User id mentioned in replies.
    #[arg(long, default_value = "local")]
    user: String,
}

impl ChatArgs {
    fn to_config(&self) -> BotConfig {
        BotConfig {
            server_id: self.server_id.clone().unwrap_or_default(),
            channel_id: self.channel_id.clone().unwrap_or_default(),
            salai_token: self.salai_token.clone().unwrap_or_default(),
            db_path: self.db.clone(),
            out_dir: self.out.clone(),
            events_path: self.events.clone(),
            quote_url: (!self.no_quotes).then(|| self.quote_url.clone()),
            retry: RetrySettings::new(self.retry_attempts, self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Args)]
struct TasksArgs {
    #[arg(long, env = "MJBOT_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    #[command(subcommand)]
    action: TasksAction,
}

#[derive(Debug, Subcommand)]
enum TasksAction {
    /// Print the most recent records as JSON lines.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Remove every record.
    Clear,
}

struct StdoutSession {
    user_id: String,
    out: Arc<Mutex<()>>,
}

impl Session for StdoutSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn send(&self, text: &str) {
        let _guard = self.out.lock();
        println!("{text}");
    }
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mjbot error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Tasks(args) => run_tasks(args),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("MJBOT_LOG_LEVEL") {
        match v.as_str() {
            "silent" => "off".to_string(),
            "fatal" => "error".to_string(),
            other => other.to_string(),
        }
    } else {
        "info".to_string()
    };

    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

fn build_retrier(config: &BotConfig) -> Result<Retrier> {
    let retrier = Retrier::from_settings(&config.retry);
    let Some(url) = &config.quote_url else {
        return Ok(retrier);
    };
    let quotes = HitokotoQuotes::new(url.clone())?;
    Ok(retrier.with_diagnostics(Arc::new(quotes)))
}

fn build_bot(config: &BotConfig) -> Result<MidjourneyBot> {
    config.validate()?;
    let retrier = build_retrier(config)?;
    let store = TaskStore::open(&config.db_path)
        .with_context(|| format!("failed to open task table {}", config.db_path.display()))?;
    let client: Arc<dyn MidjourneyClient> =
        Arc::new(retrier.run("connect", || DryrunClient::connect(config))?);

    let mut bot = MidjourneyBot::new(client, Arc::new(store), retrier);
    if let Some(events_path) = &config.events_path {
        let bot_id = format!("mjbot-{}", std::process::id());
        bot = bot.with_events(EventLog::new(events_path, &bot_id));
    }
    Ok(bot)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let config = args.to_config();
    let bot = Arc::new(build_bot(&config)?);
    bot.start();
    info!(db = %config.db_path.display(), out = %config.out_dir.display(), "chat ready");
    println!("mjbot chat started. Type /help for commands.");
    serve_chat(bot, io::stdin().lock(), &args.user)
}

/// Runs one handler thread per command line until `input` ends or fails.
///
/// Handlers are always joined and the bot shut down before returning, so a
/// read error still closes the client.
fn serve_chat(bot: Arc<MidjourneyBot>, mut input: impl BufRead, user: &str) -> Result<()> {
    let out = Arc::new(Mutex::new(()));
    let mut handlers: Vec<JoinHandle<()>> = Vec::new();
    let mut line = String::new();
    let outcome = loop {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => break Err(anyhow::Error::from(err).context("failed to read chat input")),
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "noop" {
            continue;
        }
        let worker = Arc::clone(&bot);
        let session = StdoutSession {
            user_id: user.to_string(),
            out: Arc::clone(&out),
        };
        handlers.push(thread::spawn(move || worker.handle(&session, &intent)));

        let (finished, running) = handlers
            .into_iter()
            .partition::<Vec<_>, _>(|handle| handle.is_finished());
        handlers = running;
        join_handlers(finished);
    };

    join_handlers(handlers);
    if let Err(err) = io::stdout().flush() {
        error!(error = %err, "failed to flush replies");
    }
    let stopped = bot.shutdown();
    outcome?;
    stopped
}

fn join_handlers(handlers: Vec<JoinHandle<()>>) {
    for handle in handlers {
        if handle.join().is_err() {
            error!("command handler panicked");
        }
    }
}

fn run_tasks(args: TasksArgs) -> Result<i32> {
    let store = TaskStore::open(&args.db)
        .with_context(|| format!("failed to open task table {}", args.db.display()))?;
    match args.action {
        TasksAction::List { limit } => {
            for record in store.list_recent(limit)? {
                let line = json!({
                    "id": record.id,
                    "owner_id": record.owner_id,
                    "task_id": record.remote_job_id,
                    "flags": record.flags,
                    "prompt": record.prompt,
                    "options": record.option_labels(),
                    "created_at": record.created_at,
                });
                println!("{line}");
            }
        }
        TasksAction::Clear => {
            let removed = store.clear()?;
            info!(removed, "task table cleared");
            println!("removed {removed} task(s)");
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufReader, Cursor, Read};
    use std::sync::Arc;

    use clap::Parser;
    use mjbot_engine::{BotConfig, RetrySettings};
    use serde_json::Value;

    use super::{build_bot, serve_chat, Cli, Command, TasksAction};

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin went away"))
        }
    }

    fn config_in(root: &std::path::Path) -> BotConfig {
        BotConfig {
            server_id: "s".to_string(),
            channel_id: "c".to_string(),
            salai_token: "t".to_string(),
            db_path: root.join("tasks.db"),
            out_dir: root.join("images"),
            events_path: Some(root.join("events.jsonl")),
            quote_url: None,
            retry: RetrySettings::new(Some(1), Some(10)),
        }
    }

    fn event_types(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
        let body = std::fs::read_to_string(path)?;
        let events = body
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(events
            .iter()
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect())
    }

    #[test]
    fn read_error_still_joins_handlers_and_shuts_down() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path());
        let bot = Arc::new(build_bot(&config)?);
        let input = BufReader::new(Cursor::new(b"/imagine a red fox\n".to_vec()).chain(BrokenPipe));

        let result = serve_chat(Arc::clone(&bot), input, "user-1");
        assert!(result.is_err());
        assert_eq!(bot.store().count()?, 1);
        assert_eq!(
            event_types(&temp.path().join("events.jsonl"))?,
            vec!["task_created", "bot_stopped"]
        );
        Ok(())
    }

    #[test]
    fn end_of_input_shuts_down_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path());
        let bot = Arc::new(build_bot(&config)?);
        let input = Cursor::new(b"hello\n/help\n/dance\n".to_vec());

        serve_chat(Arc::clone(&bot), input, "user-1")?;
        assert_eq!(
            event_types(&temp.path().join("events.jsonl"))?,
            vec!["command_failed", "bot_stopped"]
        );
        Ok(())
    }

    #[test]
    fn chat_flags_build_clamped_config() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "mjbot",
            "chat",
            "--server-id",
            "s",
            "--channel-id",
            "c",
            "--salai-token",
            "t",
            "--no-quotes",
            "--retry-attempts",
            "50",
        ])?;
        let Command::Chat(args) = cli.command else {
            anyhow::bail!("expected chat subcommand");
        };
        let config = args.to_config();
        assert_eq!(config.quote_url, None);
        assert_eq!(config.retry.max_attempts, 10);
        assert!(config.validate().is_ok());
        Ok(())
    }

    #[test]
    fn tasks_list_defaults_limit() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["mjbot", "tasks", "--db", "/tmp/x.db", "list"])?;
        let Command::Tasks(args) = cli.command else {
            anyhow::bail!("expected tasks subcommand");
        };
        assert!(matches!(args.action, TasksAction::List { limit: 20 }));
        Ok(())
    }

    #[test]
    fn build_bot_opens_store_and_dryrun_client() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let db = temp.path().join("tasks.db");
        let out = temp.path().join("images");
        let db_arg = db.to_string_lossy().to_string();
        let out_arg = out.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "mjbot",
            "chat",
            "--server-id",
            "s",
            "--channel-id",
            "c",
            "--salai-token",
            "t",
            "--no-quotes",
            "--db",
            db_arg.as_str(),
            "--out",
            out_arg.as_str(),
        ])?;
        let Command::Chat(args) = cli.command else {
            anyhow::bail!("expected chat subcommand");
        };
        let bot = build_bot(&args.to_config())?;
        assert_eq!(bot.store().count()?, 0);
        assert!(out.is_dir());
        bot.shutdown()?;
        Ok(())
    }
}
