//! Fancifier CLI entry point.
//!
//! `run` starts the daemon against Telegram; the other subcommands inspect
//! or edit `~/.fancifier/config.toml` and exit.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tracing::info;

use fancifier::config::{
    merge_chat_configs, remove_chat_configs, runtime_paths, ChatConfig, ConfigStore, RuntimePaths,
};
use fancifier::credentials::{load_credentials, Credentials, TELEGRAM_TOKEN_KEY};
use fancifier::daemon::{Daemon, ProcessorOptions, SnapshotSource};
use fancifier::error::AppError;
use fancifier::plugins::llm_rewrite::preview_llm_response;
use fancifier::plugins::{build_registry, PluginRegistry};
use fancifier::providers::deepseek::{DeepSeekProvider, DeepSeekSettings};
use fancifier::providers::LlmProvider;
use fancifier::telegram::{run_dispatcher, verify_bot, TelegramTransport};

const DEFAULT_TEST_TEXT: &str = "Hello! This is a quick check of the LLM rewrite plugin.";

/// Fancifier rewrites your own outgoing Telegram messages in place.
#[derive(Parser)]
#[command(name = "fancifier", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the daemon until Ctrl+C.
    ///
    /// Config changes are picked up while running. A config file that did
    /// not exist at start is applied from its second change onwards; restart
    /// to apply it at once.
    Run {
        /// Log would-be edits instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the effective configuration as JSON.
    ShowConfig,
    /// List available plugins.
    Plugins,
    /// Add or replace one chat's plugin chain.
    SetChat {
        /// Chat identifier.
        #[arg(long, allow_hyphen_values = true)]
        chat_id: i64,
        /// Display name.
        #[arg(long, default_value = "")]
        title: String,
        /// Comma-separated plugin ids, applied in order.
        #[arg(long, value_delimiter = ',')]
        plugins: Vec<String>,
    },
    /// Remove chats from the configuration.
    RemoveChats {
        /// Chat identifiers to remove.
        #[arg(required = true, allow_hyphen_values = true)]
        chat_ids: Vec<i64>,
    },
    /// Send one text through `llm_rewrite` and print the result.
    TestLlm {
        /// Text to rewrite.
        #[arg(long, default_value = DEFAULT_TEST_TEXT)]
        text: String,
        /// Chat id passed to the provider.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        chat_id: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

/// Print an error for the user and choose the exit code.
fn report(error: &anyhow::Error) -> ExitCode {
    if let Some(app_error) = error.downcast_ref::<AppError>() {
        eprintln!("error: {}", app_error.user_message());
        if let Ok(paths) = runtime_paths() {
            eprintln!("details are in the logs under {}", paths.logs_dir.display());
        }
        return ExitCode::from(2);
    }
    eprintln!("error: {error:#}");
    ExitCode::FAILURE
}

/// Resolved paths, credentials and config store shared by subcommands.
struct CliContext {
    paths: RuntimePaths,
    credentials: Credentials,
    store: ConfigStore,
}

impl CliContext {
    fn resolve() -> anyhow::Result<Self> {
        let paths = runtime_paths()?;
        let credentials = load_credentials(&paths.env_file)
            .with_context(|| format!("failed to load {}", paths.env_file.display()))?;
        let store = ConfigStore::new(&paths.config_file);
        Ok(Self {
            paths,
            credentials,
            store,
        })
    }

    fn provider(&self) -> Arc<dyn LlmProvider> {
        Arc::new(DeepSeekProvider::new(DeepSeekSettings::from_credentials(
            &self.credentials,
        )))
    }

    fn registry(&self, config: &fancifier::config::AppConfig) -> PluginRegistry {
        build_registry(config, self.provider(), &self.paths.plugins_dir)
    }
}

/// Run the daemon.
async fn handle_run(dry_run: bool) -> anyhow::Result<()> {
    let context = CliContext::resolve()?;
    let _logging_guard = fancifier::logging::init_production(&context.paths.logs_dir)?;

    let token = context.credentials.require(TELEGRAM_TOKEN_KEY).map_err(|e| {
        AppError::with_source(
            format!(
                "{TELEGRAM_TOKEN_KEY} is not set. Add it to {}",
                context.paths.env_file.display()
            ),
            e,
        )
    })?;
    let bot = Bot::new(token);
    verify_bot(&bot).await?;

    let source = SnapshotSource {
        store: context.store.clone(),
        provider: context.provider(),
        default_plugins_dir: context.paths.plugins_dir.clone(),
    };
    let daemon = Daemon::start(
        source,
        Arc::new(TelegramTransport::new(bot.clone())),
        ProcessorOptions { dry_run },
    )
    .map_err(|e| {
        AppError::with_source(
            format!(
                "could not load configuration from {}",
                context.store.path().display()
            ),
            e,
        )
    })?;

    info!(config = %context.store.path().display(), dry_run, "fancifier running");
    run_dispatcher(bot, daemon.handle()).await;
    let cancelled = daemon.shutdown().await;
    if cancelled > 0 {
        eprintln!("shutdown timed out; {cancelled} message(s) were left unedited");
    }
    Ok(())
}

/// Console logging plus resolved context for one-shot subcommands.
fn oneshot_context() -> anyhow::Result<CliContext> {
    fancifier::logging::init_cli();
    CliContext::resolve()
}

async fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run { dry_run } => handle_run(dry_run).await?,
        Command::ShowConfig => {
            let context = oneshot_context()?;
            let config = context.store.load()?;
            let registry = context.registry(&config);
            let rendered = serde_json::json!({
                "config_path": context.store.path(),
                "config": config,
                "plugins": registry.all_ids(),
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Command::Plugins => {
            let context = oneshot_context()?;
            let config = context.store.load()?;
            for plugin in context.registry(&config).all() {
                println!("{}\t{}", plugin.id(), plugin.title());
            }
        }
        Command::SetChat {
            chat_id,
            title,
            plugins,
        } => {
            let context = oneshot_context()?;
            let mut config = context.store.load()?;
            let registry = context.registry(&config);
            let plugin_order: Vec<String> = plugins
                .into_iter()
                .map(|id| id.trim().to_owned())
                .filter(|id| !id.is_empty())
                .collect();
            if let Some(unknown) = plugin_order.iter().find(|id| !registry.contains(id)) {
                return Err(AppError::new(format!(
                    "unknown plugin '{unknown}'. Available: {}",
                    registry.all_ids().join(", ")
                ))
                .into());
            }
            let update = ChatConfig {
                chat_id,
                title,
                plugin_order,
            };
            config.chats = merge_chat_configs(&config.chats, &[update]);
            context.store.save(&config)?;
            println!("chat {chat_id} saved to {}", context.store.path().display());
        }
        Command::RemoveChats { chat_ids } => {
            let context = oneshot_context()?;
            let mut config = context.store.load()?;
            let before = config.chats.len();
            config.chats = remove_chat_configs(&config.chats, &chat_ids);
            let removed = before.saturating_sub(config.chats.len());
            context.store.save(&config)?;
            println!("removed {removed} chat(s)");
        }
        Command::TestLlm { text, chat_id } => {
            let context = oneshot_context()?;
            let config = context.store.load()?;
            let rewritten = preview_llm_response(&text, chat_id, context.provider(), config.llm)
                .await
                .map_err(|e| AppError::with_source(e.to_string(), e))?;
            println!("{rewritten}");
        }
    }
    Ok(())
}
