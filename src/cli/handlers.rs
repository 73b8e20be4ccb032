use super::{Cli, Commands};
use crate::config::{Config, ConfigHandle};
use crate::core::{GenerationStatus, ImageRef, Message, Role};
use crate::notify::LogNotificationSink;
use crate::orchestrator::{
    Collaborators, GenerationOrchestrator, SessionOutcome, SessionSnapshot, UserTurn,
};
use crate::providers::{HttpCompletionClient, ProviderKind, provider_table};
use crate::search::{NoopSearchProvider, SearchProvider, SearxngSearchProvider};
use crate::store::{
    HistoryStore, SqliteCapabilityStore, SqliteHistoryStore, SqliteUsageRecorder, open_database,
};
use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use sqlx::sqlite::SqlitePool;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Chat {
            message,
            provider,
            model,
            images,
            search,
            quote,
        } => {
            let turn = build_turn(message, provider.as_deref(), model, images, search, quote)?;
            run_chat(config, turn).await
        }
        Commands::History { clear } => show_history(&config, clear).await,
        Commands::Usage => show_usage(&config).await,
        Commands::Providers => {
            list_providers();
            Ok(())
        }
    }
}

fn build_turn(
    message: String,
    provider: Option<&str>,
    model: Option<String>,
    images: Vec<PathBuf>,
    search: bool,
    quote: Option<String>,
) -> Result<UserTurn> {
    let mut turn = UserTurn::new(message)
        .with_images(images.into_iter().map(ImageRef::File).collect());
    if let Some(quote) = quote {
        turn = turn.with_quote(quote);
    }
    if search {
        turn = turn.with_web_search(true);
    }
    turn.model = model;

    if let Some(name) = provider {
        if let Some(custom) = name.strip_prefix("custom:") {
            turn.provider = Some(ProviderKind::Custom);
            turn.custom_provider_id = Some(custom.to_string());
        } else {
            let kind = name
                .parse::<ProviderKind>()
                .map_err(|_| anyhow::anyhow!("unknown provider `{name}`"))?;
            if kind == ProviderKind::Custom {
                bail!("use `--provider custom:<id>` to select a custom provider");
            }
            turn.provider = Some(kind);
        }
    }
    Ok(turn)
}

async fn open_pool(config: &Config) -> Result<SqlitePool> {
    let path = config.storage.resolved_database_path();
    open_database(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

fn search_provider(config: &Config) -> Arc<dyn SearchProvider> {
    match SearxngSearchProvider::from_config(&config.search) {
        Ok(provider) => Arc::new(provider),
        Err(error) => {
            tracing::warn!("web search unavailable: {error}");
            Arc::new(NoopSearchProvider)
        }
    }
}

async fn run_chat(config: Config, turn: UserTurn) -> Result<()> {
    let pool = open_pool(&config).await?;
    let deps = Collaborators {
        client: Arc::new(HttpCompletionClient::new()),
        history: Arc::new(SqliteHistoryStore::new(pool.clone()).await?),
        usage: Arc::new(SqliteUsageRecorder::new(pool.clone()).await?),
        capabilities: Arc::new(SqliteCapabilityStore::new(pool).await?),
        search: search_provider(&config),
        notifier: Arc::new(LogNotificationSink),
    };
    let orchestrator = GenerationOrchestrator::new(ConfigHandle::new(config), deps);

    let handle = orchestrator.submit(turn).await;
    let session_id = handle.assistant_message_id().to_string();
    let mut updates = WatchStream::new(orchestrator.subscribe());
    let mut printer = SnapshotPrinter::default();

    loop {
        tokio::select! {
            interrupt = tokio::signal::ctrl_c() => {
                if let Err(error) = interrupt {
                    tracing::warn!("failed to listen for Ctrl-C: {error}");
                }
                orchestrator.stop().await;
            }
            update = updates.next() => {
                let Some(update) = update else { break };
                let Some(snapshot) = update else { continue };
                if snapshot.assistant_message_id != session_id {
                    continue;
                }
                printer.print(&snapshot)?;
                if snapshot.is_done() {
                    break;
                }
            }
        }
    }

    let finished = handle.wait().await;
    println!();
    match finished.outcome {
        SessionOutcome::Failed(summary) => bail!(summary),
        SessionOutcome::Cancelled => eprintln!("[generation cancelled]"),
        SessionOutcome::Finished | SessionOutcome::Running => {}
    }
    Ok(())
}

/// Prints only the text that arrived since the previous snapshot.
#[derive(Default)]
struct SnapshotPrinter {
    status: Option<GenerationStatus>,
    visible_len: usize,
    reasoning_len: usize,
}

impl SnapshotPrinter {
    fn print(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        if self.status != Some(snapshot.status) {
            self.status = Some(snapshot.status);
            if snapshot.status == GenerationStatus::Searching {
                eprintln!("[searching the web]");
            }
        }

        let reasoning = snapshot
            .accumulated_reasoning
            .get(self.reasoning_len..)
            .unwrap_or_default();
        if !reasoning.is_empty() {
            let mut stderr = std::io::stderr().lock();
            write!(stderr, "{reasoning}")?;
            stderr.flush()?;
            self.reasoning_len = snapshot.accumulated_reasoning.len();
        }

        let visible = snapshot
            .accumulated_visible
            .get(self.visible_len..)
            .unwrap_or_default();
        if !visible.is_empty() {
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{visible}")?;
            stdout.flush()?;
            self.visible_len = snapshot.accumulated_visible.len();
        }
        Ok(())
    }
}

async fn show_history(config: &Config, clear: bool) -> Result<()> {
    let history = SqliteHistoryStore::new(open_pool(config).await?).await?;
    if clear {
        history.clear_all().await?;
        println!("Conversation history cleared.");
        return Ok(());
    }

    let messages = history.get_all_messages().await?;
    if messages.is_empty() {
        println!("No messages yet.");
        return Ok(());
    }
    for message in &messages {
        println!("{}", render_message(message));
    }
    Ok(())
}

fn render_message(message: &Message) -> String {
    let label = match (message.role, message.marker) {
        (_, Some(marker)) => format!("[{marker}]"),
        (Role::Assistant, None) => format!(
            "assistant ({})",
            message.model_name.as_deref().unwrap_or("unknown model")
        ),
        (role, None) => role.to_string(),
    };
    let mut line = format!("{} {label}: {}", message.timestamp.format("%Y-%m-%d %H:%M:%S"), message.text);
    if message.pending {
        line.push_str(" [incomplete]");
    }
    if message.has_images() {
        line.push_str(&format!(" [{} image(s)]", message.images.len()));
    }
    line
}

async fn show_usage(config: &Config) -> Result<()> {
    let recorder = SqliteUsageRecorder::new(open_pool(config).await?).await?;
    let summary = recorder.summary().await?;

    println!("Requests with usage: {}", summary.record_count);
    println!("Input tokens:        {}", summary.total_input_tokens);
    println!("Output tokens:       {}", summary.total_output_tokens);
    println!("Estimated cost:      {}", format_usd(summary.total_estimated_cost_micros));

    let by_model = recorder.summary_by_model().await?;
    if !by_model.is_empty() {
        println!();
        for usage in by_model {
            println!(
                "  {}/{}: {} in, {} out, {}",
                usage.provider,
                usage.model,
                usage.input_tokens,
                usage.output_tokens,
                format_usd(usage.estimated_cost_micros)
            );
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_usd(micros: i64) -> String {
    format!("${:.4}", micros as f64 / 1_000_000.0)
}

fn list_providers() {
    for spec in provider_table() {
        println!(
            "{:<12} {:<22} {:<48} {}",
            spec.kind,
            spec.display_name,
            spec.base_url,
            spec.env_keys.join(", ")
        );
    }
    println!("{:<12} {:<22} configured under [[custom_providers]]", ProviderKind::Custom, "Custom");
}
