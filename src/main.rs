use std::sync::Arc;

use tokio::io::AsyncBufReadExt;

use formflow::browser::{BrowserFactory, RemoteBrowserFactory};
use formflow::channels::{CliChannel, DiscordChannel, InboundMessage, NotificationChannel, CLI_CHANNEL};
use formflow::config::{AutomationConfig, BrowserConfig};
use formflow::email::EmailContent;
use formflow::llm::{create_provider, LlmBackend, LlmConfig};
use formflow::session::{Orchestrator, SessionRegistry};
use formflow::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Read API key from environment
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model = std::env::var("FORMFLOW_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    eprintln!("📋 FormFlow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Commands: /start <path.eml> [decision-id], /runs, /quit\n");

    // Create LLM provider
    let llm_config = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("FORMFLOW_DB_PATH").unwrap_or_else(|_| "./data/formflow.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", db_path);

    // ── Startup Recovery: reconcile runs orphaned by a previous crash ───
    {
        let orphans = db.list_active_runs().await.unwrap_or_default();
        for run in &orphans {
            if let Err(e) = db
                .mark_run_error(&run.decision_id, "orphaned by restart")
                .await
            {
                tracing::warn!(decision_id = %run.decision_id, "Recovery update failed: {e}");
            }
        }
        if !orphans.is_empty() {
            eprintln!("   Recovered {} orphaned runs from DB", orphans.len());
        }
    }

    // ── Browser ──────────────────────────────────────────────────────────
    let browser_config = BrowserConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: browser bridge not configured: {e}");
        eprintln!("  export FORMFLOW_BROWSER_API_BASE=https://...");
        eprintln!("  export FORMFLOW_BROWSER_API_KEY=...");
        std::process::exit(1);
    });
    let browser_factory: Arc<dyn BrowserFactory> =
        Arc::new(RemoteBrowserFactory::new(browser_config));

    // ── Channel ──────────────────────────────────────────────────────────
    // Discord when a bot token is set, CLI otherwise. Questions go where
    // answers can come back from.
    let channel: Arc<dyn NotificationChannel> =
        if let Ok(token) = std::env::var("DISCORD_BOT_TOKEN") {
            eprintln!("   Channel: discord");
            Arc::new(DiscordChannel::new(token))
        } else {
            eprintln!("   Channel: cli");
            Arc::new(CliChannel::new())
        };
    let channel_id =
        std::env::var("FORMFLOW_CHANNEL_ID").unwrap_or_else(|_| CLI_CHANNEL.to_string());
    let owner_id = std::env::var("FORMFLOW_OWNER").unwrap_or_else(|_| "local".to_string());

    let registry = Arc::new(SessionRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&db),
        browser_factory,
        channel,
        llm,
        AutomationConfig::default(),
    ));

    // ── Input loop ───────────────────────────────────────────────────────
    // Lines starting with '/' are commands; everything else is treated as
    // an answer to whatever question is outstanding.
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin);
    let mut line = String::new();
    loop {
        line.clear();
        if lines.read_line(&mut line).await? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input == "/quit" {
            break;
        }

        if input == "/runs" {
            match db.list_runs(20).await {
                Ok(runs) => {
                    for run in runs {
                        eprintln!(
                            "   {} [{}] {}",
                            run.decision_id,
                            run.status,
                            run.summary.or(run.error).unwrap_or_default()
                        );
                    }
                }
                Err(e) => eprintln!("   Failed to list runs: {e}"),
            }
            continue;
        }

        if let Some(rest) = input.strip_prefix("/start ") {
            let mut parts = rest.trim().splitn(2, ' ');
            let Some(path) = parts.next() else {
                eprintln!("   Usage: /start <path.eml> [decision-id]");
                continue;
            };
            let decision_id = parts
                .next()
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let raw = match tokio::fs::read(path.trim()).await {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("   Could not read {}: {e}", path.trim());
                    continue;
                }
            };
            let Some(email) = EmailContent::parse(decision_id.clone(), &raw) else {
                eprintln!("   Could not parse {} as an email", path.trim());
                continue;
            };

            let orchestrator = Arc::clone(&orchestrator);
            let owner_id = owner_id.clone();
            let channel_id = channel_id.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator
                    .start_automation(&decision_id, &email, &owner_id, &channel_id)
                    .await
                {
                    tracing::warn!(decision_id = %decision_id, "Automation ended with error: {e}");
                }
            });
            continue;
        }

        let message = InboundMessage {
            channel: channel_id.clone(),
            author_id: owner_id.clone(),
            content: input.to_string(),
            reply_to: None,
            thread_parent: None,
        };
        match orchestrator.handle_inbound(&message).await {
            Ok(true) => {}
            Ok(false) => eprintln!("   (no question is waiting for an answer)"),
            Err(e) => tracing::warn!("Could not apply answer: {e}"),
        }
    }

    Ok(())
}
