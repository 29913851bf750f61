//! # parcelwatch Server
//!
//! Continuous email order tracking: watches IMAP mailboxes, captures new
//! messages exactly once into a processing queue, extracts structured
//! order data with a pluggable LLM analyzer, and maintains a per-user
//! order ledger with a full state history.
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - PostgreSQL for persistent storage
//! - Supervised per-folder IMAP watchers (push where supported, polling
//!   otherwise)
//! - An interval scheduler driving the queue processor and retention
//!   sweep
//! - A module registry gating providers, analyzers, and notifiers

/// Password hashing, tokens, and request extractors
pub mod auth;

/// Error types and handling
pub mod errors;

/// HTTP handlers
pub mod handlers;

/// Process infrastructure (configuration)
pub mod infra;

/// Versioned route organization
pub mod routes;

/// Shared application state
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parcelwatch_core::analyzer::LlmAnalyzer;
use parcelwatch_core::crypto::SecretCipher;
use parcelwatch_core::database::{MIGRATOR, Repositories, connect_pool};
use parcelwatch_core::mail::imap::ImapConnector;
use parcelwatch_core::mail::transport::MailConnector;
use parcelwatch_core::modules::builtin_registry;
use parcelwatch_core::notifier::{NotificationDispatcher, WebhookNotifier};
use parcelwatch_core::orders::DefaultOrderMatcher;
use parcelwatch_core::processing::{QueueProcessor, RetentionSweeper};
use parcelwatch_core::providers::{MailGlobalModule, MailUserModule};
use parcelwatch_core::scheduler::Scheduler;
use parcelwatch_core::watcher::WatcherSupervisor;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::AuthService;
use crate::infra::config::Config;
use crate::state::AppState;

/// Command line arguments for the parcelwatch server
#[derive(Parser, Debug)]
#[command(name = "parcelwatch-server")]
#[command(about = "Email order tracking: mailbox watchers, LLM extraction, order ledger")]
struct Args {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host {
        config.server_host = host;
    }
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parcelwatch_server=debug,parcelwatch_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("connecting to PostgreSQL");
    let pool = connect_pool(&config.database_url).await?;
    MIGRATOR.run(&pool).await?;
    info!("database migrations complete");

    let repos = Repositories::postgres(&pool);
    let cipher = SecretCipher::new(&config.encryption_key);
    let connector: Arc<dyn MailConnector> = Arc::new(ImapConnector::default());
    let supervisor = Arc::new(WatcherSupervisor::new(Arc::clone(&repos.queue)));

    let mail_user_module = Arc::new(MailUserModule::new(
        Arc::clone(&supervisor),
        Arc::clone(&repos.mailboxes),
        Arc::clone(&repos.settings),
        Arc::clone(&connector),
        cipher.clone(),
    ));
    let mail_global_module = Arc::new(MailGlobalModule::new(
        Arc::clone(&supervisor),
        Arc::clone(&repos.mailboxes),
        Arc::clone(&repos.bindings),
        Arc::clone(&repos.settings),
        Arc::clone(&repos.modules),
        Arc::clone(&connector),
        cipher.clone(),
    ));
    let llm_analyzer = Arc::new(LlmAnalyzer::new(Arc::clone(&repos.settings), cipher.clone()));
    let webhook_notifier = Arc::new(WebhookNotifier::new());

    let registry = Arc::new(builtin_registry(
        Arc::clone(&repos.modules),
        Arc::clone(&mail_user_module),
        Arc::clone(&mail_global_module),
        llm_analyzer,
        webhook_notifier,
    ));
    registry.sync_configs().await?;

    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&repos.modules),
        Arc::clone(&repos.notifications),
    ));
    let matcher = Arc::new(DefaultOrderMatcher::new(Arc::clone(&repos.orders)));
    let processor = Arc::new(QueueProcessor::new(
        Arc::clone(&repos.queue),
        Arc::clone(&repos.orders),
        matcher,
        Arc::clone(&registry),
        dispatcher,
    ));
    let sweeper = Arc::new(RetentionSweeper::new(
        Arc::clone(&repos.queue),
        Arc::clone(&repos.settings),
    ));

    let scheduler = Arc::new(Scheduler::new());
    {
        let processor = Arc::clone(&processor);
        scheduler.add_job(
            "queue-worker",
            "Process next queued item",
            Duration::from_secs(5),
            move || {
                let processor = Arc::clone(&processor);
                async move { processor.tick().await }
            },
        );
    }
    {
        let sweeper = Arc::clone(&sweeper);
        scheduler.add_job(
            "retention-cleanup",
            "Clean up old queue items",
            Duration::from_secs(600),
            move || {
                let sweeper = Arc::clone(&sweeper);
                async move { sweeper.run().await }
            },
        );
    }

    // Startup hooks of enabled provider modules start the watchers.
    registry.startup_enabled().await?;
    info!("parcelwatch is ready");

    let auth = Arc::new(AuthService::new(
        &config.secret_key,
        &config.jwt_algorithm,
        config.jwt_expire_minutes,
    )?);

    let state = AppState {
        config: Arc::clone(&config),
        repos,
        registry: Arc::clone(&registry),
        supervisor: Arc::clone(&supervisor),
        mail_user: mail_user_module,
        mail_global: mail_global_module,
        scheduler: Arc::clone(&scheduler),
        cipher,
        connector,
        auth,
    };

    let app = routes::create_app(state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("starting parcelwatch server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    scheduler.shutdown();
    registry.shutdown_all().await;
    supervisor.stop_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
