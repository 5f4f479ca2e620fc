use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forum_discussion_sync::config::Config;
use forum_discussion_sync::discussion::{
    Collaborators, DiscussionContext, DiscussionView, Notice, SessionContext,
};
use forum_discussion_sync::events::EventBus;
use forum_discussion_sync::offline::SqliteOfflineQueue;
use forum_discussion_sync::posts::HttpPostStore;
use forum_discussion_sync::sync::{auto_sync_loop, ReplySynchronizer};
use forum_discussion_sync::ws::WsClient;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting forum-discussion-sync");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(site = %config.site_url, site_id = %config.site_id, "Configuration loaded");

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let queue = SqliteOfflineQueue::open(&config.database_path)
        .await
        .context("Failed to open offline queue")?;

    let ws = WsClient::new(&config).context("Failed to build web service client")?;
    let posts = Arc::new(HttpPostStore::new(ws.clone(), &config));
    let synchronizer = Arc::new(ReplySynchronizer::new(ws, queue.clone()));
    let bus = EventBus::new(config.event_channel_capacity);
    let cancel = CancellationToken::new();

    let auto_sync_handle = if config.auto_sync_enabled {
        let loop_config = config.clone();
        let loop_synchronizer = Arc::clone(&synchronizer);
        let loop_queue = queue.clone();
        let loop_bus = bus.clone();
        let loop_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            auto_sync_loop(
                loop_config,
                loop_synchronizer.as_ref(),
                loop_queue,
                loop_bus,
                loop_cancel,
            )
            .await;
        }))
    } else {
        info!("Automatic synchronization disabled");
        None
    };

    let view = if let Some(watch) = config.watch {
        let collaborators = Collaborators {
            posts,
            queue: Arc::new(queue),
            synchronizer,
        };
        let session = SessionContext {
            site_id: config.site_id.clone(),
            user_id: config.user_id,
        };
        let context = DiscussionContext {
            forum_id: watch.forum_id,
            discussion_id: watch.discussion_id,
            context_id: watch.cmid,
        };
        let view = DiscussionView::open(
            collaborators,
            session,
            context,
            bus.clone(),
            config.reply_prefix.clone(),
        )
        .await;
        spawn_view_logger(&view);
        Some(view)
    } else {
        info!("No discussion configured, running synchronization only");
        None
    };

    shutdown_signal().await;

    info!("Shutting down...");

    if let Some(view) = view {
        view.close();
    }
    cancel.cancel();
    if let Some(handle) = auto_sync_handle {
        if let Err(e) = handle.await {
            warn!("Automatic synchronization task ended abnormally: {e}");
        }
    }

    info!("Shutdown complete");

    Ok(())
}

/// Log every read model and notice the open discussion publishes.
fn spawn_view_logger(view: &DiscussionView) {
    let coordinator = view.coordinator();
    let discussion_id = coordinator.context().discussion_id;

    let mut models = coordinator.watch();
    tokio::spawn(async move {
        while models.changed().await.is_ok() {
            let model = models.borrow_and_update().clone();
            info!(
                discussion_id,
                phase = ?model.phase,
                posts = model.posts.len(),
                offline = model.has_offline_replies,
                sort = model.sort_label,
                "Discussion updated"
            );
        }
    });

    let mut notices = coordinator.notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                Notice::Warning(message) => warn!(discussion_id, "{message}"),
                Notice::Error(message) => error!(discussion_id, "{message}"),
            }
        }
    });
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forum_discussion_sync=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
