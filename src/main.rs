//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here.

use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use votum::adapters::announce::{LogAnnouncer, WebhookAnnouncer};
use votum::adapters::clock::SystemClock;
use votum::adapters::persistence::{MemoryRepo, SqliteRepo};
use votum::adapters::ui::ConsoleInputPort;
use votum::ports::{
    AnnouncerPort, Clock, ConfigRepo, CouncilRepo, InputPort, MotionStore, WeightRepo,
    WeightResolver,
};
use votum::shared::config::{AppConfig, StorageKind};
use votum::usecases::{ArchiveService, CouncilService, MotionLocks, MotionService};

/// One storage backend seen through every persistence port.
struct Storage {
    councils: Arc<dyn CouncilRepo>,
    weights: Arc<dyn WeightRepo>,
    resolver: Arc<dyn WeightResolver>,
    configs: Arc<dyn ConfigRepo>,
    motions: Arc<dyn MotionStore>,
}

impl Storage {
    fn from_repo<R>(repo: Arc<R>) -> Self
    where
        R: CouncilRepo + WeightRepo + WeightResolver + ConfigRepo + MotionStore + 'static,
    {
        Self {
            councils: Arc::clone(&repo) as Arc<dyn CouncilRepo>,
            weights: Arc::clone(&repo) as Arc<dyn WeightRepo>,
            resolver: Arc::clone(&repo) as Arc<dyn WeightResolver>,
            configs: Arc::clone(&repo) as Arc<dyn ConfigRepo>,
            motions: repo as Arc<dyn MotionStore>,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    let cfg = AppConfig::load().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    // --- Storage ---
    let storage = match cfg.storage_or_default() {
        StorageKind::Sqlite => {
            let db_path = cfg.database_path_or_default();
            let repo = SqliteRepo::connect(&db_path, cfg.busy_timeout_ms_or_default())
                .await
                .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?;
            info!(path = %repo.path().display(), "using SQLite storage");
            Storage::from_repo(Arc::new(repo))
        }
        StorageKind::Memory => {
            warn!("using in-memory storage; nothing survives a restart");
            Storage::from_repo(Arc::new(MemoryRepo::new()))
        }
    };

    // --- Announcements ---
    let announcer: Arc<dyn AnnouncerPort> = match cfg.announce_webhook_url() {
        Some(url) => {
            let timeout = cfg.announce_timeout();
            info!(
                timeout_ms = timeout.as_millis() as u64,
                "announcing to webhook (VOTUM_ANNOUNCE_WEBHOOK_URL)"
            );
            Arc::new(
                WebhookAnnouncer::new(url, timeout)
                    .map_err(|e| anyhow::anyhow!("webhook announcer: {}", e))?,
            )
        }
        None => {
            info!("VOTUM_ANNOUNCE_WEBHOOK_URL not set, announcing to the log");
            Arc::new(LogAnnouncer::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let lock_timeout = cfg.lock_timeout();
    info!(
        lock_timeout_ms = lock_timeout.map(|d| d.as_millis() as u64),
        "per-motion lock timeout"
    );

    // --- Services ---
    let motion_service = Arc::new(MotionService::new(
        Arc::clone(&storage.councils),
        Arc::clone(&storage.motions),
        Arc::clone(&storage.resolver),
        announcer,
        Arc::clone(&clock),
        MotionLocks::new(lock_timeout),
    ));
    let council_service = Arc::new(CouncilService::new(
        Arc::clone(&storage.councils),
        Arc::clone(&storage.weights),
        Arc::clone(&storage.configs),
        Arc::clone(&storage.motions),
        Arc::clone(&clock),
    ));
    let archive_dir = cfg.archive_dir_or_default();
    info!(path = %archive_dir.display(), "archive directory");
    let archive_service = Arc::new(ArchiveService::new(
        Arc::clone(&storage.councils),
        Arc::clone(&storage.motions),
        clock,
        archive_dir,
    ));

    votum::adapters::ui::init_ui();

    let input_port: Arc<dyn InputPort> = Arc::new(ConsoleInputPort::new(
        motion_service,
        council_service,
        archive_service,
    ));

    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
