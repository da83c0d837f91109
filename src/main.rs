mod config;
mod core;
mod interfaces;

use std::sync::Arc;

use anyhow::Result;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::core::bootstrap::connect_with_retry;
use crate::core::catalog::PromptCatalog;
use crate::core::dispatch::WeeklyDispatcher;
use crate::core::lifecycle::LifecycleManager;
use crate::core::rotation::{RotationEngine, RotationSelector};
use crate::core::store::{JournalStore, ScheduleStore, SqliteStore, UserProgressStore};
use crate::interfaces::telegram::{TelegramChannel, TelegramDelivery};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cfg = Config::from_env();
    info!("Starting reverie (data dir: {})", cfg.data_dir.display());
    tokio::fs::create_dir_all(&cfg.data_dir).await?;

    // An empty or invalid catalog is fatal: nothing may serve prompts.
    let catalog = Arc::new(PromptCatalog::load()?);

    let db_path = cfg.db_path();
    let store = match connect_with_retry(cfg.max_connect_attempts, cfg.connect_base_delay, || {
        let db_path = db_path.clone();
        async move {
            let store = SqliteStore::open(&db_path)?;
            store.ping().await?;
            Ok(store)
        }
    })
    .await
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            if cfg.degraded_mode_allowed {
                error!(
                    "Store never became available ({}); running degraded with delivery disabled",
                    e
                );
                tokio::signal::ctrl_c().await?;
                return Ok(());
            }
            return Err(e.into());
        }
    };

    let engine = Arc::new(RotationEngine::new(
        RotationSelector::new(catalog),
        UserProgressStore::new(store.clone()),
    ));
    let schedules = Arc::new(ScheduleStore::new(store.clone()));
    let progress = Arc::new(UserProgressStore::new(store.clone()));
    let journal = Arc::new(JournalStore::new(store.connection()));

    let mut lifecycle = LifecycleManager::new().await?;

    if cfg.telegram_token.is_empty() {
        warn!("TELEGRAM_BOT_TOKEN is not set; weekly delivery and bot commands are disabled");
    } else {
        let delivery = Arc::new(TelegramDelivery::new(&cfg.telegram_token));
        let dispatcher = Arc::new(WeeklyDispatcher::new(
            engine.clone(),
            schedules.clone(),
            delivery,
            cfg.dispatch_batch_size,
            cfg.per_user_timeout,
        ));
        dispatcher.register(&lifecycle.scheduler).await?;

        lifecycle.attach(Arc::new(tokio::sync::Mutex::new(TelegramChannel::new(
            cfg.telegram_token.clone(),
            engine,
            schedules,
            progress,
            journal,
        ))));
    }

    lifecycle.start().await?;
    info!("reverie is up; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await
}
