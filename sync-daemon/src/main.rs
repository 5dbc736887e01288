//! Example process wiring the foldersync core engine to an in-memory peer
//! set. This binary owns no core logic of its own: it loads a folder list
//! from a TOML config file, wires up an in-memory index store and block
//! index, spawns the pipeline stages and one folder controller per
//! configured folder, and runs until interrupted.

mod config;
mod memory_store;

use clap::Parser;
use config::DaemonConfig;
use foldersync_core::events::CoreEvent;
use foldersync_core::folder::FolderController;
use foldersync_core::model::FileInfo;
use foldersync_core::pipeline::{copier, db_updater, finisher, puller, CopyJob, STAGE_CHANNEL_CAPACITY};
use foldersync_core::progress::ProgressSender;
use foldersync_core::versioner::NoVersioning;
use memory_store::{MemoryBlockIndex, MemoryIndexStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "foldersyncd", about = "Example foldersync core engine host")]
struct Args {
    /// Path to a TOML config file listing folders to synchronize.
    #[arg(short, long, default_value = "foldersyncd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match DaemonConfig::load(&args.config).await {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, path = %args.config.display(), "could not load config, starting with no folders");
            DaemonConfig {
                folder: Vec::new(),
                pool: Default::default(),
            }
        }
    };

    let store: Arc<dyn foldersync_core::index_store::IndexStore> = Arc::new(MemoryIndexStore::new());
    let block_index: Arc<dyn foldersync_core::block_index::BlockIndex> = Arc::new(MemoryBlockIndex::new());
    let versioner = Arc::new(NoVersioning);
    let pool = config.pool_config();

    let (copy_tx, copy_rx) = mpsc::channel::<CopyJob>(STAGE_CHANNEL_CAPACITY);
    let (block_tx, block_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
    let (finish_tx, finish_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
    let (outcome_tx, outcome_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
    let (event_tx, mut event_rx) = mpsc::channel::<CoreEvent>(STAGE_CHANNEL_CAPACITY);

    let files_by_name = Arc::new(RwLock::new(HashMap::<(String, String), FileInfo>::new()));
    let connections = Arc::new(RwLock::new(HashMap::new()));
    let activity = Arc::new(foldersync_core::device_activity::DeviceActivity::new());
    let folder_errors = Arc::new(Mutex::new(HashMap::new()));

    let temp_dir = std::env::temp_dir().join("foldersyncd");
    tokio::fs::create_dir_all(&temp_dir).await.ok();
    let progress = Arc::new(Mutex::new(ProgressSender::new(std::time::Duration::from_secs(2))));

    tokio::spawn(copier::run(
        copy_rx,
        block_tx,
        finish_tx.clone(),
        block_index,
        Arc::new(|_folder: &str, _block_index: usize| Vec::new()),
        temp_dir,
        files_by_name.clone(),
    ));
    puller::spawn_pool(
        pool.pullers,
        block_rx,
        finish_tx,
        connections,
        activity,
        files_by_name,
        progress,
    );
    tokio::spawn(finisher::run(
        finish_rx,
        outcome_tx,
        store.clone(),
        versioner,
        foldersync_core::model::ShortId(0),
        false,
        false,
    ));
    let controller_event_tx = event_tx.clone();
    tokio::spawn(db_updater::run(outcome_rx, store.clone(), event_tx, folder_errors));

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(?event, "core event");
        }
    });

    let (_stop_tx, stop_rx) = watch::channel(false);
    let remote_indexes = Arc::new(RwLock::new(HashMap::new()));

    let mut controllers = Vec::new();
    for entry in &config.folder {
        let folder_config = foldersync_core::model::FolderConfig::from(entry);
        info!(folder = %folder_config.id, path = %folder_config.path.display(), "starting folder controller");
        let controller = FolderController::new(
            folder_config,
            store.clone(),
            copy_tx.clone(),
            stop_rx.clone(),
            remote_indexes.clone(),
        )
        .with_events(controller_event_tx.clone());
        controllers.push(tokio::spawn(controller.run()));
    }

    if controllers.is_empty() {
        info!("no folders configured, idling until interrupted");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
