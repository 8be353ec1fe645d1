use crate::blockchain::{AddBlockResult, Core, CoreOptions, Event};
use crate::checkpoints::Checkpoints;
use crate::crypto::SignatureVerifier;
use crate::db::{Database, DiskDatabase, MemoryDatabase};
use crate::mempool::TransactionPool;
use crate::primitives::{Hash, RawBlock};
use crate::protocol::{Currency, Network};
use crate::util::init_logger;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use crossbeam_channel::Receiver;
use log::{debug, info, warn, LevelFilter};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::interval;

pub struct NodeConfig {
    pub network: Network,
    /// Database directory, `None` keeps everything in memory
    pub path: Option<PathBuf>,
    /// CSV file of `index,hash` lines
    pub checkpoints_path: Option<PathBuf>,
    pub checkpoints_enabled: bool,
    pub pool_cleaning_interval: Duration,
    pub command_buffer: usize,
    /// Installs the env_logger backend at this level when set
    pub log_level: Option<LevelFilter>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            path: None,
            checkpoints_path: None,
            checkpoints_enabled: true,
            pool_cleaning_interval: Duration::from_secs(60),
            command_buffer: 64,
            log_level: None,
        }
    }
}

impl NodeConfig {
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            ..Default::default()
        }
    }

    /// Opens the database, loads checkpoints and initializes a core
    pub fn build_core(&self, verifier: Arc<dyn SignatureVerifier>) -> Result<Core> {
        let database: Arc<dyn Database> = match &self.path {
            Some(path) => Arc::new(
                DiskDatabase::new(path.clone())
                    .with_context(|| format!("opening database at {}", path.display()))?,
            ),
            None => Arc::new(MemoryDatabase::new()),
        };

        let mut checkpoints = Checkpoints::new();
        checkpoints.set_enabled(self.checkpoints_enabled);
        if let Some(path) = &self.checkpoints_path {
            checkpoints
                .load_from_csv(path)
                .with_context(|| format!("loading checkpoints from {}", path.display()))?;
        }

        let mut options =
            CoreOptions::new(Currency::from_network(self.network), database, verifier);
        options.checkpoints = checkpoints;

        let mut core = Core::new(options)?;
        core.load()?;
        Ok(core)
    }
}

enum NodeCommand {
    AddBlock(RawBlock, oneshot::Sender<Result<AddBlockResult>>),
    AddTransaction(Bytes, oneshot::Sender<Result<Hash>>),
}

/// Owns the core and serializes every mutation through one ingestion task. Must be created
/// inside a tokio runtime.
pub struct Node {
    pub core: Arc<RwLock<Core>>,
    /// The core's pool, queried under its own lock while blocks are being ingested
    pool: Arc<TransactionPool>,
    commands: mpsc::Sender<NodeCommand>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub fn new(config: NodeConfig, verifier: Arc<dyn SignatureVerifier>) -> Result<Self> {
        if let Some(level) = config.log_level {
            init_logger(level);
        }
        let core = config.build_core(verifier)?;
        info!(
            "Starting {:?} node at height {}.",
            config.network,
            core.top_block_index()
        );
        Ok(Self::from_core(Arc::new(RwLock::new(core)), &config))
    }

    pub fn from_core(core: Arc<RwLock<Core>>, config: &NodeConfig) -> Self {
        let pool = Arc::clone(core.read().pool());
        let (commands, receiver) = mpsc::channel(config.command_buffer.max(1));
        let tasks = vec![
            tokio::spawn(ingest(Arc::clone(&core), receiver)),
            tokio::spawn(clean_pool(
                Arc::clone(&core),
                config.pool_cleaning_interval,
            )),
        ];
        Self {
            core,
            pool,
            commands,
            tasks,
        }
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    pub async fn add_block(&self, block: RawBlock) -> Result<AddBlockResult> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::AddBlock(block, tx))
            .await
            .map_err(|_| anyhow!("ingestion task stopped"))?;
        rx.await?
    }

    pub async fn add_transaction(&self, blob: Bytes) -> Result<Hash> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::AddTransaction(blob, tx))
            .await
            .map_err(|_| anyhow!("ingestion task stopped"))?;
        rx.await?
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        self.core.read().subscribe()
    }

    pub fn save(&self) -> Result<()> {
        self.core.read().save()?;
        Ok(())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Err(err) = self.core.read().save() {
            warn!("Failed to save pool on shutdown: {}", err);
        }
    }
}

async fn ingest(core: Arc<RwLock<Core>>, mut receiver: mpsc::Receiver<NodeCommand>) {
    while let Some(command) = receiver.recv().await {
        let core = Arc::clone(&core);
        let handled = tokio::task::spawn_blocking(move || match command {
            NodeCommand::AddBlock(block, tx) => {
                let result = core.write().add_block(block).map_err(anyhow::Error::from);
                let _ = tx.send(result);
            }
            NodeCommand::AddTransaction(blob, tx) => {
                let result = core
                    .read()
                    .add_transaction_to_pool(blob)
                    .map_err(anyhow::Error::from);
                let _ = tx.send(result);
            }
        })
        .await;
        if let Err(err) = handled {
            warn!("Ingestion command failed: {}", err);
        }
    }
    debug!("Ingestion task stopped.");
}

async fn clean_pool(core: Arc<RwLock<Core>>, period: Duration) {
    let mut interval = interval(period.max(Duration::from_millis(1)));
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let core = Arc::clone(&core);
        let cleaned =
            tokio::task::spawn_blocking(move || core.read().transaction_pool_cleaning_procedure())
                .await;
        match cleaned {
            Ok(deleted) if !deleted.is_empty() => {
                debug!("Pool cleaning removed {} txs.", deleted.len())
            }
            Ok(_) => {}
            Err(err) => warn!("Pool cleaning failed: {}", err),
        }
    }
}
