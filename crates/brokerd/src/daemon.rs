//! Daemon lifecycle: open the store, recover, run, drain.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use broker_core::{BrokerConfig, JobMethod};
use broker_jobs::{JobTracker, MessageBus, RecoveryReport, RecoveryScanner, SubscriberStats, WorkEngine};
use broker_state::{Dao, RedbObjectStore, StateError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Apply command-line overrides on top of the loaded config.
///
/// `data_dir` replaces the directory of the store file, keeping its name.
pub fn apply_overrides(config: &mut BrokerConfig, data_dir: Option<&Path>, namespace: Option<&str>) {
    if let Some(dir) = data_dir {
        let file = config
            .store
            .path
            .file_name()
            .map(|name| name.to_owned())
            .unwrap_or_else(|| "broker.redb".into());
        config.store.path = dir.join(file);
    }
    if let Some(ns) = namespace {
        config.store.namespace = ns.to_string();
    }
}

/// Open the store file (creating its directory) and wrap it in a [`Dao`].
///
/// The file is exclusive to one process. While a daemon runs, every other
/// open fails with [`StateError::Locked`].
pub fn open_dao(config: &BrokerConfig) -> anyhow::Result<Dao> {
    if let Some(parent) = config.store.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = RedbObjectStore::open(&config.store.path).map_err(|e| match e {
        StateError::Locked(_) => anyhow::Error::new(e)
            .context("the state store is held by a running brokerd; stop it before running this command"),
        other => other.into(),
    })?;
    info!(path = ?config.store.path, namespace = %config.store.namespace, "state store opened");
    Ok(Dao::new(Arc::new(store), config.store.namespace.clone()))
}

/// A running broker.
pub struct Daemon {
    dao: Dao,
    engine: WorkEngine,
    shutdown_tx: watch::Sender<bool>,
    recovery_task: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Open the store, run the startup recovery pass, then start the work
    /// engine and the periodic recovery loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &BrokerConfig,
        tracker: Arc<dyn JobTracker>,
    ) -> anyhow::Result<(Self, RecoveryReport)> {
        let dao = open_dao(config)?;
        let scanner = Arc::new(RecoveryScanner::new(dao.clone(), tracker));

        // Startup pass: the index must be readable before accepting work.
        let report = scanner.scan()?;
        if !report.errors.is_empty() {
            warn!(errors = %report.errors, "startup scan skipped unreadable job states");
        }
        if config.recovery.reconcile {
            scanner.reconcile()?;
        }

        let engine = WorkEngine::start(Arc::new(dao.clone()), config.bus.capacity);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let recovery_task = config.recovery.interval().map(|interval| {
            let reconcile = config.recovery.reconcile;
            tokio::spawn(async move {
                scanner.run(interval, reconcile, shutdown_rx).await;
            })
        });
        if recovery_task.is_none() {
            info!("periodic recovery disabled");
        }

        info!(pending = report.pending(), "broker daemon started");
        Ok((
            Self {
                dao,
                engine,
                shutdown_tx,
                recovery_task,
            },
            report,
        ))
    }

    /// Producer handle for executors.
    pub fn bus(&self) -> MessageBus {
        self.engine.bus()
    }

    pub fn dao(&self) -> &Dao {
        &self.dao
    }

    /// Stop the recovery loop, close the bus and drain every subscriber.
    ///
    /// Outstanding [`bus`](Self::bus) handles must be dropped first.
    pub async fn shutdown(self) -> BTreeMap<JobMethod, SubscriberStats> {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.recovery_task {
            if let Err(e) = task.await {
                error!(error = %e, "recovery loop task failed");
            }
        }

        let report = self.engine.shutdown().await;
        for (method, stats) in &report {
            info!(%method, %stats, "subscriber drained");
        }
        info!("broker daemon stopped");
        report
    }
}
