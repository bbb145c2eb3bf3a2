//! Periodic expiry sweep
//!
//! Lazy expiry on access is enough for correctness; the sweep archives
//! abandoned sessions promptly and retries pending archive writes.

use parley_core::archive::ArchiveRecord;
use parley_core::config::SweepConfig;
use parley_core::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::lifecycle::LifecycleManager;

/// Background task running [`LifecycleManager::sweep_expired`] on an interval
pub struct SweepService {
    lifecycle: Arc<LifecycleManager>,
    config: SweepConfig,
    running: Arc<RwLock<bool>>,
    task: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl SweepService {
    pub fn new(lifecycle: Arc<LifecycleManager>, config: SweepConfig) -> Self {
        Self {
            lifecycle,
            config,
            running: Arc::new(RwLock::new(false)),
            task: Arc::new(RwLock::new(None)),
        }
    }

    /// Start sweeping; a no-op when disabled or already running
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("Expiry sweep disabled");
            return;
        }

        {
            let mut running = self.running.write().await;
            if *running {
                debug!("Expiry sweep already running");
                return;
            }
            *running = true;
        }

        let interval = tokio::time::Duration::from_secs(self.config.interval_s);
        let running = Arc::clone(&self.running);
        let lifecycle = Arc::clone(&self.lifecycle);

        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !*running.read().await {
                    break;
                }
                if let Err(e) = lifecycle.sweep_expired().await {
                    error!("Expiry sweep failed: {}", e);
                }
            }
        });

        *self.task.write().await = Some(task);
        info!("Expiry sweep started (every {}s)", self.config.interval_s);
    }

    /// Stop sweeping
    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(task) = self.task.write().await.take() {
            task.abort();
            info!("Expiry sweep stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run one sweep immediately
    pub async fn trigger_now(&self) -> Result<Vec<ArchiveRecord>> {
        self.lifecycle.sweep_expired().await
    }

    /// Service status
    pub async fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "enabled": self.config.enabled,
            "running": *self.running.read().await,
            "interval_s": self.config.interval_s,
        })
    }
}
