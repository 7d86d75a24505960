//! Periodic driver for reconciliation runs

use crate::config::SchedulerConfig;
use crate::error::AgentResult;
use crate::manager::AgentManager;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Scheduler state
pub struct Scheduler {
    config: SchedulerConfig,
    manager: AgentManager,
    trigger_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    /// Create a new scheduler and the receiving end of its trigger channel
    pub fn new(config: SchedulerConfig, manager: AgentManager) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(10);

        let scheduler = Arc::new(Self {
            config,
            manager,
            trigger_tx,
            running: Arc::new(RwLock::new(false)),
        });

        (scheduler, trigger_rx)
    }

    /// Request a run outside the regular interval
    pub async fn trigger(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Run until stopped
    ///
    /// With `raise_on_error` the first failed run stops the loop and its
    /// error is returned; otherwise failures are logged and the loop goes on.
    pub async fn start(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) -> AgentResult<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(interval_secs = self.config.interval_secs, "Scheduler started");

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.run_immediately {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(_) = trigger_rx.recv() => {
                    tracing::debug!("Reconciliation triggered");
                }
                else => break,
            }

            if !*self.running.read().await {
                break;
            }

            if let Err(e) = self.run_once().await {
                if self.config.raise_on_error {
                    self.stop().await;
                    tracing::info!("Scheduler stopped on error");
                    return Err(e);
                }
            }
        }

        tracing::info!("Scheduler stopped");
        Ok(())
    }

    /// Stop the scheduler after the current run
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn run_once(&self) -> AgentResult<()> {
        if self.manager.engine().gate().is_held() {
            tracing::debug!("Reconciliation already in progress, skipping");
            return Ok(());
        }

        match self.manager.update_available_resource().await {
            Ok(report) => {
                if !report.is_clean() {
                    tracing::warn!(
                        failures = report.failures.len(),
                        deferred = report.deferred.len(),
                        "Reconciliation finished with unresolved records"
                    );
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation failed");
                Err(e)
            }
        }
    }
}
