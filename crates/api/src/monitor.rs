use chrono::{DateTime, Utc};
use fadvisor_core::analysis::alerts::{scan_symbol, Alert, AlertThresholds};
use fadvisor_core::market::{normalize_symbol, MarketDataProvider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub task_id: String,
    pub symbols: Vec<String>,
    pub interval_secs: u64,
    pub thresholds: AlertThresholds,
    pub started_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub runs: u64,
    /// Alerts from the most recent pass.
    pub alerts: Vec<Alert>,
    /// Per-symbol failures from the most recent pass.
    pub errors: Vec<String>,
}

struct MonitorTask {
    status: Arc<RwLock<MonitorStatus>>,
    handle: JoinHandle<()>,
}

/// Background alert checks, one tokio task per monitor.
#[derive(Clone, Default)]
pub struct MonitorRegistry {
    tasks: Arc<Mutex<HashMap<String, MonitorTask>>>,
}

impl MonitorRegistry {
    pub async fn start(
        &self,
        provider: Arc<dyn MarketDataProvider>,
        symbols: Vec<String>,
        thresholds: AlertThresholds,
        interval: Duration,
    ) -> MonitorStatus {
        let interval = interval.max(MIN_INTERVAL);
        let task_id = format!("monitor_{}", Uuid::new_v4().simple());
        let symbols: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();

        let status = Arc::new(RwLock::new(MonitorStatus {
            task_id: task_id.clone(),
            symbols: symbols.clone(),
            interval_secs: interval.as_secs(),
            thresholds,
            started_at: Utc::now(),
            last_run: None,
            runs: 0,
            alerts: Vec::new(),
            errors: Vec::new(),
        }));

        let handle = tokio::spawn(run_monitor(
            provider,
            symbols,
            thresholds,
            interval,
            Arc::clone(&status),
        ));

        let snapshot = status.read().await.clone();
        self.tasks
            .lock()
            .await
            .insert(task_id.clone(), MonitorTask { status, handle });

        tracing::info!(%task_id, symbols = ?snapshot.symbols, ?interval, "monitor started");
        snapshot
    }

    pub async fn status(&self, task_id: &str) -> Option<MonitorStatus> {
        let status = {
            let tasks = self.tasks.lock().await;
            Arc::clone(&tasks.get(task_id)?.status)
        };
        let out = status.read().await.clone();
        Some(out)
    }

    /// Abort the task. False if no such monitor exists.
    pub async fn stop(&self, task_id: &str) -> bool {
        let Some(task) = self.tasks.lock().await.remove(task_id) else {
            return false;
        };
        task.handle.abort();
        tracing::info!(%task_id, "monitor stopped");
        true
    }

    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, task) in tasks.drain() {
            task.handle.abort();
        }
    }
}

async fn run_monitor(
    provider: Arc<dyn MarketDataProvider>,
    symbols: Vec<String>,
    thresholds: AlertThresholds,
    interval: Duration,
    status: Arc<RwLock<MonitorStatus>>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let mut alerts = Vec::new();
        let mut errors = Vec::new();
        for symbol in &symbols {
            match scan_symbol(provider.as_ref(), symbol, &thresholds).await {
                Ok(found) => {
                    for alert in &found {
                        tracing::info!(symbol = %alert.symbol, kind = ?alert.kind, message = %alert.message, "alert");
                    }
                    alerts.extend(found);
                }
                Err(err) => {
                    tracing::warn!(%symbol, error = %err, "monitor check failed");
                    errors.push(err.to_string());
                }
            }
        }

        let mut s = status.write().await;
        s.runs += 1;
        s.last_run = Some(Utc::now());
        s.alerts = alerts;
        s.errors = errors;
    }
}
