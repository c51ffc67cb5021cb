// Periodic reachability probe for every configured CRCON server.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::{CrconClient, ServerTarget};
use crate::metrics;

/// Last-known state of one server.
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub target: ServerTarget,
    pub name: String,
    pub reachable: bool,
    pub latency: Duration,
    pub player_count: Option<i64>,
    pub current_map: Option<String>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Shared snapshot written by the probe task and read by status commands.
#[derive(Clone, Default)]
pub struct HealthMonitor {
    inner: Arc<RwLock<BTreeMap<ServerTarget, ServerHealth>>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ServerHealth> {
        self.inner.read().unwrap().values().cloned().collect()
    }

    pub fn record(&self, health: ServerHealth) {
        metrics::SERVER_UP
            .with_label_values(&[&health.target.get().to_string()])
            .set(health.reachable as i64);
        if let Some(count) = health.player_count {
            metrics::SERVER_PLAYERS
                .with_label_values(&[&health.target.get().to_string()])
                .set(count);
        }
        self.inner.write().unwrap().insert(health.target, health);
    }
}

/// Probe every server concurrently and record the results.
pub async fn probe_all(client: &CrconClient, monitor: &HealthMonitor) {
    let probes = client.servers().iter().map(|server| async move {
        let diagnosis = client.diagnose(server.target).await;
        let (reachable, player_count, current_map, error) = match diagnosis.result {
            Ok(state) => (
                true,
                Some(state.player_count()),
                state.current_map_id(),
                None,
            ),
            Err(e) => (false, None, None, Some(e)),
        };
        ServerHealth {
            target: server.target,
            name: server.name.clone(),
            reachable,
            latency: diagnosis.latency,
            player_count,
            current_map,
            error,
            checked_at: Utc::now(),
        }
    });
    for health in futures::future::join_all(probes).await {
        if !health.reachable {
            tracing::warn!(
                server = health.target.get(),
                error = health.error.as_deref().unwrap_or(""),
                "health probe failed"
            );
        }
        monitor.record(health);
    }
}

/// Spawn the background probe. It exits as soon as `shutdown` flips to `true`,
/// even in the middle of a probe round.
pub fn spawn_health_probe(
    client: CrconClient,
    monitor: HealthMonitor,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "health probe started");
        loop {
            tokio::select! {
                _ = probe_all(&client, &monitor) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!("health probe stopped");
    })
}
