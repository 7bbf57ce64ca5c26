use crate::engine::AggregationEngine;
use serde::Serialize;
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub status: &'static str,
    pub version: &'static str,
    pub configured_hosts: usize,
    pub reachable_hosts: usize,
    pub uptime_seconds: u64,
    pub memory_usage_mb: f32,
    pub poll_cycles: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_cycle: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    /// Joignables = hosts actuellement configurés dont le dernier statut est OK
    pub fn get_health(&self, engine: &AggregationEngine) -> KernelHealth {
        let hosts = engine.registry().snapshot();
        let statuses = engine.host_statuses();
        let reachable = hosts
            .iter()
            .filter(|h| statuses.get(&h.display_name).is_some_and(|s| s.reachable))
            .count();

        KernelHealth {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            configured_hosts: hosts.len(),
            reachable_hosts: reachable,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            memory_usage_mb: get_memory_usage_mb(),
            poll_cycles: engine.cycle_count(),
            last_cycle: engine.last_cycle(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|l| l.starts_with("VmRSS:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0; // KB -> MB
            }
        }
    }

    // inconnu hors Linux
    0.0
}
