use std::net::SocketAddr;

use chrono::Duration;

use crate::scheduler::DurationEstimate;

/// Tuning for spec assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long a claim stays exclusive. When set, a spec still running after
    /// this many seconds may be handed to another worker. `None` keeps every
    /// claim for the life of the session.
    pub lease_ttl_secs: Option<u64>,

    /// Which duration statistic orders the backlog.
    pub estimate: DurationEstimate,
}

impl SchedulerConfig {
    pub fn with_lease_ttl_secs(mut self, secs: u64) -> Self {
        self.lease_ttl_secs = Some(secs);
        self
    }

    pub fn with_estimate(mut self, estimate: DurationEstimate) -> Self {
        self.estimate = estimate;
        self
    }

    /// Lease as a duration; a zero TTL is treated as no lease.
    pub fn lease(&self) -> Option<Duration> {
        self.lease_ttl_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::seconds(secs.min(u32::MAX as u64) as i64))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub scheduler: SchedulerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:8080"
                .parse()
                .expect("default listen address is valid"),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }
}
