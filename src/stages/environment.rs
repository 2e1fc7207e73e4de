//! Proxy/firewall detection by sampling name resolution
//!
//! Runs before an item is claimed, so a worker behind an interposing proxy
//! stops without taking work away from the tracker.

use crate::config::EnvironmentConfig;
use crate::error::{EnvironmentError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Name resolution boundary
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a host name to one address
    async fn resolve(&self, host: &str) -> std::io::Result<IpAddr>;
}

/// Resolver backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<IpAddr> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 80))
            .await?
            .map(|a| a.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned")
            })
    }
}

/// Sampling counter shared by every item in the process
///
/// The first call to [`should_check`](Self::should_check) says yes; after a
/// check the next `interval` calls say no, then the cycle repeats.
#[derive(Debug)]
pub struct CheckSchedule {
    remaining: AtomicU32,
    interval: u32,
}

impl CheckSchedule {
    /// Create a schedule that checks once every `interval + 1` items
    pub fn new(interval: u32) -> Self {
        Self {
            remaining: AtomicU32::new(0),
            interval,
        }
    }

    /// Decide whether this item runs the full check, advancing the counter
    pub fn should_check(&self) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(if n == 0 { self.interval } else { n - 1 })
            });
        // the closure always returns Some
        matches!(previous, Ok(0) | Err(0))
    }

    /// Make the next item run the check
    pub fn force_next(&self) {
        self.remaining.store(0, Ordering::SeqCst);
    }
}

/// Verifies that reference hosts resolve to distinct addresses
pub struct EnvironmentCheck {
    resolver: Arc<dyn Resolver>,
    hosts: Vec<String>,
    schedule: Arc<CheckSchedule>,
}

impl EnvironmentCheck {
    /// Create the check
    pub fn new(
        resolver: Arc<dyn Resolver>,
        hosts: Vec<String>,
        schedule: Arc<CheckSchedule>,
    ) -> Self {
        Self {
            resolver,
            hosts,
            schedule,
        }
    }

    /// Create the check from configuration
    pub fn from_config(
        config: &EnvironmentConfig,
        resolver: Arc<dyn Resolver>,
        schedule: Arc<CheckSchedule>,
    ) -> Self {
        Self::new(resolver, config.reference_hosts.clone(), schedule)
    }

    /// Resolve every reference host and compare the distinct address count
    pub async fn check(&self) -> Result<Vec<IpAddr>> {
        let mut addresses = Vec::with_capacity(self.hosts.len());
        for host in &self.hosts {
            let ip = self.resolver.resolve(host).await.map_err(|e| {
                EnvironmentError::ResolutionFailed {
                    host: host.clone(),
                    reason: e.to_string(),
                }
            })?;
            tracing::debug!(host = %host, ip = %ip, "resolved reference host");
            addresses.push(ip);
        }

        let expected = self.hosts.iter().collect::<BTreeSet<_>>().len();
        let distinct = addresses.iter().collect::<BTreeSet<_>>().len();
        if distinct != expected {
            return Err(EnvironmentError::ProxyDetected {
                distinct,
                expected,
                addresses,
            }
            .into());
        }
        Ok(addresses)
    }
}

impl EnvironmentCheck {
    /// Run the full check if the schedule says this item is due
    ///
    /// Returns whether a full check ran. A failed lookup makes the next
    /// call check again.
    pub async fn run_sampled(&self) -> Result<bool> {
        if !self.schedule.should_check() {
            return Ok(false);
        }

        match self.check().await {
            Ok(addresses) => {
                tracing::info!(
                    hosts = self.hosts.len(),
                    distinct = addresses.len(),
                    "environment check passed"
                );
                Ok(true)
            }
            Err(e) => {
                self.schedule.force_next();
                Err(e)
            }
        }
    }
}
