//! Reachability probing: fast, cached TCP liveness checks with cooldown.
//!
//! Control calls ask the prober before touching the device so that an
//! offline strip costs at most one short connect timeout instead of the
//! transport's full I/O timeout. Results are cached for `cache_ttl`, and
//! after a failure further probes are suppressed for a growing cooldown
//! (see [`crate::backoff`]).

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::backoff::BackoffConfig;
use crate::endpoint::{DeviceEndpoint, DeviceIdentity};

/// Result of a reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Reachable => f.write_str("reachable"),
            Reachability::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Probe tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Upper bound for a single connect attempt.
    pub timeout: Duration,
    /// How long a probe result is reused without new I/O.
    pub cache_ttl: Duration,
    /// Cooldown schedule after failed probes.
    pub backoff: BackoffConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(300),
            cache_ttl: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Per-device probe state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityRecord {
    pub last_checked_at: Instant,
    pub last_result: Reachability,
    pub consecutive_failures: u32,
    pub next_allowed_check_at: Instant,
}

/// Low-level connectivity check. Any error counts as unreachable.
///
/// Takes a resolved address: nothing on the probe path does name lookups.
pub trait Connector {
    fn connect(&self, addr: SocketAddr, timeout: Duration) -> io::Result<()>;
}

/// Opens a TCP connection and closes it immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, addr: SocketAddr, timeout: Duration) -> io::Result<()> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        let _ = stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}

/// Cached, backoff-aware reachability prober.
///
/// Holds exactly one [`ReachabilityRecord`] per device identity. Each record
/// sits behind its own lock, which is held across the probe itself. Callers
/// that queued on that lock while a probe ran take its result instead of
/// probing again, whatever the cache TTL, so one caller waits for at most
/// one foreign probe plus its own.
pub struct ReachabilityProber<C: Connector = TcpConnector> {
    config: ProbeConfig,
    connector: C,
    records: Mutex<HashMap<DeviceIdentity, Arc<Mutex<Option<ReachabilityRecord>>>>>,
}

impl ReachabilityProber<TcpConnector> {
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> ReachabilityProber<C> {
    pub fn with_connector(config: ProbeConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Check whether `endpoint` is reachable.
    ///
    /// Never blocks longer than one probe timeout, plus at most one other
    /// caller's probe of the same device.
    pub fn check_reachable(&self, endpoint: &DeviceEndpoint) -> Reachability {
        let called_at = Instant::now();
        let slot = self.slot(endpoint);
        let mut record = lock(&slot);
        let now = Instant::now();

        if let Some(rec) = record.as_ref() {
            if rec.last_checked_at > called_at {
                log::debug!(
                    "sharing concurrent probe of {}: {}",
                    endpoint.identity(),
                    rec.last_result
                );
                return rec.last_result;
            }
            if now < rec.last_checked_at + self.config.cache_ttl {
                log::debug!(
                    "reachability cache hit for {}: {}",
                    endpoint.identity(),
                    rec.last_result
                );
                return rec.last_result;
            }
            if now < rec.next_allowed_check_at {
                log::debug!(
                    "{} in cooldown for another {:.1}s",
                    endpoint.identity(),
                    (rec.next_allowed_check_at - now).as_secs_f64()
                );
                return Reachability::Unreachable;
            }
        }

        let probe = self
            .connector
            .connect(endpoint.socket_addr(), self.config.timeout);
        let checked_at = Instant::now();
        let prior_failures = record.as_ref().map_or(0, |r| r.consecutive_failures);

        let next = match probe {
            Ok(()) => ReachabilityRecord {
                last_checked_at: checked_at,
                last_result: Reachability::Reachable,
                consecutive_failures: 0,
                next_allowed_check_at: checked_at,
            },
            Err(e) => {
                let failures = prior_failures.saturating_add(1);
                let cooldown = self.config.backoff.delay_for(failures);
                log::warn!(
                    "{} unreachable on {}: {e} (failure {failures}, next probe in {:.1}s)",
                    endpoint.identity(),
                    endpoint.socket_addr(),
                    cooldown.as_secs_f64()
                );
                let mut next_allowed = checked_at + cooldown;
                // Keep the cooldown horizon monotonic across consecutive failures.
                if let Some(prev) = record.as_ref()
                    && prev.next_allowed_check_at > next_allowed
                {
                    next_allowed = prev.next_allowed_check_at;
                }
                ReachabilityRecord {
                    last_checked_at: checked_at,
                    last_result: Reachability::Unreachable,
                    consecutive_failures: failures,
                    next_allowed_check_at: next_allowed,
                }
            }
        };
        if prior_failures > 0 && next.last_result == Reachability::Reachable {
            log::info!("{} reachable again", endpoint.identity());
        }
        let result = next.last_result;
        *record = Some(next);
        result
    }

    /// Snapshot of the record for `endpoint`, if it has been probed.
    pub fn record(&self, endpoint: &DeviceEndpoint) -> Option<ReachabilityRecord> {
        let records = lock(&self.records);
        let slot = records.get(&endpoint.identity())?;
        lock(slot).clone()
    }

    /// Drop cached state for `endpoint` so the next check probes immediately.
    pub fn forget(&self, endpoint: &DeviceEndpoint) {
        lock(&self.records).remove(&endpoint.identity());
    }

    fn slot(&self, endpoint: &DeviceEndpoint) -> Arc<Mutex<Option<ReachabilityRecord>>> {
        let mut records = lock(&self.records);
        Arc::clone(records.entry(endpoint.identity()).or_default())
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
