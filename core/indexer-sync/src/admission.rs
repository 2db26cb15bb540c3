//! Admission control in front of the sync engine.
//!
//! Two independent guards, always applied in this order:
//! 1. [`RequestTracker`]: one in-flight request per cluster, and a ceiling on
//!    the number of clusters processing at once.
//! 2. [`LargeRequestLimiter`]: a ceiling on concurrently processing requests
//!    whose body exceeds a size threshold.
//!
//! Both hand out permits that release their slot on drop, so a slot is freed
//! however the request ends.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for admission control.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Maximum number of clusters with a request in flight.
    pub request_limit: usize,
    /// Bodies larger than this many bytes count as large.
    pub large_request_bytes: u64,
    /// Maximum number of large requests in flight.
    pub large_request_limit: usize,
    /// Cluster exempt from `request_limit`.
    pub bootstrap_cluster: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            request_limit: 25,
            large_request_bytes: 20 * 1024 * 1024,
            large_request_limit: 5,
            bootstrap_cluster: "local-cluster".to_string(),
        }
    }
}

/// Why a request was turned away. The message is sent back as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("A previous request from this cluster is processing, retry later.")]
    ClusterBusy,

    #[error("Indexer has too many pending requests, retry later.")]
    TooManyRequests,

    #[error("Too many large requests currently processing, retry later.")]
    TooManyLargeRequests,
}

// ── Per-cluster tracker ──────────────────────────────────────────

/// Tracks which clusters have a request in flight and since when.
#[derive(Debug)]
pub struct RequestTracker {
    in_flight: Arc<RwLock<HashMap<String, Instant>>>,
    limit: usize,
    bootstrap_cluster: String,
}

impl RequestTracker {
    pub fn new(limit: usize, bootstrap_cluster: impl Into<String>) -> Self {
        Self {
            in_flight: Arc::new(RwLock::new(HashMap::new())),
            limit,
            bootstrap_cluster: bootstrap_cluster.into(),
        }
    }

    /// Registers a request from `cluster`.
    pub fn try_acquire(&self, cluster: &str) -> Result<RequestPermit, Rejection> {
        if let Some(elapsed) = self.in_flight_for(cluster) {
            warn!("rejecting request from {cluster}, previous request processing for {elapsed:?}");
            return Err(Rejection::ClusterBusy);
        }

        let mut in_flight = self
            .in_flight
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Checked again under the write lock; a request may have slipped in.
        if in_flight.contains_key(cluster) {
            warn!("rejecting request from {cluster}, previous request processing");
            return Err(Rejection::ClusterBusy);
        }
        if in_flight.len() >= self.limit && cluster != self.bootstrap_cluster {
            warn!(
                "too many pending requests ({}), rejecting sync from {cluster}",
                in_flight.len()
            );
            return Err(Rejection::TooManyRequests);
        }
        in_flight.insert(cluster.to_string(), Instant::now());
        debug!("accepted request from {cluster}, {} in flight", in_flight.len());

        Ok(RequestPermit {
            in_flight: Arc::clone(&self.in_flight),
            cluster: cluster.to_string(),
        })
    }

    /// How long the current request of `cluster` has been running.
    pub fn in_flight_for(&self, cluster: &str) -> Option<Duration> {
        self.in_flight
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cluster)
            .map(Instant::elapsed)
    }

    /// Number of clusters with a request in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Holds a cluster's in-flight slot.
#[derive(Debug)]
pub struct RequestPermit {
    in_flight: Arc<RwLock<HashMap<String, Instant>>>,
    cluster: String,
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        self.in_flight
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.cluster);
    }
}

// ── Large request limiter ────────────────────────────────────────

/// Counts requests whose body exceeds a byte threshold.
#[derive(Debug)]
pub struct LargeRequestLimiter {
    count: Arc<RwLock<usize>>,
    threshold_bytes: u64,
    limit: usize,
}

impl LargeRequestLimiter {
    pub fn new(threshold_bytes: u64, limit: usize) -> Self {
        Self {
            count: Arc::new(RwLock::new(0)),
            threshold_bytes,
            limit,
        }
    }

    /// Takes a slot if the request is large. Requests at or under the
    /// threshold pass without one.
    pub fn try_acquire(
        &self,
        cluster: &str,
        content_length: u64,
    ) -> Result<Option<LargeRequestPermit>, Rejection> {
        if content_length <= self.threshold_bytes {
            return Ok(None);
        }

        let mut count = self.count.write().unwrap_or_else(PoisonError::into_inner);
        if *count >= self.limit {
            warn!(
                "rejecting large request from {cluster}, too many large requests processing. Request size: {}MB",
                content_length / 1024 / 1024
            );
            return Err(Rejection::TooManyLargeRequests);
        }
        *count += 1;

        Ok(Some(LargeRequestPermit {
            count: Arc::clone(&self.count),
        }))
    }

    /// Number of large requests in flight.
    pub fn in_flight(&self) -> usize {
        *self.count.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a large-request slot.
#[derive(Debug)]
pub struct LargeRequestPermit {
    count: Arc<RwLock<usize>>,
}

impl Drop for LargeRequestPermit {
    fn drop(&mut self) {
        let mut count = self.count.write().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
    }
}

// ── Controller ───────────────────────────────────────────────────

/// Both guards composed.
#[derive(Debug)]
pub struct AdmissionController {
    requests: RequestTracker,
    large_requests: LargeRequestLimiter,
}

/// Slots held by an admitted request. Dropping it releases them.
#[derive(Debug)]
pub struct AdmissionPermit {
    _large: Option<LargeRequestPermit>,
    _request: RequestPermit,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            requests: RequestTracker::new(config.request_limit, config.bootstrap_cluster.clone()),
            large_requests: LargeRequestLimiter::new(
                config.large_request_bytes,
                config.large_request_limit,
            ),
        }
    }

    /// Admits a request from `cluster` with a declared body size, or says
    /// why not. A rejection by the second guard releases the first.
    pub fn admit(&self, cluster: &str, content_length: u64) -> Result<AdmissionPermit, Rejection> {
        let request = self.requests.try_acquire(cluster)?;
        let large = self.large_requests.try_acquire(cluster, content_length)?;
        Ok(AdmissionPermit {
            _large: large,
            _request: request,
        })
    }

    pub fn requests(&self) -> &RequestTracker {
        &self.requests
    }

    pub fn large_requests(&self) -> &LargeRequestLimiter {
        &self.large_requests
    }
}
