//! Fixed-window request counter keyed by client address.
//!
//! Counts are not aged per request. A background timer clears the whole table
//! once per window, so a client can burst up to twice the limit across a
//! window boundary.

use dashmap::DashMap;
use log::debug;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a client may make another pipeline request
pub trait AbuseCounter: Send + Sync {
    /// Record one hit; returns false when the client is over its limit
    fn hit(&self, client: IpAddr) -> bool;

    /// Forget every count
    fn reset(&self);
}

pub struct FixedWindowCounter {
    max_requests: u32,
    counts: DashMap<IpAddr, u32>,
}

impl FixedWindowCounter {
    pub fn new(max_requests: u32) -> Self {
        Self {
            max_requests,
            counts: DashMap::new(),
        }
    }
}

impl AbuseCounter for FixedWindowCounter {
    fn hit(&self, client: IpAddr) -> bool {
        let mut count = self.counts.entry(client).or_insert(0);
        if *count >= self.max_requests {
            return false;
        }
        *count += 1;
        true
    }

    fn reset(&self) {
        self.counts.clear();
    }
}

/// Counter that never refuses, for tests and trusted deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl AbuseCounter for Unlimited {
    fn hit(&self, _client: IpAddr) -> bool {
        true
    }

    fn reset(&self) {}
}

/// Clear the counter every `window` for as long as the runtime lives
pub fn spawn_window_reset(
    counter: Arc<dyn AbuseCounter>,
    window: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Resetting request counters");
            counter.reset();
        }
    })
}
