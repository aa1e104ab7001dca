//! Sliding-window rate limiting.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::clock::Clock;

/// How requests are grouped into buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBy {
    /// Per client address.
    #[default]
    Ip,
    /// Per resolved subject, falling back to a shared anonymous bucket.
    User,
    /// One bucket per endpoint shared by every caller.
    Global,
}

impl FromStr for RateLimitBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(RateLimitBy::Ip),
            "user" => Ok(RateLimitBy::User),
            "global" => Ok(RateLimitBy::Global),
            other => Err(format!("unknown rate limit strategy `{}`", other)),
        }
    }
}

impl fmt::Display for RateLimitBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RateLimitBy::Ip => "ip",
            RateLimitBy::User => "user",
            RateLimitBy::Global => "global",
        })
    }
}

/// Bucket key for a strategy, endpoint and resolved subject.
pub fn bucket_key(by: RateLimitBy, handler: &str, subject: Option<&str>) -> String {
    match by {
        RateLimitBy::Global => format!("global:{}", handler),
        RateLimitBy::User => format!("user:{}:{}", subject.unwrap_or("anonymous"), handler),
        RateLimitBy::Ip => format!("ip:{}:{}", subject.unwrap_or("unknown"), handler),
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Whole seconds until the oldest request leaves the window (at least 1).
    pub reset_secs: u64,
}

/// Admitted timestamps of one key and the window they were checked against.
#[derive(Debug)]
struct Bucket {
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl Bucket {
    fn new(window: Duration) -> Self {
        Self {
            window,
            stamps: VecDeque::new(),
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        !self
            .stamps
            .back()
            .is_some_and(|ts| now.saturating_duration_since(*ts) < self.window)
    }
}

/// Sliding-window log limiter.
///
/// Each bucket keeps the timestamps of admitted requests inside the trailing window.
/// The purge, count and insert for one key run under that key's shard lock, so two
/// requests racing for the last slot cannot both be admitted. Buckets whose newest
/// timestamp has left the window are dropped by [`sweep`](Self::sweep).
pub struct SlidingWindowLimiter {
    buckets: DashMap<String, Bucket>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Admit or deny a request for `key` at the limiter clock's current time.
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_and_record(key, limit, window, self.clock.now())
    }

    /// Purge expired timestamps, then admit and record `now` if the bucket has room.
    pub fn check_and_record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> RateDecision {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(window));
        bucket.window = window;
        let stamps = &mut bucket.stamps;

        while stamps
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= window)
        {
            stamps.pop_front();
        }

        let count = stamps.len() as u32;
        if count >= limit {
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs: reset_after(stamps.front().copied(), window, now),
            };
        }

        stamps.push_back(now);
        RateDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count + 1),
            reset_secs: reset_after(stamps.front().copied(), window, now),
        }
    }

    /// Drop buckets whose newest timestamp has left their window.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(now));
        before.saturating_sub(self.buckets.len())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

/// Sweep idle buckets every `every` until `shutdown` fires.
pub async fn run_sweeper(
    limiter: Arc<SlidingWindowLimiter>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        remaining = limiter.bucket_count(),
                        "Swept idle rate limit buckets"
                    );
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate limit sweeper stopping");
                break;
            }
        }
    }
}

fn reset_after(oldest: Option<Instant>, window: Duration, now: Instant) -> u64 {
    let remaining = match oldest {
        Some(ts) => (ts + window).saturating_duration_since(now),
        None => window,
    };
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
