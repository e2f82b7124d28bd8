use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Time source for window bookkeeping.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().expect("manual clock mutex poisoned");
        *current += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().expect("manual clock mutex poisoned")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
    /// Above this many tracked clients, expired windows are pruned at most
    /// once per window.
    pub max_tracked_clients: usize,
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            max_tracked_clients: 10_000,
            trust_forwarded_for: false,
        }
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            max_tracked_clients: config.max_tracked_clients,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitWindow {
    count: u32,
    started: Instant,
}

/// Fixed-window request counter keyed by client address.
///
/// One instance is built per process and shared by every handler. Each check
/// takes the shard lock for its key, so concurrent requests from the same
/// client never lose an increment.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: DashMap<String, RateLimitWindow>,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    /// Milliseconds after `epoch` of the last sweep, or `NEVER_PRUNED`.
    last_prune: AtomicU64,
}

const NEVER_PRUNED: u64 = u64::MAX;

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
            epoch: clock.now(),
            clock,
            last_prune: AtomicU64::new(NEVER_PRUNED),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Count a request from `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> RateDecision {
        let now = self.clock.now();
        if self.windows.len() > self.policy.max_tracked_clients {
            self.prune_if_due(now);
        }

        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert(RateLimitWindow {
                count: 0,
                started: now,
            });
        let window = entry.value_mut();

        let elapsed = now.duration_since(window.started);
        if elapsed >= self.policy.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.policy.max_requests {
            let retry_after = self
                .policy
                .window
                .saturating_sub(now.duration_since(window.started));
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.policy.max_requests - window.count,
        }
    }

    /// Sweep unless another sweep ran within the last window. Only one caller
    /// wins the swap, so concurrent checks never sweep twice.
    fn prune_if_due(&self, now: Instant) {
        let window_ms = u64::try_from(self.policy.window.as_millis()).unwrap_or(u64::MAX);
        let since_epoch = now.saturating_duration_since(self.epoch);
        let elapsed_ms = u64::try_from(since_epoch.as_millis()).unwrap_or(NEVER_PRUNED - 1);
        let last = self.last_prune.load(Ordering::Acquire);
        if last != NEVER_PRUNED && elapsed_ms.saturating_sub(last) < window_ms {
            return;
        }
        if self
            .last_prune
            .compare_exchange(last, elapsed_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.prune(now);
        }
    }

    /// Drop windows that have fully elapsed.
    pub fn prune(&self, now: Instant) {
        let window = self.policy.window;
        self.windows
            .retain(|_, entry| now.duration_since(entry.started) < window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
