use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{LearningOsError, Result};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ready,
    RetryAfter(Duration),
    CeilingExceeded,
}

/// Minimum-interval gate with a per-rolling-minute ceiling. The caller
/// supplies the recent request count (from the usage log); the gate only
/// tracks the instant of the last admitted request. The clock is injectable
/// so tests advance time instead of sleeping.
pub struct RequestGate {
    min_interval: Duration,
    requests_per_minute: usize,
    clock: Box<dyn Clock>,
    last_request: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(min_interval: Duration, requests_per_minute: usize) -> Self {
        Self::with_clock(min_interval, requests_per_minute, Box::new(SystemClock))
    }

    pub fn with_clock(
        min_interval: Duration,
        requests_per_minute: usize,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            min_interval,
            requests_per_minute,
            clock,
            last_request: Mutex::new(None),
        }
    }

    pub fn requests_per_minute(&self) -> usize {
        self.requests_per_minute
    }

    pub fn try_acquire(&self, recent_requests: usize) -> Decision {
        let now = self.clock.now();
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.min_interval {
                return Decision::RetryAfter(self.min_interval - elapsed);
            }
        }

        if recent_requests >= self.requests_per_minute {
            return Decision::CeilingExceeded;
        }

        *last = Some(now);
        Decision::Ready
    }

    /// Waits out the minimum interval; the per-minute ceiling is a hard
    /// reject so the caller can surface a quota message instead of stalling.
    pub async fn acquire(&self, recent_requests: usize) -> Result<()> {
        loop {
            match self.try_acquire(recent_requests) {
                Decision::Ready => return Ok(()),
                Decision::RetryAfter(wait) => tokio::time::sleep(wait).await,
                Decision::CeilingExceeded => {
                    return Err(LearningOsError::Quota(format!(
                        "{recent_requests} requests in the last minute (limit {})",
                        self.requests_per_minute
                    )))
                }
            }
        }
    }
}
