//! Token-bucket admission control shared by every inbound request.
//!
//! The bucket holds at most `rate` tokens and refills at `rate` tokens per
//! second, so a full bucket admits a burst of `rate` requests. Throttling is
//! best-effort: a caller that cannot get a token before its deadline is let
//! through anyway.

use log::debug;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{self, Duration, Instant};

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Outcome of [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was taken, possibly after waiting.
    Admitted,
    /// No token could be had before the deadline. The caller proceeds
    /// unthrottled.
    Degraded,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last = now;
    }
}

/// A token taken ahead of time by a waiting caller. Dropping it before the
/// wait completes hands the token back.
struct Reservation<'a> {
    limiter: &'a RateLimiter,
    armed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Rate limiter: waiter cancelled, returning its token");
            self.limiter.give_back();
        }
    }
}

pub struct RateLimiter {
    rate: f64,
    // never held across an await
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Limiter admitting `requests_per_second` with an equal burst. A rate of
    /// zero or less disables limiting.
    pub fn new(requests_per_second: i64) -> Self {
        let rate = requests_per_second.max(0) as f64;
        Self {
            rate,
            bucket: Mutex::new(Bucket {
                tokens: rate,
                last: Instant::now(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }

    fn bucket(&self) -> MutexGuard<'_, Bucket> {
        // the bucket is plain numbers, a panic elsewhere cannot leave it torn
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self) {
        let mut bucket = self.bucket();
        bucket.refill(Instant::now(), self.rate, self.rate);
        bucket.tokens = (bucket.tokens + 1.0).min(self.rate);
    }

    /// Wait for a token until `deadline`.
    ///
    /// When the next token would only arrive after `deadline` this returns
    /// [`Admission::Degraded`] straight away and leaves the bucket untouched.
    /// If the returned future is dropped while waiting, the token it had
    /// reserved goes back to the bucket.
    pub async fn acquire(&self, deadline: Instant) -> Admission {
        if !self.is_enabled() {
            return Admission::Admitted;
        }

        let ready_at = {
            let mut bucket = self.bucket();
            let now = Instant::now();
            bucket.refill(now, self.rate, self.rate);

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Admission::Admitted;
            }

            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate);
            let ready_at = now + wait;
            if ready_at > deadline {
                return Admission::Degraded;
            }
            // reserve now, the debt is paid back by refill
            bucket.tokens -= 1.0;
            ready_at
        };

        let reservation = Reservation {
            limiter: self,
            armed: true,
        };
        debug!("Rate limiter: waiting {:?} for admission", ready_at.saturating_duration_since(Instant::now()));
        time::sleep_until(ready_at).await;
        reservation.commit();
        Admission::Admitted
    }

    /// Wait at most `timeout` for a token.
    pub async fn acquire_within(&self, timeout: Duration) -> Admission {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        self.acquire(deadline).await
    }
}
