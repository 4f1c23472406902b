//! The bucket module defines [TokenBucket], the admission primitive shared by both
//! limiting tiers.

use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

/// A token bucket with a fixed refill rate and burst capacity.
///
/// Refill is lazy: the tokens accrued since the previous check are added on each call to
/// [`TokenBucket::allow`], so a bucket owns no timer and is cheap to create per client.
///
/// # Thread Safety
///
/// The token count and refill instant live behind a single mutex, so concurrent callers on
/// the same bucket are linearized and can never admit more than `capacity` requests in a
/// burst. The critical section is a handful of float operations and never blocks on I/O.
#[derive(Debug)]
pub struct TokenBucket {
    refill_rate: f64,
    capacity: u32,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, refill_rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    /// Create a full bucket refilling `refill_rate` tokens per second up to `capacity`.
    ///
    /// # Example
    /// ```ignore
    /// // 5 requests per second, bursts of up to 10
    /// let bucket = TokenBucket::new(5.0, 10);
    /// assert!(bucket.allow());
    /// ```
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        Self::new_at(refill_rate, capacity, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`.
    pub fn new_at(refill_rate: f64, capacity: u32, now: Instant) -> Self {
        Self {
            refill_rate: refill_rate.max(0.0),
            capacity,
            state: Mutex::new(BucketState { tokens: f64::from(capacity), last_refill: now }),
        }
    }

    /// Take one token if available.
    ///
    /// Returns `false` immediately when the bucket is empty; a denial leaves the bucket
    /// untouched apart from the refill.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// [`TokenBucket::allow`] evaluated at an explicit instant.
    ///
    /// Instants older than the last refill add no tokens.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refill(now, self.refill_rate, f64::from(self.capacity));
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available right now, after applying the refill.
    pub fn available(&self) -> f64 {
        self.available_at(Instant::now())
    }

    pub fn available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.refill(now, self.refill_rate, f64::from(self.capacity));
        state.tokens
    }

    /// Configured refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Configured burst capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
