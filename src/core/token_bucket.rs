//! C1 — per-label rate-limit primitive.

use std::time::Instant;

use parking_lot::Mutex;

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// A single-resource token bucket. `allow(cost)` is the only mutator: it
/// refills based on elapsed wall-clock time, then atomically checks and
/// charges in one critical section so a denial never partially charges the
/// bucket.
pub struct TokenBucket {
    fill_rate: f64,
    capacity: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    /// Build a bucket starting at full capacity.
    #[must_use]
    pub fn new(fill_rate: f64, capacity: f64) -> Self {
        Self {
            fill_rate,
            capacity,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempt to charge `cost` tokens. Refills first, then admits only if
    /// the refilled balance covers `cost`; on denial nothing is charged.
    pub fn allow(&self, cost: f64) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.fill_rate).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Give back `amount` tokens, capped at capacity. Used to undo a charge
    /// when a multi-label admission check fails partway through, keeping
    /// the "charged for all labels, or none" guarantee.
    pub fn refund(&self, amount: f64) {
        let mut state = self.state.lock();
        state.tokens = (state.tokens + amount).min(self.capacity);
    }

    /// Current token balance, for observability/tests. Triggers a refill
    /// as a side effect, matching `allow`'s semantics.
    pub fn tokens(&self) -> f64 {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.fill_rate).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn denies_without_charging() {
        let bucket = TokenBucket::new(1.0, 1.0);
        assert!(bucket.allow(1.0));
        assert!(!bucket.allow(1.0));
        // A denied call must not have charged anything further.
        assert!(bucket.tokens() < 1.0);
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(100.0, 1.0);
        assert!(bucket.allow(1.0));
        sleep(Duration::from_millis(20));
        assert!(bucket.allow(1.0), "bucket should have refilled within 20ms at 100/s");
    }

    #[test]
    fn never_exceeds_capacity() {
        let bucket = TokenBucket::new(1000.0, 2.0);
        sleep(Duration::from_millis(50));
        assert!(bucket.tokens() <= 2.0);
    }
}
