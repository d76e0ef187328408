// =============================================================================
// Token Bucket Rate Limiter — per-connection outbound guardrail
// =============================================================================
//
// One bucket per connection, shared across all of that connection's
// subscriptions. Refills continuously rather than in discrete per-second
// ticks, so a burst right after a quiet period isn't unfairly throttled.
// =============================================================================

use std::time::Instant;

pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: u32) -> Self {
        let rate = rate_per_sec as f64;
        Self { capacity: rate, tokens: rate, refill_per_sec: rate, last_refill: Instant::now() }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token if available. Returns `false` if the bucket is empty.
    pub fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_up_to_capacity_then_blocks() {
        let mut bucket = TokenBucket::new(3);
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }

    #[test]
    fn refills_over_time() {
        let mut bucket = TokenBucket::new(1000);
        for _ in 0..1000 {
            assert!(bucket.try_take());
        }
        assert!(!bucket.try_take());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(bucket.try_take());
    }
}
