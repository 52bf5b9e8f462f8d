//! Rate limiting for webhook progress delivery

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits webhook posts to one per interval per stage.
///
/// The opening `(0, total)` and closing `(total, total)` reports of a stage
/// always pass.
#[derive(Debug)]
pub struct WebhookThrottle {
    interval: Duration,
    last_sent: HashMap<String, Instant>,
}

impl WebhookThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// Decide whether this report goes out, recording it if so
    pub fn should_send(&mut self, stage: &str, current: u64, total: u64, now: Instant) -> bool {
        let boundary = current == 0 || current >= total;
        let due = match self.last_sent.get(stage) {
            Some(last) => now.saturating_duration_since(*last) >= self.interval,
            None => true,
        };

        if boundary || due {
            self.last_sent.insert(stage.to_string(), now);
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
    fn test_first_and_last_always_pass() {
        let mut throttle = WebhookThrottle::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let sent: Vec<u64> = (0..=10)
            .filter(|&n| throttle.should_send("pages", n, 10, t0))
            .collect();
        assert_eq!(sent, vec![0, 10]);
    }

    #[test]
    fn test_interval_per_stage() {
        let mut throttle = WebhookThrottle::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(throttle.should_send("ocr", 0, 100, t0));
        assert!(!throttle.should_send("ocr", 1, 100, t0 + Duration::from_millis(100)));
        assert!(throttle.should_send("ocr", 2, 100, t0 + Duration::from_millis(500)));

        // A different stage has its own clock
        assert!(throttle.should_send("layout", 3, 100, t0 + Duration::from_millis(600)));
        assert!(!throttle.should_send("ocr", 4, 100, t0 + Duration::from_millis(700)));
    }
}
