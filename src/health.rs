//! Gateway readiness flag
//!
//! Written by the federation engine (ready after the first successful
//! reload, not-ready again at shutdown), read by the `/health` handler.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct Health(AtomicBool);

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_transitions() {
        let health = Health::new();
        assert!(!health.ready());

        health.set_ready(true);
        assert!(health.ready());

        health.set_ready(false);
        assert!(!health.ready());
    }
}
