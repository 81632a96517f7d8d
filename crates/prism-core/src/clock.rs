//! Time and randomness sources.
//!
//! Conversation identifiers and summary timestamps come from a [`Clock`],
//! generation seeds from a [`SeedSource`]. Both are traits so tests can pin
//! them.

use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Produces seeds for image generation requests.
pub trait SeedSource: Send + Sync {
    fn next_seed(&self) -> i64;
}

/// Uniform random seed in `0..=i32::MAX`, the range image endpoints accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSeedSource;

impl SeedSource for RandomSeedSource {
    fn next_seed(&self) -> i64 {
        rand::thread_rng().gen_range(0..=i64::from(i32::MAX))
    }
}

/// Always returns the same seed.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeedSource(pub i64);

impl SeedSource for FixedSeedSource {
    fn next_seed(&self) -> i64 {
        self.0
    }
}
