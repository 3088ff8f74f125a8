#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared setup for the integration tests. Mocks live in the
//! `narrativelens-test-utils` crate.

use dotenvy::dotenv;
use narrativelens::orchestrator::RetryPolicy;
use std::sync::Once;
use std::time::Duration;

#[cfg(test)]
static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
#[cfg(test)]
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        tracing_subscriber::fmt::init();
    });
}

/// A retry policy that never sleeps.
pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::ZERO,
    }
}
