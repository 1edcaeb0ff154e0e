//! # AS4 Engine Test Suite
//!
//! Unified test crate for cross-crate behavior:
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Shared key material, agreements, payloads,
//! │                     # loopback transport wiring send -> receive
//! └── integration/
//!     ├── scenarios.rs    # End-to-end exchange scenarios, security matrix
//!     ├── reliability.rs  # Retry, duplicate elimination, async receipts
//!     └── compression.rs  # Gzip round trips, wrong-compression fixture
//! ```
//!
//! Run with `cargo test -p as4-tests`.

pub mod fixtures;

mod integration;

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
