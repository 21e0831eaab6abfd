//! # natsauth Testkit
//!
//! Testing utilities for natsauth.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: An engine over a memory store plus declared-state builders
//! - **Generators**: Proptest strategies for keys, limits and permissions
//! - **Tracing**: A test-writer subscriber honouring `RUST_LOG`
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use natsauth_testkit::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     fixture.jwt_operator("root").await;
//!     fixture.account("prod", "root", 100).await;
//!
//!     let report = fixture.settle().await;
//!     assert!(report.all_ready());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use natsauth_testkit::generators::AccountParams;
//!
//! proptest! {
//!     #[test]
//!     fn claims_are_deterministic(params: AccountParams) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{account_spec, publish_permissions, seeded_key_pair, TestFixture, TEST_NATS_URL};
pub use generators::AccountParams;

use tracing_subscriber::EnvFilter;

/// Install a subscriber writing to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
