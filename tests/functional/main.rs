// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the admission registry.
//!
//! These tests drive complete admission reviews through
//! [`AdmissionRegistry::review`](capz_webhooks::AdmissionRegistry::review)
//! WITHOUT a live Kubernetes cluster. Sibling objects live in an in-memory
//! store that can be told to fail reads.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_machine_create_returns_patch
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Registry tests**: one request per test, checking the patch, the
//!   denial reason and the field paths named in the message
//! - **Scenario tests**: multi-step flows over a shared store, such as
//!   demoting and deleting system pools

#[path = "../common/mod.rs"]
mod common;
mod mock_store;
mod registry_tests;
mod scenario_tests;

// Re-export for use in tests
pub use mock_store::*;
