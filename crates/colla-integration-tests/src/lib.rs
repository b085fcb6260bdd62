//! Integration test crate for the collateral oracle and reward router.
//!
//! This crate has no library code. It only contains integration tests
//! that exercise end-to-end flows across multiple workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p colla-integration-tests
//! ```
