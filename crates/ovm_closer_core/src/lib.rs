//! Shared account-closure domain primitives.
//!
//! This crate owns the request, record, and secret contracts plus the
//! failure classifiers used by the vending-machine account closer. It
//! intentionally excludes AWS SDK, HTTP, and Lambda runtime concerns.

pub mod classify;
pub mod contract;
