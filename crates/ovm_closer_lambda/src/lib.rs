//! AWS-oriented adapters and handlers for member-account closure.
//!
//! This crate owns runtime integration details (the Lambda entry point,
//! adapter seams for the record store, secret store, console automation,
//! and role probe) and exposes a single runtime module boundary for the
//! domain contract and failure classifiers.

pub mod adapters;
pub mod handlers;
pub mod runtime;
