// src/lib.rs
//! Composable health-check aggregation.
//!
//! Register [`health::Checker`]s on a [`health::CompositeChecker`], then either
//! call `check()` directly or `start()` background refresh and read the cached
//! record. Concrete TCP and URL probes live in [`probes`].
pub mod config;
pub mod health;
pub mod probes;
pub mod server;
