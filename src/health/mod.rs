// src/health/mod.rs
mod cache;
mod checker;
mod probe;
mod status;

pub use checker::{CompositeChecker, LAST_CHECK_TOOK, LAST_CHECK_TS};
pub use probe::{Checker, CheckerFn};
pub use status::{Health, Status, STATUS_KEY};
