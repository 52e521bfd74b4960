// src/probes/mod.rs
mod tcp;
mod url;

pub use self::tcp::TcpChecker;
pub use self::url::{UrlChecker, DEFAULT_TIMEOUT};
