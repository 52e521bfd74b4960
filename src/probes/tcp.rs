// src/probes/tcp.rs
use crate::health::{Checker, Health};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Reports `UP` when a TCP connection to `addr` opens within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpChecker {
    pub addr: String,
    pub timeout: Duration,
}

impl TcpChecker {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Checker for TcpChecker {
    async fn check(&self) -> Health {
        let mut health = Health::new();
        health.add_info("addr", self.addr.as_str());

        match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_stream)) => {
                health.up();
            }
            Ok(Err(e)) => {
                debug!("TCP check of {} failed: {}", self.addr, e);
                health.down().add_info("error", e.to_string());
            }
            Err(_) => {
                debug!("TCP check of {} timed out", self.addr);
                health.down().add_info("error", "connection timeout");
            }
        }

        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let health = TcpChecker::new(addr.clone(), Duration::from_secs(1)).check().await;

        assert!(health.is_up());
        assert_eq!(health.get_info("addr").unwrap(), addr.as_str());
    }

    #[tokio::test]
    async fn test_closed_port_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let health = TcpChecker::new(addr, Duration::from_secs(1)).check().await;

        assert!(health.is_down());
        assert!(health.get_info("error").is_some());
    }
}
