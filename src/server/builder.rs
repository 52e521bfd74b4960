// src/server/builder.rs
use anyhow::{Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Service;

/// Builder so `main.rs` can inject the status handler (or any handler).
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// being served are left to finish on their own tasks.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;

        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        tracing::info!("HTTP server listening on {}", listener.local_addr()?);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            tracing::warn!(%err, "failed to accept connection");
                            if let Some(delay) = accept_backoff(&err) {
                                tokio::time::sleep(delay).await;
                            }
                            continue;
                        }
                    };
                    let svc = handler.clone();

                    tokio::spawn(async move {
                        if let Err(err) = Http::new().serve_connection(stream, svc).await {
                            tracing::warn!(%peer, %err, "connection error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("HTTP server stopped accepting connections");
                    return Ok(());
                }
            }
        }
    }
}

/// How long to pause after a failed `accept`. Errors tied to a single
/// connection are skipped at once; anything else (fd exhaustion and the
/// like) would fail again immediately, so back off briefly.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => None,
        _ => Some(Duration::from_millis(100)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckerFn, CompositeChecker, Health};
    use crate::server::StatusHandler;
    use std::sync::Arc;

    #[test]
    fn test_accept_backoff() {
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert_eq!(accept_backoff(&aborted), None);

        // EMFILE: too many open files.
        #[cfg(unix)]
        let exhausted = io::Error::from_raw_os_error(24);
        #[cfg(unix)]
        assert_eq!(accept_backoff(&exhausted), Some(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_missing_handler_is_an_error() {
        let builder: ServerBuilder<StatusHandler> = ServerBuilder::new(([127, 0, 0, 1], 0).into());
        assert!(builder.serve_until(async {}).await.is_err());
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();

        let mut checker = CompositeChecker::new();
        checker.add_checker(
            "probe",
            CheckerFn(|| {
                let mut health = Health::new();
                health.up();
                health
            }),
        );
        let handler = StatusHandler::new(Arc::new(checker), "/health");

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(
            ServerBuilder::new(addr)
                .with_handler(handler)
                .serve_until(async {
                    let _ = stop_rx.await;
                }),
        );

        let mut body = None;
        for _ in 0..50 {
            if let Ok(response) = reqwest::get(format!("http://{}/health", addr)).await {
                body = Some(response.text().await.unwrap());
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(body.as_deref(), Some(r#"{"probe":{"status":"UP"},"status":"UP"}"#));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
