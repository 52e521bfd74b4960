// src/server/handler.rs
use crate::health::CompositeChecker;
use hyper::header::{ALLOW, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Failed to serialize health: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to build response: {0}")]
    Response(#[from] hyper::http::Error),
}

/// Serves the aggregated health as JSON on a single path.
#[derive(Clone)]
pub struct StatusHandler {
    checker: Arc<CompositeChecker>,
    path: Arc<str>,
}

impl StatusHandler {
    pub fn new(checker: Arc<CompositeChecker>, path: impl Into<Arc<str>>) -> Self {
        Self {
            checker,
            path: path.into(),
        }
    }

    async fn respond(
        checker: Arc<CompositeChecker>,
        path: Arc<str>,
        req: Request<Body>,
    ) -> Result<Response<Body>, HandlerError> {
        if req.uri().path() != &*path {
            return Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("Not Found"))?);
        }

        if req.method() != Method::GET {
            return Ok(Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(ALLOW, "GET")
                .body(Body::empty())?);
        }

        let health = checker.check().await;
        let status = if health.is_up() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        let body = serde_json::to_vec(&health)?;

        tracing::debug!(status = %health.status(), "Served health");

        Ok(Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))?)
    }
}

impl Service<Request<Body>> for StatusHandler {
    type Response = Response<Body>;
    type Error = HandlerError;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let checker = self.checker.clone();
        let path = self.path.clone();
        Box::pin(async move {
            Self::respond(checker, path, req).await.map_err(|e| {
                tracing::error!(%e, "status handler error");
                e
            })
        })
    }
}
