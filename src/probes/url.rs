// src/probes/url.rs
use crate::health::{Checker, Health};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests `url` and reports `UP` when the response carries the expected
/// status code and, if configured, contains the expected body text.
#[derive(Debug, Clone)]
pub struct UrlChecker {
    pub url: Url,
    pub timeout: Duration,
    pub method: Method,
    pub expect_status_code: StatusCode,
    /// Disabled when `None`.
    pub expect_body_contains: Option<String>,
    client: Client,
}

impl UrlChecker {
    pub fn new(url: Url) -> Self {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            method: Method::GET,
            expect_status_code: StatusCode::OK,
            expect_body_contains: None,
            client: Client::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn expect_status_code(mut self, code: StatusCode) -> Self {
        self.expect_status_code = code;
        self
    }

    pub fn expect_body_contains(mut self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        self.expect_body_contains = (!needle.is_empty()).then_some(needle);
        self
    }

    /// Shares an existing client (and its connection pool) between probes.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl Checker for UrlChecker {
    async fn check(&self) -> Health {
        let mut health = Health::new();

        let result = self
            .client
            .request(self.method.clone(), self.url.clone())
            .timeout(self.timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                debug!("URL check of {} failed: {}", self.url, e);
                health
                    .down()
                    .add_info("code", StatusCode::BAD_REQUEST.as_u16())
                    .add_info("error", e.to_string());
                return health;
            }
        };

        let status = response.status();
        if status != self.expect_status_code {
            health
                .down()
                .add_info("code", status.as_u16())
                .add_info("expectedCode", self.expect_status_code.as_u16());
            return health;
        }
        health.up().add_info("code", status.as_u16());

        if let Some(needle) = &self.expect_body_contains {
            match response.text().await {
                Ok(body) if body.contains(needle.as_str()) => {}
                Ok(_) => {
                    health
                        .down()
                        .add_info("body", format!("does not contain: {}", needle));
                }
                Err(e) => {
                    health.down().add_info("error", e.to_string());
                }
            }
        }

        health
    }
}
