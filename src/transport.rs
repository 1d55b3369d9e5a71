//! The HTTP engine boundary.
//!
//! [`Transport`] owns the `reqwest` client plus everything the orchestrator
//! delegates: per-method dispatch, timeout and TLS handling, and the retry
//! loop driven by the configured count, wait bounds and
//! [`RetryPredicate`](crate::retry::RetryPredicate). The orchestrator above
//! never retries; by the time `dispatch` returns, retries have happened or
//! were declined.

use crate::config::Config;
use crate::error::Error;
use crate::retry::{RetryOnStatusList, RetryPredicate};
use crate::status;
use http::{HeaderMap, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(100);
const DEFAULT_RETRY_MAX_WAIT: Duration = Duration::from_secs(2);

/// A fully read response from one dispatch.
#[derive(Debug, Clone)]
pub(crate) struct TransportResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A failed dispatch. `status` is set when a response head was observed
/// before the failure (e.g. the body read broke off), so classification can
/// prefer the real status over a synthesized one.
#[derive(Debug)]
pub(crate) struct DispatchError {
    pub status: Option<StatusCode>,
    pub source: Error,
}

pub(crate) struct Transport {
    http: reqwest::Client,
    retry_count: u32,
    retry_wait: Duration,
    retry_max_wait: Duration,
    predicate: Option<Arc<dyn RetryPredicate>>,
}

impl Transport {
    pub fn new(cfg: &Config) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
            tracing::trace!(timeout_ms = timeout.as_millis() as u64, "transport timeout set");
        }
        if cfg.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
            tracing::trace!("TLS certificate verification disabled");
        }
        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        let predicate: Option<Arc<dyn RetryPredicate>> = if cfg.retry_on_http_errors.is_empty() {
            None
        } else {
            tracing::trace!(statuses = ?cfg.retry_on_http_errors, "retry allow-list installed");
            Some(Arc::new(RetryOnStatusList::new(
                cfg.retry_on_http_errors.clone(),
            )))
        };

        Ok(Self {
            http,
            retry_count: cfg.retry_count,
            retry_wait: cfg.retry_wait.unwrap_or(DEFAULT_RETRY_WAIT),
            retry_max_wait: cfg.retry_max_wait.unwrap_or(DEFAULT_RETRY_MAX_WAIT),
            predicate,
        })
    }

    /// Sends the request, retrying per the configured predicate and budget,
    /// and reads the response body to completion.
    pub async fn dispatch(
        &self,
        method: &str,
        url: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, DispatchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = self
                .send_once(method, url, headers.clone(), body.clone())
                .await;

            if attempt > self.retry_count {
                return outcome;
            }

            let (observed_status, error) = match &outcome {
                Ok(resp) => (Some(resp.status), None),
                Err(err) => (err.status, Some(&err.source)),
            };
            let retry = match &self.predicate {
                Some(predicate) => predicate.should_retry(observed_status, error),
                // without an allow-list, only transport errors are retried
                None => error.is_some(),
            };
            if !retry {
                return outcome;
            }

            let delay = self.backoff(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                method,
                url,
                "retrying request after delay"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(
        &self,
        method: &str,
        url: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, DispatchError> {
        let method = match method {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            other => {
                return Err(DispatchError {
                    status: None,
                    source: Error::UnsupportedMethod(other.to_owned()),
                })
            }
        };

        tracing::debug!(method = %method, url, "dispatching HTTP request");

        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| DispatchError {
            status: None,
            source: e.into(),
        })?;

        let status = response.status();
        let status_text = status::reason(status);
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| DispatchError {
            status: Some(status),
            source: e.into(),
        })?;

        Ok(TransportResponse {
            status,
            status_text,
            headers,
            body: body.to_vec(),
        })
    }

    /// Exponential backoff clamped to the configured wait bounds.
    fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_wait
            .saturating_mul(multiplier)
            .min(self.retry_max_wait)
    }
}
