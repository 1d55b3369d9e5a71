//! Retry predicates for transient failures.
//!
//! A predicate only decides *whether* an outcome should be retried; the
//! retry loop and backoff live at the transport boundary
//! ([`Transport`](crate::transport), driven by the configured retry count and
//! wait bounds).

use crate::error::Error;
use http::StatusCode;

/// Decides whether a call outcome should be retried.
///
/// Implementations must be pure: no side effects, and the same outcome must
/// always produce the same answer.
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the outcome should be retried.
    ///
    /// `status` is the observed status code, if any response was received;
    /// `error` is the transport error, if the call failed outright.
    fn should_retry(&self, status: Option<StatusCode>, error: Option<&Error>) -> bool;
}

/// Retries based on a configured allow-list of retriable status codes.
///
/// Permissive by default: an empty allow-list or any transport error always
/// retries. With a non-empty list and no transport error, the outcome is
/// retried iff the observed status is a member of the list. The only way to
/// disable retries entirely is to not configure a retry count.
///
/// # Examples
///
/// ```
/// use harcall::{RetryOnStatusList, RetryPredicate};
/// use http::StatusCode;
///
/// let predicate = RetryOnStatusList::new(vec![502, 503]);
/// assert!(predicate.should_retry(Some(StatusCode::SERVICE_UNAVAILABLE), None));
/// assert!(!predicate.should_retry(Some(StatusCode::INTERNAL_SERVER_ERROR), None));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryOnStatusList {
    statuses: Vec<u16>,
}

impl RetryOnStatusList {
    pub fn new(statuses: Vec<u16>) -> Self {
        Self { statuses }
    }
}

impl RetryPredicate for RetryOnStatusList {
    fn should_retry(&self, status: Option<StatusCode>, error: Option<&Error>) -> bool {
        if self.statuses.is_empty() || error.is_some() {
            tracing::trace!(has_error = error.is_some(), "retry condition satisfied");
            return true;
        }

        let retry = status.is_some_and(|sc| self.statuses.contains(&sc.as_u16()));
        tracing::trace!(
            status = status.map(|sc| sc.as_u16()),
            retry,
            "retry condition evaluated"
        );
        retry
    }
}
