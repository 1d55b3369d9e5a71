//! Classification of transport failures into HTTP-like status pairs.
//!
//! When a call fails before any response is received, the archive entry
//! still needs a response record. [`classify`] maps the failure into a
//! `(status, text)` pair by structural inspection of the error: the mapping
//! is pure, so the same error category always yields the same pair.

use crate::error::Error;
use http::StatusCode;

/// Returns the standard reason phrase for a status code, or `Status NNN`
/// when the code has no canonical phrase.
pub fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Status {}", status.as_u16()))
}

/// Maps a failure into an HTTP-like `(status, text)` pair.
///
/// If a status code was already observed before the failure (e.g. the body
/// read failed after the head arrived), classification is a no-op: the known
/// status and its standard phrase win. Otherwise:
///
/// - timeouts become `408 Request Timeout`;
/// - network errors default to `503 Service Unavailable`, refined by the
///   failure kind found in the error's source chain: DNS resolution failures
///   yield `Unknown host`, an actively refused connection yields
///   `Connection refused`, a peer reset yields `Reset by peer`;
/// - anything unrecognized falls back to `500 Internal Server Error`.
pub fn classify(status: Option<StatusCode>, error: &Error) -> (StatusCode, String) {
    if let Some(status) = status {
        return (status, reason(status));
    }

    match error {
        Error::Network(err) if err.is_timeout() => {
            (StatusCode::REQUEST_TIMEOUT, reason(StatusCode::REQUEST_TIMEOUT))
        }
        Error::Network(err) => (StatusCode::SERVICE_UNAVAILABLE, refine_network_error(err)),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            reason(StatusCode::INTERNAL_SERVER_ERROR),
        ),
    }
}

/// Walks the error's source chain looking for the underlying I/O failure.
fn refine_network_error(error: &reqwest::Error) -> String {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return "Connection refused".to_owned(),
                std::io::ErrorKind::ConnectionReset => return "Reset by peer".to_owned(),
                _ => {}
            }
        }
        // DNS failures surface as resolver errors with no io::ErrorKind to
        // match on; fall back to inspecting the message.
        let message = err.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return "Unknown host".to_owned();
        }
        source = err.source();
    }
    reason(StatusCode::SERVICE_UNAVAILABLE)
}
