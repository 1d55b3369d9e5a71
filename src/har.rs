//! HTTP Archive (HAR) data model.
//!
//! These types describe one recorded HTTP exchange (request, response and
//! timings) using the HAR field naming convention, so a serialized [`Entry`]
//! can be dropped straight into the `entries` array of a persisted HAR file.
//!
//! Size fields use `-1` to mean "not computed", never "zero". Header lists
//! preserve insertion order and allow duplicate names, which is why they are
//! plain `Vec<NameValuePair>` rather than a map.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Sentinel for timing phases that were not measured.
pub const NOT_MEASURED: f64 = -1.0;

/// Sentinel for sizes that were not computed.
pub const SIZE_UNKNOWN: i64 = -1;

/// A single name/value pair, used for headers and query strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValuePair {
    pub name: String,
    pub value: String,
}

impl NameValuePair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A posted parameter, carried inside [`PostData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

/// The body of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    pub mime_type: String,
    /// Raw body bytes, serialized as the HAR `text` field.
    #[serde(rename = "text", with = "lossy_text")]
    pub data: Vec<u8>,
    pub params: Vec<Param>,
}

/// A cookie attached to a request or response.
///
/// The request builder always initializes cookie lists to empty; the type
/// exists so serialized entries carry the conventional HAR shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// The request half of an archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub cookies: Vec<Cookie>,
    pub headers: Vec<NameValuePair>,
    pub query_string: Vec<NameValuePair>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub post_data: Option<PostData>,
    pub headers_size: i64,
    pub body_size: i64,
}

impl Request {
    /// Returns `true` if the request carries a non-empty body.
    pub fn has_body(&self) -> bool {
        self.post_data.as_ref().is_some_and(|p| !p.data.is_empty())
    }
}

/// The payload of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub size: i64,
    pub mime_type: String,
    /// Raw body bytes, serialized as the HAR `text` field.
    #[serde(rename = "text", with = "lossy_text")]
    pub data: Vec<u8>,
}

/// The response half of an archive entry.
///
/// Present on every entry: when the transport fails before a response is
/// received, a synthesized `text/plain` response is recorded instead (see
/// [`Response::error_body`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub cookies: Vec<Cookie>,
    pub headers: Vec<NameValuePair>,
    pub content: Content,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    pub headers_size: i64,
    pub body_size: i64,
}

impl Response {
    /// Builds the synthesized response recorded when no real response exists,
    /// with the classified status/text pair and the error message as body.
    pub fn error_body(status: u16, status_text: &str, mime_type: &str, body: &[u8]) -> Self {
        Self {
            status,
            status_text: status_text.to_owned(),
            http_version: "1.1".to_owned(),
            cookies: Vec::new(),
            headers: Vec::new(),
            content: Content {
                size: body.len() as i64,
                mime_type: mime_type.to_owned(),
                data: body.to_vec(),
            },
            redirect_url: String::new(),
            headers_size: SIZE_UNKNOWN,
            body_size: body.len() as i64,
        }
    }
}

/// Per-phase timing breakdown of one exchange.
///
/// Only the total wall time is actually measured; it is recorded under
/// `wait`, and every finer-grained phase is fixed at [`NOT_MEASURED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub blocked: f64,
    pub dns: f64,
    pub connect: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
    pub ssl: f64,
}

impl Timings {
    /// Timings block where only the total wall time is known.
    pub fn total_only(wait_ms: f64) -> Self {
        Self {
            blocked: NOT_MEASURED,
            dns: NOT_MEASURED,
            connect: NOT_MEASURED,
            send: NOT_MEASURED,
            wait: wait_ms,
            receive: NOT_MEASURED,
            ssl: NOT_MEASURED,
        }
    }
}

/// One recorded HTTP exchange.
///
/// Every entry holds exactly one request and exactly one response, even when
/// the call failed at the transport. `comment` carries the caller-supplied
/// request id for correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub comment: String,
    /// ISO-8601 start timestamp.
    pub started_date_time: String,
    /// Raw start time, kept for latency math; not part of the wire format.
    #[serde(skip)]
    pub started: Option<Instant>,
    /// Total elapsed time in milliseconds.
    pub time: f64,
    pub request: Request,
    pub response: Response,
    pub timings: Timings,
}

mod lossy_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}
