//! # harcall - a traced, archiving HTTP call wrapper
//!
//! harcall wraps outbound HTTP calls so that every request produces three
//! things: the HTTP response, a structured, replayable HTTP-archive (HAR)
//! [`har::Entry`] of the exchange, and a correlated pair of distributed-
//! tracing spans: one in a generic tracer, one in an archive-specific
//! tracer. Spans are opened before dispatch, injected into the outbound
//! headers, tagged with the outcome, and guaranteed to close on every exit
//! path.
//!
//! ## Quick Start
//!
//! ```no_run
//! use harcall::{Client, ExecutionContext};
//! use harcall::har::NameValuePair;
//! use http::Method;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), harcall::Error> {
//!     let client = Client::builder()
//!         .timeout(Duration::from_secs(15))
//!         .default_header("x-api-key", "pippo")
//!         .trace_group_name("rest-client")
//!         .trace_request_name("rest-client-{op-name}")
//!         .build()?;
//!
//!     let request = client.new_request(
//!         Method::POST,
//!         "http://localhost:3001/api/v1/tokens",
//!         br#"{"msg":"hello world"}"#,
//!         &[NameValuePair::new("Content-type", "application/json")],
//!         &[],
//!     )?;
//!
//!     let ctx = ExecutionContext::new()
//!         .with_op_name("create-token")
//!         .with_request_id("req-1");
//!
//!     match client.execute(&request, ctx).await {
//!         Ok(entry) => {
//!             println!("status {}", entry.response.status);
//!             println!("{}", serde_json::to_string_pretty(&entry).unwrap());
//!         }
//!         Err(failure) => {
//!             // the archive entry is complete even when the transport failed
//!             eprintln!("{failure}");
//!             eprintln!("recorded: {}", failure.entry.response.status_text);
//!         }
//!     }
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Archive-grade records** - Every call yields a complete HAR entry
//!   (request + response + timings), success or failure
//! - **Dual tracing** - A generic tracer and an archive tracer, both
//!   injected at construction time, both propagated as outbound headers
//! - **Failure classification** - Transport errors become inspectable
//!   HTTP-like status pairs (408 on timeout, 503 on refused/reset/DNS)
//!   instead of opaque failures
//! - **Retry predicates** - An allow-list based predicate drives the
//!   transport's retry loop; the orchestrator itself never retries
//! - **Structured logging** - `tracing` events throughout
//!
//! ## Error Handling
//!
//! Application-level 4xx/5xx responses are not errors here: they are
//! recorded exchanges, returned as entries. Only transport-level failures
//! surface as [`TransportFailure`], and even those carry the full entry.

mod client;
pub mod config;
pub mod context;
mod error;
pub mod har;
pub mod hartrace;
pub mod retry;
pub mod status;
pub mod trace;
mod transport;

pub use client::{Client, ClientBuilder, LinkedService};
pub use config::{Config, Header};
pub use context::ExecutionContext;
pub use error::{Error, Result, TransportFailure};
pub use retry::{RetryOnStatusList, RetryPredicate};
