//! Traced HTTP client.
//!
//! The [`Client`] type is the request-execution orchestrator: it builds
//! archive-shaped requests, opens a per-call span in each of the two tracing
//! systems, injects both contexts into the outbound headers, dispatches
//! through the transport, and turns the outcome, success or transport
//! failure, into a fully populated archive [`Entry`]. Spans are closed on
//! every exit path via drop guards.
//!
//! Use [`ClientBuilder`] (or a [`LinkedService`]) to configure and create
//! clients.

use crate::config::{
    Config, Header, ERROR_MESSAGE_TAG, ERROR_TAG, HAR_SPAN_ID_TAG, HTTP_METHOD_TAG,
    HTTP_STATUS_CODE_TAG, HTTP_URL_TAG, LRA_ID_TAG, OP_NAME_PLACEHOLDER, OP_NAME_TAG,
    REQUEST_ID_PLACEHOLDER, REQUEST_ID_TAG,
};
use crate::context::ExecutionContext;
use crate::error::{Error, Result, TransportFailure};
use crate::har::{Content, Entry, NameValuePair, Param, PostData, Request, Response, Timings, SIZE_UNKNOWN};
use crate::hartrace::{HarSpan, HarSpanGuard, HarTracer};
use crate::status;
use crate::trace::{NoopTracer, Span, SpanGuard, TagValue, Tracer};
use crate::transport::Transport;
use chrono::{SecondsFormat, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const HTTP_VERSION: &str = "1.1";
const DEFAULT_BODY_MIME_TYPE: &str = "application/json";
const ERROR_BODY_MIME_TYPE: &str = "text/plain";

/// One configured upstream service, from which clients are minted.
///
/// The configuration is read-only once the service is built; every client
/// takes its own snapshot.
#[derive(Debug, Clone)]
pub struct LinkedService {
    cfg: Config,
}

impl LinkedService {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Starts a client builder seeded with this service's configuration.
    pub fn client(&self) -> ClientBuilder {
        ClientBuilder::from_config(self.cfg.clone())
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Mutators adjust a private copy of the configuration; once `build` runs,
/// the client's snapshot is immutable.
///
/// # Examples
///
/// ```no_run
/// use harcall::Client;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), harcall::Error> {
/// let client = Client::builder()
///     .timeout(Duration::from_secs(15))
///     .default_header("x-api-key", "pippo")
///     .trace_group_name("rest-client")
///     .trace_request_name("rest-client-{op-name}")
///     .retry_count(2)
///     .retry_wait(Duration::from_millis(100))
///     .retry_on_http_errors(vec![502, 503])
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    cfg: Config,
    tracer: Option<Arc<dyn Tracer>>,
    har_tracer: Option<Arc<dyn HarTracer>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::from_config(Config::default())
    }

    pub fn from_config(cfg: Config) -> Self {
        Self {
            cfg,
            tracer: None,
            har_tracer: None,
        }
    }

    /// Sets the per-request timeout enforced by the transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.cfg.timeout = Some(timeout);
        self
    }

    /// Skips TLS certificate verification.
    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.cfg.skip_verify = skip;
        self
    }

    /// Appends a default header included in every built request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cfg.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Names the client-level span. Setting this makes the client start and
    /// own a group span.
    pub fn trace_group_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.trace_group_name = name.into();
        self
    }

    /// Template for per-request span names; see
    /// [`OP_NAME_PLACEHOLDER`] and [`REQUEST_ID_PLACEHOLDER`].
    pub fn trace_request_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.trace_request_name = name.into();
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.cfg.retry_count = count;
        self
    }

    pub fn retry_wait(mut self, wait: Duration) -> Self {
        self.cfg.retry_wait = Some(wait);
        self
    }

    pub fn retry_max_wait(mut self, wait: Duration) -> Self {
        self.cfg.retry_max_wait = Some(wait);
        self
    }

    /// Allow-list of status codes the retry predicate treats as retriable.
    pub fn retry_on_http_errors(mut self, statuses: Vec<u16>) -> Self {
        self.cfg.retry_on_http_errors = statuses;
        self
    }

    pub fn har_tracing_enabled(mut self, enabled: bool) -> Self {
        self.cfg.har_tracing_enabled = enabled;
        self
    }

    /// Externally supplied parent for the client-level span. The client will
    /// never finish it.
    pub fn group_span(mut self, span: Arc<dyn Span>) -> Self {
        self.cfg.span = Some(span);
        self
    }

    /// Externally supplied archive-tracing parent. Never finished here.
    pub fn har_group_span(mut self, span: Arc<dyn HarSpan>) -> Self {
        self.cfg.har_span = Some(span);
        self
    }

    /// Injects the generic tracing back-end. Defaults to a no-op tracer.
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Injects the archive-tracing back-end. Archive tracing stays off
    /// unless both a back-end and the enable flag are set.
    pub fn har_tracer(mut self, tracer: Arc<dyn HarTracer>) -> Self {
        self.har_tracer = Some(tracer);
        self
    }

    /// Builds the configured [`Client`].
    pub fn build(self) -> Result<Client> {
        let transport = Transport::new(&self.cfg)?;
        let tracer = self.tracer.unwrap_or_else(|| Arc::new(NoopTracer));

        // A configured group name means the client starts its own span (as a
        // child of a supplied parent, if any) and must finish it on close.
        // Otherwise any supplied span is borrowed and left open.
        let (span, span_owned) = if self.cfg.trace_group_name.is_empty() {
            (self.cfg.span.clone(), false)
        } else {
            let parent = self.cfg.span.as_ref().map(|s| s.context());
            (
                Some(tracer.start_span(&self.cfg.trace_group_name, parent.as_ref())),
                true,
            )
        };

        let har_span = self.cfg.har_span.clone();

        Ok(Client {
            cfg: self.cfg,
            transport,
            tracer,
            har_tracer: self.har_tracer,
            span,
            span_owned,
            har_span,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A traced HTTP client bound to one linked service.
///
/// Safe to share across concurrent callers: the configuration snapshot is
/// read-only, and all per-call state lives in the [`ExecutionContext`] and
/// the records built during a single `execute`.
///
/// # Examples
///
/// ```no_run
/// use harcall::{Client, ExecutionContext};
/// use http::Method;
///
/// # async fn example() -> Result<(), harcall::Error> {
/// let client = Client::builder().build()?;
///
/// let request = client.new_request(
///     Method::GET,
///     "http://localhost:3001/api/v1/tokens",
///     b"",
///     &[],
///     &[],
/// )?;
///
/// let ctx = ExecutionContext::new()
///     .with_op_name("list-tokens")
///     .with_request_id("req-1");
///
/// match client.execute(&request, ctx).await {
///     Ok(entry) => println!("status {}", entry.response.status),
///     // the archive entry is complete even when the transport failed
///     Err(failure) => eprintln!("{}: {}", failure, failure.entry.response.status_text),
/// }
///
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct Client {
    cfg: Config,
    transport: Transport,
    tracer: Arc<dyn Tracer>,
    har_tracer: Option<Arc<dyn HarTracer>>,
    /// Client-level span; owned iff a trace-group name was configured.
    span: Option<Arc<dyn Span>>,
    span_owned: bool,
    /// Archive-tracing parent; never owned, always closed elsewhere.
    har_span: Option<Arc<dyn HarSpan>>,
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Closes the client, finishing the group span if this client started
    /// it. Consuming `self` makes "call exactly once" a compile-time fact.
    pub fn close(self) {
        if self.span_owned {
            if let Some(span) = &self.span {
                span.finish();
            }
        }
    }

    fn har_tracing_enabled(&self) -> bool {
        self.cfg.har_tracing_enabled && self.har_tracer.is_some()
    }

    /// Assembles an archive-shaped request record.
    ///
    /// Configured default headers come first, then `headers`, in order and
    /// without deduplication. The last content-type seen (case-insensitive)
    /// decides the post-data mime type; a non-empty body with no content
    /// type defaults to `application/json` for the post-data block only.
    /// An empty body yields no post-data block and leaves the body size
    /// unset. This step never fails under normal inputs; an unsupported
    /// method or a malformed URL is reported as an error, not a panic.
    pub fn new_request(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        headers: &[NameValuePair],
        params: &[NameValuePair],
    ) -> Result<Request> {
        match method.as_str() {
            "GET" | "HEAD" | "POST" | "PUT" | "DELETE" => {}
            other => return Err(Error::UnsupportedMethod(other.to_owned())),
        }
        Url::parse(url)?;

        let mut merged = Vec::with_capacity(self.cfg.headers.len() + headers.len());
        let mut content_type = String::new();
        for h in &self.cfg.headers {
            merged.push(NameValuePair::new(&h.name, &h.value));
            if h.name.eq_ignore_ascii_case("content-type") {
                content_type = h.value.clone();
            }
        }
        for h in headers {
            merged.push(h.clone());
            if h.name.eq_ignore_ascii_case("content-type") {
                content_type = h.value.clone();
            }
        }

        let (post_data, body_size) = if body.is_empty() {
            (None, SIZE_UNKNOWN)
        } else {
            let mime_type = if content_type.is_empty() {
                DEFAULT_BODY_MIME_TYPE.to_owned()
            } else {
                content_type
            };
            let params = params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    value: p.value.clone(),
                })
                .collect();
            (
                Some(PostData {
                    mime_type,
                    data: body.to_vec(),
                    params,
                }),
                body.len() as i64,
            )
        };

        Ok(Request {
            method: method.to_string(),
            url: url.to_owned(),
            http_version: HTTP_VERSION.to_owned(),
            cookies: Vec::new(),
            headers: merged,
            query_string: Vec::new(),
            post_data,
            headers_size: SIZE_UNKNOWN,
            body_size,
        })
    }

    /// Executes the request and records the exchange.
    ///
    /// On transport success (including 4xx/5xx statuses from a reachable
    /// server) returns the archive entry. On transport failure the error
    /// is classified into an HTTP-like status, a `text/plain` response is
    /// synthesized, and the complete entry travels inside the returned
    /// [`TransportFailure`]: callers always get a full record.
    pub async fn execute(
        &self,
        req_def: &Request,
        exec_ctx: ExecutionContext,
    ) -> std::result::Result<Entry, TransportFailure> {
        let started_at = Instant::now();
        let started_date_time = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let span_name = self.request_span_name(&exec_ctx);
        let req_span = self.start_request_span(exec_ctx.span.as_ref(), &span_name);
        // guards declared request-first so the har span (declared below,
        // dropped first) finishes before the request span
        let _req_span_guard = SpanGuard::new(req_span.clone());

        let mut har_span: Option<Arc<dyn HarSpan>> = None;
        let mut _har_span_guard: Option<HarSpanGuard> = None;
        if self.har_tracing_enabled() {
            if let Some(har_tracer) = &self.har_tracer {
                let span = self.start_har_span(har_tracer.as_ref(), exec_ctx.har_span.as_ref());
                _har_span_guard = Some(HarSpanGuard::new(span.clone()));
                req_span.set_tag(HAR_SPAN_ID_TAG, TagValue::Str(span.id()));
                har_span = Some(span);
            }
        }

        // trace contexts first, then the record's own headers layered on top
        let mut headers = HeaderMap::new();
        self.tracer.inject(&req_span.context(), &mut headers);
        if let (Some(har_tracer), Some(span)) = (&self.har_tracer, &har_span) {
            har_tracer.inject(&span.context(), &mut headers);
        }
        for h in &req_def.headers {
            match (
                HeaderName::try_from(h.name.as_str()),
                HeaderValue::try_from(h.value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %h.name, "skipping malformed header"),
            }
        }

        // only POST and PUT carry a body
        let body = match req_def.method.as_str() {
            "POST" | "PUT" if req_def.has_body() => {
                req_def.post_data.as_ref().map(|p| p.data.clone())
            }
            _ => None,
        };

        let outcome = self
            .transport
            .dispatch(&req_def.method, &req_def.url, headers, body)
            .await;

        let (response, failure) = match outcome {
            Ok(resp) => {
                let mut response_headers = Vec::with_capacity(resp.headers.len());
                for (name, value) in resp.headers.iter() {
                    response_headers.push(NameValuePair::new(
                        name.as_str(),
                        value.to_str().unwrap_or_default(),
                    ));
                }
                let mime_type = resp
                    .headers
                    .get(http::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                let body_size = resp.body.len() as i64;
                let response = Response {
                    status: resp.status.as_u16(),
                    status_text: resp.status_text,
                    http_version: HTTP_VERSION.to_owned(),
                    cookies: Vec::new(),
                    headers: response_headers,
                    content: Content {
                        size: body_size,
                        mime_type,
                        data: resp.body,
                    },
                    redirect_url: String::new(),
                    headers_size: SIZE_UNKNOWN,
                    body_size,
                };
                (response, None)
            }
            Err(dispatch_err) => {
                if let Some(observed) = dispatch_err.status {
                    // a response head arrived before the failure; its status
                    // drives classification, the body stays synthesized
                    tracing::warn!(
                        status = observed.as_u16(),
                        "transport error with a response present; classifying from the observed status"
                    );
                }
                let (status, status_text) =
                    status::classify(dispatch_err.status, &dispatch_err.source);
                let message = format!(
                    "{} {}: {}",
                    status.as_u16(),
                    status_text,
                    dispatch_err.source
                );
                let response = Response::error_body(
                    status.as_u16(),
                    &status_text,
                    ERROR_BODY_MIME_TYPE,
                    message.as_bytes(),
                );
                (response, Some((status_text, dispatch_err.source)))
            }
        };

        self.set_span_tags(
            req_span.as_ref(),
            &exec_ctx,
            &req_def.url,
            &req_def.method,
            response.status,
            failure.as_ref().map(|(_, source)| source),
        );

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        let entry = Entry {
            comment: exec_ctx.request_id.clone(),
            started_date_time,
            started: Some(started_at),
            time: elapsed_ms,
            timings: Timings::total_only(elapsed_ms),
            request: req_def.clone(),
            response,
        };

        if let Some(span) = &har_span {
            span.add_entry(&entry);
        }

        match failure {
            None => Ok(entry),
            Some((status_text, source)) => Err(TransportFailure {
                status: entry.response.status,
                status_text,
                entry,
                source,
            }),
        }
    }

    /// Builds the per-request span name from the configured template, or
    /// falls back to `opname_requestid`. Each placeholder is substituted at
    /// most once and only when the corresponding value is non-empty.
    fn request_span_name(&self, exec_ctx: &ExecutionContext) -> String {
        if self.cfg.trace_request_name.is_empty() {
            return format!("{}_{}", exec_ctx.op_name, exec_ctx.request_id);
        }
        let mut name = self.cfg.trace_request_name.clone();
        if !exec_ctx.op_name.is_empty() {
            name = name.replacen(OP_NAME_PLACEHOLDER, &exec_ctx.op_name, 1);
        }
        if !exec_ctx.request_id.is_empty() {
            name = name.replacen(REQUEST_ID_PLACEHOLDER, &exec_ctx.request_id, 1);
        }
        name
    }

    /// Resolves the request span's parent and starts it.
    ///
    /// A per-call parent beats the client's group span; having both is a
    /// configuration conflict that is logged and resolved in the request
    /// parent's favor. With neither, the span is a root.
    fn start_request_span(
        &self,
        request_parent: Option<&Arc<dyn Span>>,
        name: &str,
    ) -> Arc<dyn Span> {
        let mut parent = self.span.as_ref();
        if let Some(req_parent) = request_parent {
            if parent.is_some() {
                tracing::warn!(
                    trace_group_name = %self.cfg.trace_group_name,
                    "configuration issue: a parent span was set on the request but a group span is also present; using the request parent"
                );
            }
            parent = Some(req_parent);
        }

        let parent_context = parent.map(|s| s.context());
        self.tracer.start_span(name, parent_context.as_ref())
    }

    /// Same parent-resolution rule as [`Self::start_request_span`], for the
    /// archive tracer.
    fn start_har_span(
        &self,
        tracer: &dyn HarTracer,
        request_parent: Option<&Arc<dyn HarSpan>>,
    ) -> Arc<dyn HarSpan> {
        let parent = request_parent.or(self.har_span.as_ref());
        let parent_context = parent.map(|s| s.context());
        let span = tracer.start_span(parent_context.as_ref());
        match parent {
            Some(parent) => tracing::trace!(
                span_id = %span.id(),
                parent_span_id = %parent.id(),
                "started a child har span"
            ),
            None => tracing::trace!(span_id = %span.id(), "started a new har span"),
        }
        span
    }

    fn set_span_tags(
        &self,
        span: &dyn Span,
        exec_ctx: &ExecutionContext,
        url: &str,
        method: &str,
        status: u16,
        error: Option<&Error>,
    ) {
        span.set_tag(HTTP_URL_TAG, TagValue::Str(url.to_owned()));
        span.set_tag(HTTP_METHOD_TAG, TagValue::Str(method.to_owned()));
        span.set_tag(HTTP_STATUS_CODE_TAG, TagValue::Int(i64::from(status)));

        if !exec_ctx.op_name.is_empty() {
            span.set_tag(OP_NAME_TAG, TagValue::Str(exec_ctx.op_name.clone()));
        }
        if !exec_ctx.lra_id.is_empty() {
            span.set_tag(LRA_ID_TAG, TagValue::Str(exec_ctx.lra_id.clone()));
        }
        if !exec_ctx.request_id.is_empty() {
            span.set_tag(REQUEST_ID_TAG, TagValue::Str(exec_ctx.request_id.clone()));
        }
        if let Some(error) = error {
            span.set_tag(ERROR_MESSAGE_TAG, TagValue::Str(error.to_string()));
            span.set_tag(ERROR_TAG, TagValue::Bool(true));
        }
    }
}
