//! Integration tests using wiremock to simulate HTTP servers.

use harcall::config::HAR_SPAN_ID_TAG;
use harcall::har::NameValuePair;
use harcall::hartrace::{InMemoryHarTracer, HAR_TRACE_HEADER};
use harcall::trace::{Span, SpanContext, TagValue, Tracer, W3cTracer, TRACEPARENT_HEADER};
use harcall::{Client, Error, ExecutionContext};
use http::{HeaderMap, Method};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Tracer double counting span starts/finishes and recording tags.
#[derive(Clone, Default)]
struct CountingTracer {
    state: Arc<CountingState>,
}

#[derive(Default)]
struct CountingState {
    started: AtomicUsize,
    finished: AtomicUsize,
    tags: Mutex<Vec<(String, String)>>,
}

struct CountingSpan {
    context: SpanContext,
    state: Arc<CountingState>,
}

impl Span for CountingSpan {
    fn context(&self) -> SpanContext {
        self.context.clone()
    }

    fn set_tag(&self, key: &str, value: TagValue) {
        self.state
            .tags
            .lock()
            .unwrap()
            .push((key.to_owned(), value.to_string()));
    }

    fn finish(&self) {
        self.state.finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl Tracer for CountingTracer {
    fn start_span(&self, _name: &str, parent: Option<&SpanContext>) -> Arc<dyn Span> {
        let id = self.state.started.fetch_add(1, Ordering::SeqCst);
        Arc::new(CountingSpan {
            context: SpanContext {
                trace_id: parent
                    .map(|p| p.trace_id.clone())
                    .unwrap_or_else(|| "trace".to_owned()),
                span_id: format!("span-{id}"),
            },
            state: self.state.clone(),
        })
    }

    fn inject(&self, _context: &SpanContext, _headers: &mut HeaderMap) {}
}

impl CountingTracer {
    fn started(&self) -> usize {
        self.state.started.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.state.finished.load(Ordering::SeqCst)
    }

    fn tags(&self) -> Vec<(String, String)> {
        self.state.tags.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn post_against_reachable_server_records_the_exchange() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/tokens"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"))
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();

    let request = client
        .new_request(
            Method::POST,
            &format!("{}/api/v1/tokens", mock_server.uri()),
            br#"{"msg":"hello world"}"#,
            &[
                NameValuePair::new("Content-type", "application/json"),
                NameValuePair::new("Accept", "application/json"),
            ],
            &[],
        )
        .unwrap();

    assert_eq!(
        request.post_data.as_ref().unwrap().mime_type,
        "application/json"
    );

    let ctx = ExecutionContext::new()
        .with_op_name("create-token")
        .with_request_id("req-1");
    let entry = client.execute(&request, ctx).await.unwrap();

    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.status_text, "OK");
    assert_eq!(entry.response.content.data, br#"{"ok":true}"#.to_vec());
    assert_eq!(entry.response.content.mime_type, "application/json");
    assert!(entry.time > 0.0);
    assert_eq!(entry.timings.wait, entry.time);
    assert_eq!(entry.timings.dns, -1.0);
    assert_eq!(entry.comment, "req-1");
    assert!(!entry.started_date_time.is_empty());

    client.close();
}

#[tokio::test]
async fn connection_refused_yields_a_classified_entry_and_error() {
    // nothing listens on port 1
    let client = Client::builder().build().unwrap();
    let request = client
        .new_request(
            Method::POST,
            "http://127.0.0.1:1/api",
            br#"{"msg":"hello world"}"#,
            &[],
            &[],
        )
        .unwrap();

    let failure = client
        .execute(&request, ExecutionContext::new().with_request_id("req-2"))
        .await
        .unwrap_err();

    assert_eq!(failure.status, 503);
    assert_eq!(failure.status_text, "Connection refused");
    assert!(failure.to_string().contains("503"));
    assert!(matches!(failure.source, Error::Network(_)));

    // the entry is fully populated despite the failure
    let entry = failure.into_entry();
    assert_eq!(entry.response.status, 503);
    assert_eq!(entry.response.status_text, "Connection refused");
    assert_eq!(entry.response.content.mime_type, "text/plain");
    let body = String::from_utf8(entry.response.content.data.clone()).unwrap();
    assert!(body.starts_with("503 Connection refused:"));
    assert_eq!(entry.comment, "req-2");
    assert_eq!(entry.request.url, "http://127.0.0.1:1/api");

    client.close();
}

#[tokio::test]
async fn timeout_is_classified_as_request_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let request = client
        .new_request(
            Method::GET,
            &format!("{}/slow", mock_server.uri()),
            b"",
            &[],
            &[],
        )
        .unwrap();

    let failure = client
        .execute(&request, ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(failure.status, 408);
    assert_eq!(failure.status_text, "Request Timeout");
    assert_eq!(failure.entry.response.status, 408);

    client.close();
}

#[tokio::test]
async fn http_error_statuses_pass_through_as_successful_exchanges() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let request = client
        .new_request(
            Method::GET,
            &format!("{}/missing", mock_server.uri()),
            b"",
            &[],
            &[],
        )
        .unwrap();

    // a reachable server's 4xx is not a transport failure
    let entry = client
        .execute(&request, ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(entry.response.status, 404);
    assert_eq!(entry.response.status_text, "Not Found");
    assert_eq!(entry.response.content.data, b"Not found".to_vec());

    client.close();
}

#[tokio::test]
async fn retry_allow_list_drives_the_transport_retry_loop() {
    let mock_server = MockServer::start().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();

    // 503 on the first hit, 200 afterwards
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(move |_req: &wiremock::Request| {
            if hits_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503).set_body_string("unavailable")
            } else {
                ResponseTemplate::new(200).set_body_string("recovered")
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retry_count(2)
        .retry_wait(Duration::from_millis(10))
        .retry_max_wait(Duration::from_millis(20))
        .retry_on_http_errors(vec![502, 503])
        .build()
        .unwrap();

    let request = client
        .new_request(
            Method::GET,
            &format!("{}/flaky", mock_server.uri()),
            b"",
            &[],
            &[],
        )
        .unwrap();

    let entry = client
        .execute(&request, ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.content.data, b"recovered".to_vec());
    // retried the 503 exactly once, then the 200 stopped the loop
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    client.close();
}

#[tokio::test]
async fn statuses_outside_the_allow_list_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retry_count(3)
        .retry_wait(Duration::from_millis(10))
        .retry_on_http_errors(vec![502, 503])
        .build()
        .unwrap();

    let request = client
        .new_request(
            Method::GET,
            &format!("{}/broken", mock_server.uri()),
            b"",
            &[],
            &[],
        )
        .unwrap();

    let entry = client
        .execute(&request, ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(entry.response.status, 500);

    client.close();
}

#[tokio::test]
async fn trace_contexts_are_injected_into_outbound_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/traced"))
        .and(header_exists(TRACEPARENT_HEADER))
        .and(header_exists(HAR_TRACE_HEADER))
        .and(header("x-api-key", "pippo"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let har_tracer = InMemoryHarTracer::new();
    let client = Client::builder()
        .default_header("x-api-key", "pippo")
        .tracer(Arc::new(W3cTracer))
        .har_tracer(Arc::new(har_tracer.clone()))
        .har_tracing_enabled(true)
        .build()
        .unwrap();

    let request = client
        .new_request(
            Method::GET,
            &format!("{}/traced", mock_server.uri()),
            b"",
            &[],
            &[],
        )
        .unwrap();

    let entry = client
        .execute(&request, ExecutionContext::new().with_request_id("req-9"))
        .await
        .unwrap();
    assert_eq!(entry.response.status, 200);

    // the completed entry was attached to the archive span
    let recorded = har_tracer.entries();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].comment, "req-9");
    assert_eq!(recorded[0].response.status, 200);

    client.close();
}

#[tokio::test]
async fn every_span_is_finished_exactly_once_on_success_and_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let tracer = CountingTracer::default();
    let har_tracer = InMemoryHarTracer::new();
    let client = Client::builder()
        .trace_group_name("grp")
        .tracer(Arc::new(tracer.clone()))
        .har_tracer(Arc::new(har_tracer.clone()))
        .har_tracing_enabled(true)
        .build()
        .unwrap();

    let ok_request = client
        .new_request(
            Method::GET,
            &format!("{}/ok", mock_server.uri()),
            b"",
            &[],
            &[],
        )
        .unwrap();
    client
        .execute(&ok_request, ExecutionContext::new().with_op_name("ok"))
        .await
        .unwrap();

    let refused_request = client
        .new_request(Method::GET, "http://127.0.0.1:1/", b"", &[], &[])
        .unwrap();
    client
        .execute(&refused_request, ExecutionContext::new().with_op_name("ko"))
        .await
        .unwrap_err();

    // group span + two request spans started; only the request spans are
    // finished until the client closes
    assert_eq!(tracer.started(), 3);
    assert_eq!(tracer.finished(), 2);
    client.close();
    assert_eq!(tracer.finished(), 3);

    // both exchanges were attached to archive spans, failure included
    let recorded = har_tracer.entries();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].response.status, 200);
    assert_eq!(recorded[1].response.status, 503);
}

#[tokio::test]
async fn request_spans_are_tagged_with_the_outcome() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let tracer = CountingTracer::default();
    let har_tracer = InMemoryHarTracer::new();
    let client = Client::builder()
        .tracer(Arc::new(tracer.clone()))
        .har_tracer(Arc::new(har_tracer.clone()))
        .har_tracing_enabled(true)
        .build()
        .unwrap();

    let url = format!("{}/ok", mock_server.uri());
    let request = client
        .new_request(Method::GET, &url, b"", &[], &[])
        .unwrap();
    client
        .execute(
            &request,
            ExecutionContext::new()
                .with_op_name("fetch")
                .with_request_id("req-7")
                .with_lra_id("lra-1"),
        )
        .await
        .unwrap();

    let tags = tracer.tags();
    let find = |key: &str| {
        tags.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    assert_eq!(find("http.url").as_deref(), Some(url.as_str()));
    assert_eq!(find("http.method").as_deref(), Some("GET"));
    assert_eq!(find("http.status_code").as_deref(), Some("200"));
    assert_eq!(find("op-name").as_deref(), Some("fetch"));
    assert_eq!(find("req-id").as_deref(), Some("req-7"));
    assert_eq!(find("long-running-action").as_deref(), Some("lra-1"));
    // the generic span cross-references the archive span
    assert!(find(HAR_SPAN_ID_TAG).is_some());
    assert_eq!(find("error"), None);

    client.close();
}

#[tokio::test]
async fn failed_request_spans_carry_the_error_tags() {
    let tracer = CountingTracer::default();
    let client = Client::builder()
        .tracer(Arc::new(tracer.clone()))
        .build()
        .unwrap();

    let request = client
        .new_request(Method::GET, "http://127.0.0.1:1/", b"", &[], &[])
        .unwrap();
    client
        .execute(&request, ExecutionContext::new())
        .await
        .unwrap_err();

    let tags = tracer.tags();
    assert!(tags.iter().any(|(k, v)| k == "error" && v == "true"));
    assert!(tags.iter().any(|(k, _)| k == "error.message"));
    assert!(tags
        .iter()
        .any(|(k, v)| k == "http.status_code" && v == "503"));

    client.close();
}

#[tokio::test]
async fn get_requests_never_carry_a_body() {
    let mock_server = MockServer::start().await;

    // wiremock matches the empty body: a GET built with body bytes must not
    // transmit them
    Mock::given(method("GET"))
        .and(path("/nobody"))
        .and(wiremock::matchers::body_string(""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder().build().unwrap();
    let request = client
        .new_request(
            Method::GET,
            &format!("{}/nobody", mock_server.uri()),
            b"ignored",
            &[],
            &[],
        )
        .unwrap();

    let entry = client
        .execute(&request, ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(entry.response.status, 200);

    client.close();
}
