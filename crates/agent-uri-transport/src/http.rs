// crates/agent-uri-transport/src/http.rs
// ============================================================================
// Module: HTTP Binding
// Description: Request/response transport over HTTP-compatible protocols.
// Purpose: Invoke capabilities with method selection, retries, and streaming.
// Dependencies: reqwest, futures, tokio, serde_json
// ============================================================================

//! ## Overview
//! The HTTP binding invokes a capability at `<endpoint>/<capability>`. Small
//! scalar parameter sets travel as query strings on GET; everything else
//! posts a JSON body. Responses decode `application/problem+json` failures
//! into the shared envelope, streaming responses decode server-sent events
//! or newline-delimited JSON, and idempotent GETs retry transient failures
//! with exponential backoff. Connections are pooled per origin with a
//! bounded idle set.
//! Security posture: response bytes are untrusted; reads are size-capped and
//! problem text passes through without interpretation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use url::Url;

use agent_uri_core::ErrorKind;
use agent_uri_core::PROBLEM_JSON;
use agent_uri_core::ProblemDetail;
use agent_uri_core::problem::decode_http_body;

use crate::contract::ChunkSequence;
use crate::contract::ChunkStream;
use crate::contract::StreamChunk;
use crate::contract::Transport;
use crate::contract::TransportRequest;
use crate::contract::TransportResponse;
use crate::error::TransportError;
use crate::telemetry::NoopTelemetry;
use crate::telemetry::TelemetrySink;
use crate::telemetry::TransportMetricEvent;
use crate::telemetry::TransportOperation;
use crate::telemetry::TransportOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard upper bound on buffered response bodies.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound on an encoded query string before falling back to POST.
const MAX_QUERY_BYTES: usize = 2048;

/// Media type for server-sent event streams.
const EVENT_STREAM: &str = "text/event-stream";

/// Media type for newline-delimited JSON streams.
const NDJSON: &str = "application/x-ndjson";

/// Headers given defined meaning by the protocol; all others pass through.
pub const RECOGNIZED_HEADERS: &[&str] = &[
    "accept",
    "content-type",
    "authorization",
    "x-api-key",
    "x-session-id",
    "x-task-id",
    "x-agent-version",
    "x-delegation-chain",
];

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP binding.
///
/// # Invariants
/// - `retries_max` bounds retries of idempotent requests only.
/// - `pool_per_origin_max` bounds idle connections per origin.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct HttpTransportConfig {
    /// Default overall deadline per request, in milliseconds.
    pub timeout_ms: u64,
    /// Upper bound on retry attempts for idempotent requests.
    pub retries_max: u32,
    /// Maximum idle connections kept per origin.
    pub pool_per_origin_max: usize,
    /// Idle connection reaper deadline, in seconds.
    pub idle_timeout_s: u64,
    /// Whether redirects are followed.
    pub follow_redirects: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retries_max: 3,
            pool_per_origin_max: 10,
            idle_timeout_s: 60,
            follow_redirects: true,
            user_agent: "agent-uri/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Binding
// ============================================================================

/// Request/response binding over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    /// Pooled HTTP client.
    client: reqwest::Client,
    /// Binding configuration.
    config: Arc<HttpTransportConfig>,
    /// Metric event receiver.
    telemetry: Arc<dyn TelemetrySink>,
}

impl HttpTransport {
    /// Builds the binding from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Internal`] when the client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_per_origin_max)
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_s))
            .redirect(redirect)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| TransportError::Internal(format!("http client build failed: {err}")))?;
        Ok(Self {
            client,
            config: Arc::new(config),
            telemetry: Arc::new(NoopTelemetry),
        })
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Emits one metric event.
    fn record(&self, operation: TransportOperation, outcome: TransportOutcome, started: Instant, status: Option<u16>) {
        self.telemetry.record(&TransportMetricEvent {
            tag: "https".to_string(),
            operation,
            outcome,
            latency: started.elapsed(),
            status,
        });
    }

    /// Builds the request URL: endpoint path plus the capability segment.
    fn build_url(&self, request: &TransportRequest) -> Result<Url, TransportError> {
        let mut url = Url::parse(&request.endpoint)
            .map_err(|err| TransportError::InvalidRequest(format!("invalid endpoint: {err}")))?;
        if !request.capability.is_empty() {
            url.path_segments_mut()
                .map_err(|()| {
                    TransportError::InvalidRequest("endpoint cannot carry a path".to_string())
                })?
                .pop_if_empty()
                .push(&request.capability);
        }
        Ok(url)
    }

    /// Chooses GET when params are safe for query encoding.
    fn choose_method(url: &mut Url, request: &TransportRequest) -> reqwest::Method {
        let Some(params) = &request.params else {
            return reqwest::Method::GET;
        };
        let Value::Object(map) = params else {
            return reqwest::Method::POST;
        };
        let all_scalar = map.values().all(|value| {
            matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
        });
        if !all_scalar {
            return reqwest::Method::POST;
        }
        let mut candidate = url.clone();
        {
            let mut pairs = candidate.query_pairs_mut();
            for (key, value) in map {
                match value {
                    Value::String(text) => pairs.append_pair(key, text),
                    other => pairs.append_pair(key, &other.to_string()),
                };
            }
        }
        if candidate.query().map_or(0, str::len) > MAX_QUERY_BYTES {
            return reqwest::Method::POST;
        }
        *url = candidate;
        reqwest::Method::GET
    }

    /// Assembles headers: binding defaults, then auth, then caller headers.
    fn build_headers(
        request: &TransportRequest,
        accept: &str,
    ) -> Result<reqwest::header::HeaderMap, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_str(accept)
                .map_err(|_| TransportError::InvalidRequest("invalid accept value".to_string()))?,
        );
        if let Some(auth) = &request.auth {
            for (name, value) in auth.headers()? {
                insert_header(&mut headers, &name, &value)?;
            }
        }
        for (name, value) in &request.headers {
            insert_header(&mut headers, name, value)?;
        }
        Ok(headers)
    }

    /// Sends a request, retrying idempotent methods on transient failures.
    async fn send_with_retries(
        &self,
        method: reqwest::Method,
        url: Url,
        headers: reqwest::header::HeaderMap,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<reqwest::Response, TransportError> {
        let idempotent = method == reqwest::Method::GET;
        let max_attempts = if idempotent { self.config.retries_max + 1 } else { 1 };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .timeout(timeout);
            if let Some(body) = &body {
                builder = builder
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        headers
                            .get(reqwest::header::CONTENT_TYPE)
                            .cloned()
                            .unwrap_or(reqwest::header::HeaderValue::from_static(
                                "application/json",
                            )),
                    )
                    .body(body.clone());
            }
            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if matches!(status, 502 | 503 | 504) && attempt < max_attempts {
                        backoff(attempt).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) if err.is_timeout() => {
                    return Err(TransportError::Timeout {
                        elapsed_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                Err(err) if err.is_connect() && attempt < max_attempts => {
                    backoff(attempt).await;
                }
                Err(err) => return Err(TransportError::Network(err.to_string())),
            }
        }
    }

    /// Core of `stream`, shared with the restart path.
    async fn open_stream(&self, request: TransportRequest) -> Result<ChunkStream, TransportError> {
        let mut url = self.build_url(&request)?;
        let method = Self::choose_method(&mut url, &request);
        let accept = format!("{EVENT_STREAM}, {NDJSON};q=0.9, application/json;q=0.8");
        let headers = Self::build_headers(&request, &accept)?;
        let body = if method == reqwest::Method::GET {
            None
        } else {
            Some(encode_body(request.params.as_ref())?)
        };
        let timeout = request.timeout.unwrap_or(Duration::from_millis(self.config.timeout_ms));
        let response = self.send_with_retries(method, url, headers, body, timeout).await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(self.failure_from_response(response).await);
        }
        let content_type = content_type_of(&response);
        let bytes: BoxStream<'static, Result<Vec<u8>, String>> = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string()))
            .boxed();
        if content_type.starts_with(EVENT_STREAM) {
            return Ok(sse_chunk_stream(bytes));
        }
        if content_type.starts_with(NDJSON) {
            return Ok(ndjson_chunk_stream(bytes));
        }
        Ok(single_chunk_stream(bytes, content_type))
    }

    /// Converts a non-2xx response into an invocation failure.
    async fn failure_from_response(&self, response: reqwest::Response) -> TransportError {
        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let body = read_limited(response).await.unwrap_or_default();
        let problem = if content_type.starts_with(PROBLEM_JSON) {
            decode_http_body(&body)
        } else {
            None
        };
        let problem = problem.unwrap_or_else(|| {
            ProblemDetail::from_kind(kind_for_status(status))
                .with_detail(String::from_utf8_lossy(&body).trim().to_string())
                .with_extension("http_status", Value::Number(status.into()))
        });
        TransportError::invocation(problem)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn protocol_tag(&self) -> &str {
        "https"
    }

    async fn invoke(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let started = Instant::now();
        let mut url = self.build_url(&request)?;
        let method = Self::choose_method(&mut url, &request);
        let headers = Self::build_headers(&request, "application/json")?;
        let body = if method == reqwest::Method::GET {
            None
        } else {
            Some(encode_body(request.params.as_ref())?)
        };
        let timeout = request.timeout.unwrap_or(Duration::from_millis(self.config.timeout_ms));

        let response = match self.send_with_retries(method, url, headers, body, timeout).await {
            Ok(response) => response,
            Err(err) => {
                let outcome = match err {
                    TransportError::Timeout {
                        ..
                    } => TransportOutcome::Timeout,
                    _ => TransportOutcome::Error,
                };
                self.record(TransportOperation::Invoke, outcome, started, None);
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let err = self.failure_from_response(response).await;
            self.record(TransportOperation::Invoke, TransportOutcome::Error, started, Some(status));
            return Err(err);
        }

        let headers = header_map(&response);
        let content_type = content_type_of(&response);
        let bytes = read_limited(response).await?;
        let body = decode_body(&bytes, &content_type)?;
        self.record(TransportOperation::Invoke, TransportOutcome::Ok, started, Some(status));
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn stream(&self, request: TransportRequest) -> Result<ChunkSequence, TransportError> {
        let started = Instant::now();
        let mut request = request;
        request.stream = true;
        let inner = match self.open_stream(request.clone()).await {
            Ok(inner) => inner,
            Err(err) => {
                self.record(TransportOperation::Stream, TransportOutcome::Error, started, None);
                return Err(err);
            }
        };
        self.record(TransportOperation::Stream, TransportOutcome::Ok, started, None);
        let transport = self.clone();
        Ok(ChunkSequence::with_restart(
            inner,
            Box::new(move || {
                Box::pin(async move {
                    transport.open_stream(request).await.map(ChunkSequence::new)
                })
            }),
        ))
    }

    async fn close(&self) -> Result<(), TransportError> {
        // reqwest tears the pool down with the client; nothing to flush.
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sleeps with exponential backoff before a retry.
async fn backoff(attempt: u32) {
    let exponent = attempt.saturating_sub(1).min(8);
    let delay = Duration::from_millis(100_u64.saturating_mul(1_u64 << exponent));
    tokio::time::sleep(delay).await;
}

/// Inserts one header with name/value validation.
fn insert_header(
    headers: &mut reqwest::header::HeaderMap,
    name: &str,
    value: &str,
) -> Result<(), TransportError> {
    let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| TransportError::InvalidRequest(format!("invalid header name: {name}")))?;
    let value = reqwest::header::HeaderValue::from_str(value)
        .map_err(|_| TransportError::InvalidRequest("invalid header value".to_string()))?;
    headers.insert(name, value);
    Ok(())
}

/// Serializes a POST body, defaulting to an empty object.
fn encode_body(params: Option<&Value>) -> Result<Vec<u8>, TransportError> {
    let value = params.cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::to_vec(&value)
        .map_err(|err| TransportError::InvalidRequest(format!("unencodable params: {err}")))
}

/// Returns the response content type, lowercased, without parameters.
fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Copies response headers into a plain map.
fn header_map(response: &reqwest::Response) -> BTreeMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Reads a response body while enforcing the size cap.
async fn read_limited(mut response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    while let Some(chunk) =
        response.chunk().await.map_err(|err| TransportError::Network(err.to_string()))?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(TransportError::Protocol("response exceeds size limit".to_string()));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Decodes a buffered body according to its content type.
fn decode_body(bytes: &[u8], content_type: &str) -> Result<Value, TransportError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    if content_type.contains("json") {
        return serde_json::from_slice(bytes)
            .map_err(|err| TransportError::Protocol(format!("invalid json body: {err}")));
    }
    Ok(Value::String(String::from_utf8_lossy(bytes).to_string()))
}

/// Maps an HTTP status onto the failure taxonomy.
const fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::InvalidInput,
        401 => ErrorKind::AuthenticationFailed,
        403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::CapabilityNotFound,
        429 => ErrorKind::RateLimited,
        504 => ErrorKind::Timeout,
        _ => ErrorKind::Upstream,
    }
}

// ============================================================================
// SECTION: Stream Decoders
// ============================================================================

/// Raw byte stream feeding the decoders.
type ByteStream = BoxStream<'static, Result<Vec<u8>, String>>;

/// Decoder state shared by the incremental decoders.
struct DecodeState {
    /// Upstream byte source.
    source: ByteStream,
    /// Undecoded text carried between chunks.
    buffer: String,
    /// Source exhausted.
    done: bool,
}

/// Decodes a server-sent event stream into chunks.
fn sse_chunk_stream(source: ByteStream) -> ChunkStream {
    let state = DecodeState {
        source,
        buffer: String::new(),
        done: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            // A blank line terminates one event.
            if let Some(boundary) = state.buffer.find("\n\n") {
                let event: String = state.buffer.drain(..boundary + 2).collect();
                if let Some(data) = sse_event_data(&event) {
                    return Some((Ok(decode_chunk(&data, EVENT_STREAM)), state));
                }
                continue;
            }
            if state.done {
                // Lenient tail: a final event without its blank line still counts.
                if !state.buffer.is_empty() {
                    let event = std::mem::take(&mut state.buffer);
                    if let Some(data) = sse_event_data(&event) {
                        return Some((Ok(decode_chunk(&data, EVENT_STREAM)), state));
                    }
                }
                return None;
            }
            match state.source.next().await {
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).replace("\r\n", "\n");
                    state.buffer.push_str(&text);
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(TransportError::Network(err)), state));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

/// Extracts the joined `data:` payload from one SSE event block.
fn sse_event_data(event: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in event.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start());
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(data_lines.join("\n"))
}

/// Decodes a newline-delimited JSON stream into chunks.
fn ndjson_chunk_stream(source: ByteStream) -> ChunkStream {
    let state = DecodeState {
        source,
        buffer: String::new(),
        done: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(boundary) = state.buffer.find('\n') {
                let line: String = state.buffer.drain(..=boundary).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                return Some((Ok(decode_chunk(line, NDJSON)), state));
            }
            if state.done {
                let line = std::mem::take(&mut state.buffer);
                let line = line.trim().to_string();
                if line.is_empty() {
                    return None;
                }
                return Some((Ok(decode_chunk(&line, NDJSON)), state));
            }
            match state.source.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(TransportError::Network(err)), state));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

/// Buffers a non-streaming body and yields it as one chunk.
fn single_chunk_stream(source: ByteStream, content_type: String) -> ChunkStream {
    futures::stream::once(async move {
        let mut body = Vec::new();
        let mut source = source;
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(TransportError::Network)?;
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(TransportError::Protocol("response exceeds size limit".to_string()));
            }
            body.extend_from_slice(&chunk);
        }
        let payload = decode_body(&body, &content_type)?;
        Ok(StreamChunk {
            payload,
            media_type: if content_type.is_empty() { None } else { Some(content_type) },
        })
    })
    .boxed()
}

/// Parses chunk text as JSON, falling back to a string payload.
fn decode_chunk(text: &str, media_type: &str) -> StreamChunk {
    let payload = serde_json::from_str(text)
        .unwrap_or_else(|_| Value::String(text.to_string()));
    StreamChunk {
        payload,
        media_type: Some(media_type.to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use futures::StreamExt;
    use futures::stream;
    use serde_json::json;

    use super::ByteStream;
    use super::kind_for_status;
    use super::ndjson_chunk_stream;
    use super::sse_chunk_stream;
    use super::sse_event_data;
    use agent_uri_core::ErrorKind;

    fn bytes_of(parts: &[&str]) -> ByteStream {
        let owned: Vec<Result<Vec<u8>, String>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn sse_decoder_handles_events_split_across_chunks() {
        let source = bytes_of(&[
            "data: {\"n\":",
            " 1}\n\ndata: {\"n\": 2}\n",
            "\ndata: done\n\n",
        ]);
        let chunks: Vec<_> = sse_chunk_stream(source).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().unwrap().payload, json!({"n": 1}));
        assert_eq!(chunks[1].as_ref().unwrap().payload, json!({"n": 2}));
        assert_eq!(chunks[2].as_ref().unwrap().payload, json!("done"));
    }

    #[tokio::test]
    async fn sse_decoder_joins_multi_line_data() {
        let source = bytes_of(&["data: line1\ndata: line2\n\n"]);
        let chunks: Vec<_> = sse_chunk_stream(source).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().payload, json!("line1\nline2"));
    }

    #[tokio::test]
    async fn sse_decoder_skips_comment_events() {
        let source = bytes_of(&[": keepalive\n\ndata: x\n\n"]);
        let chunks: Vec<_> = sse_chunk_stream(source).collect().await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn ndjson_decoder_splits_lines_across_chunks() {
        let source = bytes_of(&["{\"a\":1}\n{\"a\"", ":2}\n{\"a\":3}"]);
        let chunks: Vec<_> = ndjson_chunk_stream(source).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref().unwrap().payload, json!({"a": 3}));
    }

    #[test]
    fn sse_event_data_requires_data_lines() {
        assert_eq!(sse_event_data("event: tick\n"), None);
        assert_eq!(sse_event_data("data: a\ndata: b\n"), Some("a\nb".to_string()));
    }

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert_eq!(kind_for_status(401), ErrorKind::AuthenticationFailed);
        assert_eq!(kind_for_status(403), ErrorKind::PermissionDenied);
        assert_eq!(kind_for_status(404), ErrorKind::CapabilityNotFound);
        assert_eq!(kind_for_status(429), ErrorKind::RateLimited);
        assert_eq!(kind_for_status(500), ErrorKind::Upstream);
        assert_eq!(kind_for_status(504), ErrorKind::Timeout);
    }
}
