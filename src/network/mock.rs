//! Scripted network executor for deterministic tests
//!
//! Responses are registered per URL (plus an optional default). Unknown URLs
//! answer `404 Not Found`. Every request seen is recorded for inspection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use encoding_rs::Encoding;

use super::executor::{NetworkEvent, NetworkExecutor, NetworkRequest, ResponseHead, ResponseSink};
use super::headers::HeaderList;
use crate::utils::NetworkError;

/// A canned response
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    status_text: Option<String>,
    headers: HeaderList,
    body: Vec<u8>,
    delay: Option<Duration>,
    chunk_size: Option<usize>,
    failure: Option<NetworkError>,
}

impl MockResponse {
    /// `200 OK` with the given body and `Content-Type`
    pub fn new(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        let mut headers = HeaderList::new();
        if !content_type.is_empty() {
            headers.append("Content-Type", content_type);
        }
        Self {
            status: 200,
            status_text: None,
            headers,
            body: body.into(),
            delay: None,
            chunk_size: None,
            failure: None,
        }
    }

    /// Encode `text` with `encoding` and declare it in the `Content-Type`
    pub fn with_charset(text: &str, content_type: &str, encoding: &'static Encoding) -> Self {
        let (bytes, _, _) = encoding.encode(text);
        Self::new(
            bytes.into_owned(),
            &format!("{}; charset={}", content_type, encoding.name()),
        )
    }

    /// A response that fails at network level instead of answering
    pub fn failure(error: NetworkError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(Vec::new(), "")
        }
    }

    /// Override status code and reason phrase
    pub fn status(mut self, status: u16, status_text: &str) -> Self {
        self.status = status;
        self.status_text = Some(status_text.to_string());
        self
    }

    /// Add a response header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Add a `Content-Length` header matching the body
    pub fn with_content_length(self) -> Self {
        let len = self.body.len().to_string();
        self.header("Content-Length", &len)
    }

    /// Wait before answering
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Deliver the body in chunks of `size` bytes
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    fn head(&self) -> ResponseHead {
        let mut head = ResponseHead::new(self.status, self.headers.clone());
        if let Some(text) = &self.status_text {
            head.status_text = text.clone();
        }
        head
    }
}

/// Executor answering from registered [`MockResponse`]s
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, MockResponse>>,
    default_response: Mutex<Option<MockResponse>>,
    requests: Mutex<Vec<NetworkRequest>>,
}

impl MockNetwork {
    /// Create a mock network with no responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response for an absolute URL
    pub fn set_response(&self, url: &str, response: MockResponse) {
        let key = url::Url::parse(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(key, response);
        }
    }

    /// Response used for any URL without a registered one
    pub fn set_default_response(&self, response: MockResponse) {
        if let Ok(mut default) = self.default_response.lock() {
            *default = Some(response);
        }
    }

    /// All requests executed so far
    pub fn requests(&self) -> Vec<NetworkRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent request
    pub fn last_request(&self) -> Option<NetworkRequest> {
        self.requests.lock().ok()?.last().cloned()
    }

    fn lookup(&self, request: &NetworkRequest) -> MockResponse {
        let mut url = request.url.clone();
        url.set_fragment(None);
        if let Some(found) = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(url.as_str()).cloned())
        {
            return found;
        }
        self.default_response
            .lock()
            .ok()
            .and_then(|d| d.clone())
            .unwrap_or_else(|| MockResponse::new("", "text/plain").status(404, "Not Found"))
    }
}

impl NetworkExecutor for MockNetwork {
    fn execute(&self, request: &NetworkRequest, sink: &mut dyn ResponseSink) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let response = self.lookup(request);

        if let Some(delay) = response.delay {
            match request.timeout {
                Some(timeout) if timeout < delay => {
                    std::thread::sleep(timeout);
                    sink.deliver(NetworkEvent::Failed(NetworkError::Timeout));
                    return;
                }
                _ => std::thread::sleep(delay),
            }
        }

        if let Some(error) = response.failure.clone() {
            sink.deliver(NetworkEvent::Failed(error));
            return;
        }

        if !sink.deliver(NetworkEvent::Head(response.head())) {
            return;
        }

        let chunk_size = response.chunk_size.unwrap_or(response.body.len().max(1));
        for chunk in response.body.chunks(chunk_size) {
            if !sink.deliver(NetworkEvent::Chunk(chunk.to_vec())) {
                return;
            }
        }
        sink.deliver(NetworkEvent::Complete);
    }
}
