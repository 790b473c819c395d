//! Network executor interface
//!
//! The request state machine never talks to a transport directly. It hands a
//! [`NetworkRequest`] to a [`NetworkExecutor`], which streams the outcome back
//! as [`NetworkEvent`]s through a [`ResponseSink`]: one head, zero or more
//! body chunks, then exactly one terminal `Complete` or `Failed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use url::Url;

use super::headers::HeaderList;
use crate::utils::NetworkError;

/// A request as handed to the network layer
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    /// Normalized method
    pub method: String,
    /// Absolute URL
    pub url: Url,
    /// Author request headers that passed the header policy
    pub headers: HeaderList,
    /// Body bytes, never set for GET/HEAD
    pub body: Option<Vec<u8>>,
    /// Whether the cycle runs asynchronously
    pub asynchronous: bool,
    /// Timeout of an asynchronous request; the loop enforces it as well,
    /// executors may use it to stop early
    pub timeout: Option<Duration>,
    /// Send credentials (cookies, auth) with cross-origin requests.
    /// Informational for host executors; `HttpExecutor` and `MockNetwork`
    /// keep no credential store and ignore it.
    pub with_credentials: bool,
}

impl NetworkRequest {
    /// Create a GET request with no headers
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: HeaderList::new(),
            body: None,
            asynchronous: true,
            timeout: None,
            with_credentials: false,
        }
    }
}

/// Status line and headers of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderList,
    /// Final URL after redirects
    pub url: Option<Url>,
}

impl ResponseHead {
    /// Create a head with the canonical reason phrase for `status`
    pub fn new(status: u16, headers: HeaderList) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers,
            url: None,
        }
    }

    /// Parsed `Content-Length`, if present and valid
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// One step of a response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Status line and headers are available
    Head(ResponseHead),
    /// A slice of the body arrived
    Chunk(Vec<u8>),
    /// The full body was delivered
    Complete,
    /// The request failed at network level
    Failed(NetworkError),
}

impl NetworkEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

/// Receiver side of a response stream
pub trait ResponseSink {
    /// Accept the next event. Returns `false` when the consumer no longer
    /// wants data and the executor should stop.
    fn deliver(&mut self, event: NetworkEvent) -> bool;
}

/// Pluggable transport
///
/// Implementations block the calling thread until the stream is finished;
/// the state machine decides on which thread that happens.
pub trait NetworkExecutor: Send + Sync {
    /// Run the request, streaming events into `sink` in order
    fn execute(&self, request: &NetworkRequest, sink: &mut dyn ResponseSink);
}

/// Shared cancellation flag for an in-flight cycle
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag in the running state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sink collecting events in memory, used by synchronous cycles
#[derive(Debug, Default)]
pub struct BufferedSink {
    events: Vec<NetworkEvent>,
    finished: bool,
}

impl BufferedSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the collected events, appending a failure if the executor
    /// returned without a terminal event
    pub fn into_events(mut self) -> Vec<NetworkEvent> {
        if !self.finished {
            self.events.push(NetworkEvent::Failed(NetworkError::Transport(
                "executor finished without completing the response".to_string(),
            )));
        }
        self.events
    }
}

impl ResponseSink for BufferedSink {
    fn deliver(&mut self, event: NetworkEvent) -> bool {
        if self.finished {
            return false;
        }
        self.finished = event.is_terminal();
        self.events.push(event);
        !self.finished
    }
}

/// Canonical reason phrase for common status codes
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_sink_stops_after_terminal() {
        let mut sink = BufferedSink::new();
        assert!(sink.deliver(NetworkEvent::Head(ResponseHead::new(200, HeaderList::new()))));
        assert!(sink.deliver(NetworkEvent::Chunk(b"abc".to_vec())));
        assert!(!sink.deliver(NetworkEvent::Complete));
        assert!(!sink.deliver(NetworkEvent::Chunk(b"late".to_vec())));
        assert_eq!(sink.into_events().len(), 3);
    }

    #[test]
    fn test_buffered_sink_reports_missing_terminal() {
        let mut sink = BufferedSink::new();
        sink.deliver(NetworkEvent::Head(ResponseHead::new(200, HeaderList::new())));
        let events = sink.into_events();
        assert!(matches!(
            events.last(),
            Some(NetworkEvent::Failed(NetworkError::Transport(_)))
        ));
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderList::new();
        headers.append("Content-Length", " 11 ");
        assert_eq!(ResponseHead::new(200, headers).content_length(), Some(11));

        let mut headers = HeaderList::new();
        headers.append("Content-Length", "eleven");
        assert_eq!(ResponseHead::new(200, headers).content_length(), None);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(799), "Unknown");
    }
}
