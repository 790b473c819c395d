//! HTTP executor backed by `reqwest`

use std::io::Read;
use std::time::Duration;

use super::executor::{NetworkEvent, NetworkExecutor, NetworkRequest, ResponseHead, ResponseSink};
use super::headers::HeaderList;
use crate::utils::NetworkError;

/// HTTP executor configuration
#[derive(Debug, Clone)]
pub struct HttpExecutorConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Body read size per chunk
    pub chunk_size: usize,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("Binix-XHR/{}", env!("CARGO_PKG_VERSION")),
            chunk_size: 16 * 1024,
        }
    }
}

/// Real network executor using a blocking `reqwest` client
pub struct HttpExecutor {
    client: reqwest::blocking::Client,
    chunk_size: usize,
}

impl HttpExecutor {
    /// Create a new executor
    pub fn new(config: HttpExecutorConfig) -> Result<Self, NetworkError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    fn send(&self, request: &NetworkRequest) -> Result<reqwest::blocking::Response, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError::Protocol(e.to_string()))?;

        let mut req = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            req = req.header(name, value);
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req.send().map_err(map_reqwest_error)
    }
}

impl NetworkExecutor for HttpExecutor {
    fn execute(&self, request: &NetworkRequest, sink: &mut dyn ResponseSink) {
        log::debug!("{} {}", request.method, request.url);

        let mut response = match self.send(request) {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Request to {} failed: {}", request.url, e);
                sink.deliver(NetworkEvent::Failed(e));
                return;
            }
        };

        let status = response.status();
        let headers: HeaderList = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let head = ResponseHead {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            url: Some(response.url().clone()),
        };
        if !sink.deliver(NetworkEvent::Head(head)) {
            return;
        }

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match response.read(&mut buf) {
                Ok(0) => {
                    sink.deliver(NetworkEvent::Complete);
                    return;
                }
                Ok(n) => {
                    log::trace!("{}: read {} bytes", request.url, n);
                    if !sink.deliver(NetworkEvent::Chunk(buf[..n].to_vec())) {
                        return;
                    }
                }
                Err(e) => {
                    let error = if e.kind() == std::io::ErrorKind::TimedOut {
                        NetworkError::Timeout
                    } else {
                        NetworkError::Transport(e.to_string())
                    };
                    sink.deliver(NetworkEvent::Failed(error));
                    return;
                }
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        return NetworkError::Timeout;
    }
    if e.is_builder() {
        return NetworkError::InvalidUrl(e.to_string());
    }
    if e.is_connect() {
        let detail = error_chain(&e);
        let lower = detail.to_ascii_lowercase();
        if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
            return NetworkError::DnsResolution(detail);
        }
        if lower.contains("certificate") || lower.contains("tls") {
            return NetworkError::Tls(detail);
        }
        return NetworkError::ConnectionFailed(detail);
    }
    NetworkError::Transport(error_chain(&e))
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::BufferedSink;

    #[test]
    fn test_default_config() {
        let config = HttpExecutorConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("Binix-XHR/"));
        assert_eq!(config.chunk_size, 16 * 1024);
    }

    #[test]
    fn test_unreachable_host_fails_softly() {
        let executor = HttpExecutor::new(HttpExecutorConfig {
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let url = url::Url::parse("http://127.0.0.1:9/never").unwrap();
        let mut sink = BufferedSink::new();
        executor.execute(&NetworkRequest::get(url), &mut sink);

        let events = sink.into_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NetworkEvent::Failed(_)));
    }
}
