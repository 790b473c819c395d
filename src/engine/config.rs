//! Engine configuration

use std::time::Duration;

use crate::network::HttpExecutorConfig;

/// Configuration shared by every request created in a script context
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base for resolving relative URLs passed to `open()`
    pub base_url: String,
    /// User-Agent sent by the HTTP executor
    pub user_agent: String,
    /// Connection timeout for the HTTP executor
    pub connect_timeout: Duration,
    /// Body read size per chunk
    pub chunk_size: usize,
    /// Upper bound on worker threads running asynchronous requests
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            user_agent: format!("Binix-XHR/{}", crate::VERSION),
            connect_timeout: Duration::from_secs(10),
            chunk_size: 16 * 1024,
            worker_threads: 2,
        }
    }
}

impl EngineConfig {
    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl From<&EngineConfig> for HttpExecutorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            user_agent: config.user_agent.clone(),
            chunk_size: config.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.base_url, "http://localhost/");
        assert!(config.user_agent.starts_with("Binix-XHR/"));
        assert_eq!(config.chunk_size, 16384);
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn test_http_config_conversion() {
        let config = EngineConfig {
            chunk_size: 512,
            ..Default::default()
        };
        let http = HttpExecutorConfig::from(&config);
        assert_eq!(http.chunk_size, 512);
        assert_eq!(http.user_agent, config.user_agent);
    }
}
