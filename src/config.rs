use crate::error::{ServerError, ServerResult};
use crate::middleware::CorsConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // Network configuration
    pub listen_address: String,
    pub port: u16,
    pub backlog_size: u32,

    // Connection settings
    pub connection_timeout: Duration,

    // Thread configuration
    pub worker_threads: usize,

    // HTTP configuration
    pub max_request_size: usize,

    // Application configuration
    pub cors: Option<CorsConfig>,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 8080,
            backlog_size: 1024,

            connection_timeout: Duration::from_secs(30),

            worker_threads: num_cpus::get(),

            max_request_size: 1024 * 1024, // 1 MB

            cors: None,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address and port to listen on
    pub fn with_address(mut self, address: &str, port: u16) -> Self {
        self.listen_address = address.to_string();
        self.port = port;
        self
    }

    /// Set the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the number of worker threads
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the largest request, head plus body, a connection may send
    pub fn with_max_request_size(mut self, size: usize) -> Self {
        self.max_request_size = size;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Get the full address string (address:port)
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    /// Check values that would make the server unusable
    pub fn validate(&self) -> ServerResult<()> {
        if self.worker_threads == 0 {
            return Err(ServerError::Config("worker_threads must be at least 1".into()));
        }
        if self.max_request_size == 0 {
            return Err(ServerError::Config("max_request_size must be positive".into()));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ServerResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_json_file<P: AsRef<Path>>(&self, path: P) -> ServerResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .with_address("0.0.0.0", 9000)
            .with_worker_threads(2)
            .with_max_request_size(512)
            .with_static_dir("public");

        assert_eq!(config.socket_address(), "0.0.0.0:9000");
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.max_request_size, 512);
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
        assert!(config.cors.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"port": 3000, "cors": {"allow_origins": ["https://example.com"]}}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.listen_address, "127.0.0.1");
        let cors = config.cors.unwrap();
        assert_eq!(cors.allow_origins, vec!["https://example.com"]);
        assert!(!cors.allow_credentials);
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("gem-config-{}.json", std::process::id()));
        let config = ServerConfig::new().with_address("localhost", 8181);
        config.save_to_json_file(&path).unwrap();

        let loaded = ServerConfig::from_json_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.socket_address(), "localhost:8181");
        assert_eq!(loaded.connection_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_config() {
        let config = ServerConfig::new().with_worker_threads(0);
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }
}
