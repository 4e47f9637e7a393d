//! Configuration for jeapcached

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub metrics: MetricsConfig,
}

/// Request frontend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP address to listen on. Empty means serve the single stdin/stdout stream.
    pub listen_addr: String,

    /// Abort the whole process after this many seconds (0 = no alarm)
    pub timeout_secs: u64,

    /// Longest accepted command line, excluding the line terminator
    pub max_line_length: usize,

    /// Write buffer size per connection (bytes)
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::new(),
            timeout_secs: 0,
            max_line_length: 256,
            write_buffer_size: 8192,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads, also the bound on in-flight jobs
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of hash buckets (power of two)
    pub buckets: usize,

    /// Largest value a store command may carry (bytes)
    pub max_value_length: usize,

    /// Register the incr/decr handlers. When false they answer NOT_IMPLEMENT.
    pub arithmetic: bool,

    /// Answer `0ops` with store statistics instead of NO_BACKDOOR
    pub backdoor: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buckets: 4096,
            max_value_length: 4096,
            arithmetic: true,
            backdoor: false,
        }
    }
}

/// Metrics and health check configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the metrics/health HTTP endpoint
    pub enabled: bool,

    /// Address for metrics/health HTTP server
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::JeapError::Config(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| crate::JeapError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("JEAPCACHED_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("JEAPCACHED_TIMEOUT")
            && let Ok(n) = timeout.parse()
        {
            config.server.timeout_secs = n;
        }

        if let Ok(workers) = std::env::var("JEAPCACHED_WORKERS")
            && let Ok(n) = workers.parse()
        {
            config.scheduler.workers = n;
        }

        if let Ok(buckets) = std::env::var("JEAPCACHED_BUCKETS")
            && let Ok(n) = buckets.parse()
        {
            config.store.buckets = n;
        }

        if let Ok(addr) = std::env::var("JEAPCACHED_METRICS_ADDR") {
            config.metrics.listen_addr = addr;
        }

        if let Ok(enabled) = std::env::var("JEAPCACHED_METRICS_ENABLED") {
            config.metrics.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store and scheduler cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.scheduler.workers == 0 {
            return Err(crate::JeapError::Config(
                "scheduler.workers must be at least 1".to_string(),
            ));
        }
        if !self.store.buckets.is_power_of_two() {
            return Err(crate::JeapError::Config(format!(
                "store.buckets must be a power of two, got {}",
                self.store.buckets
            )));
        }
        if self.server.max_line_length == 0 {
            return Err(crate::JeapError::Config(
                "server.max_line_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.workers, 4);
        assert_eq!(config.store.buckets, 4096);
        assert_eq!(config.store.max_value_length, 4096);
        assert!(config.server.listen_addr.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scheduler]\nworkers = 8\n\n[store]\nbuckets = 256\narithmetic = false\n"
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.scheduler.workers, 8);
        assert_eq!(config.store.buckets, 256);
        assert!(!config.store.arithmetic);
        // untouched sections keep their defaults
        assert_eq!(config.store.max_value_length, 4096);
    }

    #[test]
    fn test_rejects_bad_bucket_count() {
        let mut config = Config::default();
        config.store.buckets = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = Config::default();
        config.scheduler.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/jeapcached.toml").is_err());
    }
}
