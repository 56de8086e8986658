use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::jobs::{JobServiceConfig, RetentionPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub jobs: JobsConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub step_pacing_ms: u64,
    /// Terminal jobs older than this are evicted; `None` keeps them forever
    pub retention_ttl_secs: Option<u64>,
    pub max_retained_jobs: Option<usize>,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl JobsConfig {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            ttl: self.retention_ttl_secs.map(Duration::from_secs),
            max_retained: self.max_retained_jobs,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn service_config(&self) -> JobServiceConfig {
        JobServiceConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            step_pacing: Duration::from_millis(self.step_pacing_ms),
            retention: self.retention(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("KYB_API_HOST") {
            self.server.host = v;
        }
        if let Some(port) = env::var("KYB_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }

        // Job overrides
        if let Ok(v) = env::var("JOBS_DEFAULT_PAGE_SIZE") {
            self.jobs.default_page_size = v.parse().unwrap_or(self.jobs.default_page_size);
        }
        if let Ok(v) = env::var("JOBS_MAX_PAGE_SIZE") {
            self.jobs.max_page_size = v.parse().unwrap_or(self.jobs.max_page_size);
        }
        if let Ok(v) = env::var("JOBS_STEP_PACING_MS") {
            self.jobs.step_pacing_ms = v.parse().unwrap_or(self.jobs.step_pacing_ms);
        }
        if let Ok(v) = env::var("JOBS_RETENTION_TTL_SECS") {
            // "0" or "none" disables expiry
            self.jobs.retention_ttl_secs = v.parse().ok().filter(|secs| *secs > 0);
        }
        if let Ok(v) = env::var("JOBS_MAX_RETAINED") {
            self.jobs.max_retained_jobs = v.parse().ok().filter(|max| *max > 0);
        }
        if let Ok(v) = env::var("JOBS_SWEEP_INTERVAL_SECS") {
            self.jobs.sweep_interval_secs = v.parse().unwrap_or(self.jobs.sweep_interval_secs);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        // Logging overrides
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = env::var("LOG_FORMAT") {
            self.logging.json = v.eq_ignore_ascii_case("json");
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            jobs: JobsConfig {
                default_page_size: 50,
                max_page_size: 1000,
                step_pacing_ms: 250,
                retention_ttl_secs: None,
                max_retained_jobs: None,
                sweep_interval_secs: 60,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            jobs: JobsConfig {
                default_page_size: 50,
                max_page_size: 500,
                step_pacing_ms: 0,
                retention_ttl_secs: Some(24 * 60 * 60),
                max_retained_jobs: Some(50_000),
                sweep_interval_secs: 300,
            },
            api: ApiConfig {
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: true,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            jobs: JobsConfig {
                default_page_size: 50,
                max_page_size: 200,
                step_pacing_ms: 0,
                retention_ttl_secs: Some(6 * 60 * 60),
                max_retained_jobs: Some(100_000),
                sweep_interval_secs: 60,
            },
            api: ApiConfig {
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: true,
            },
        }
    }

    /// Development defaults with pacing and retention turned off
    pub fn for_tests() -> Self {
        let mut config = Self::development();
        config.jobs.step_pacing_ms = 0;
        config.logging.level = "warn".to_string();
        config
    }
}

// Global singleton config for the binaries - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
