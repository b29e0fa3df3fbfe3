use crate::error::{Result, SubvisorError};
use crate::models::format_tcp_addr;
use crate::probe::SelectionPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Subscription feed configuration
    pub subscription: SubscriptionSettings,
    /// Engine process configuration
    pub engine: EngineSettings,
    /// Reachability and functional probe configuration
    pub probe: ProbeSettings,
    /// Seconds between scheduled resolution cycles
    pub reload_interval_secs: u64,
    /// Admin API configuration
    pub api: ApiServerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    /// Subscription URL (required)
    pub url: String,
    /// HTTP timeout for the subscription fetch in seconds
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Engine executable, resolved through PATH
    pub binary: String,
    /// Arguments making the engine read a JSON config from stdin
    pub args: Vec<String>,
    /// Address the local inbounds bind to
    pub listen: String,
    /// Local HTTP proxy inbound port (default: 1087)
    pub http_port: u16,
    /// Local SOCKS inbound port (default: 1080)
    pub socks_port: u16,
    /// Engine log level written into its config
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// URL fetched through the engine to confirm it works
    pub url: String,
    /// Functional probe attempts per candidate
    pub retries: u32,
    /// Per-attempt functional probe timeout in seconds
    pub timeout_secs: u64,
    /// Pause between functional probe attempts in milliseconds
    pub backoff_ms: u64,
    /// Shared deadline for the reachability probe in seconds
    pub dial_timeout_secs: u64,
    /// How reachable candidates are selected
    pub selection: SelectionPolicy,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Serve the admin API
    pub enabled: bool,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port for the admin API (default: 3000)
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let selection_raw = get_env_or("SUBVISOR_SELECTION", "ordered");
        let selection = SelectionPolicy::from_str(&selection_raw).ok_or_else(|| {
            SubvisorError::InvalidConfig(format!(
                "SUBVISOR_SELECTION must be 'ordered' or 'first', got '{}'",
                selection_raw
            ))
        })?;

        Ok(Config {
            subscription: SubscriptionSettings {
                url: parse_subscription_url()?,
                fetch_timeout_secs: parse_env_or("SUBVISOR_FETCH_TIMEOUT", 30)?,
            },
            engine: EngineSettings {
                binary: get_env_or("SUBVISOR_ENGINE_BIN", "v2ray"),
                args: get_env_or("SUBVISOR_ENGINE_ARGS", "run -format json")
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                listen: get_env_or("SUBVISOR_LISTEN", "0.0.0.0"),
                http_port: parse_port("SUBVISOR_HTTP_PORT", 1087)?,
                socks_port: parse_port("SUBVISOR_SOCKS_PORT", 1080)?,
                log_level: get_env_or("SUBVISOR_ENGINE_LOG_LEVEL", "info"),
            },
            probe: ProbeSettings {
                url: get_env_or("SUBVISOR_PROBE_URL", "https://google.com"),
                retries: parse_env_or("SUBVISOR_PROBE_RETRIES", 3)?,
                timeout_secs: parse_env_or("SUBVISOR_PROBE_TIMEOUT", 5)?,
                backoff_ms: parse_env_or("SUBVISOR_PROBE_BACKOFF_MS", 1000)?,
                dial_timeout_secs: parse_env_or("SUBVISOR_DIAL_TIMEOUT", 5)?,
                selection,
            },
            reload_interval_secs: parse_env_or("SUBVISOR_RELOAD_INTERVAL", 3600)?,
            api: ApiServerConfig {
                enabled: get_env_or("API_ENABLED", "true").parse().unwrap_or(true),
                host: get_env_or("API_HOST", "0.0.0.0"),
                port: parse_port("API_PORT", 3000)?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Proxy URL of the engine's HTTP inbound, as seen from this host
    pub fn probe_proxy_url(&self) -> String {
        let host = match self.engine.listen.as_str() {
            "" | "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "::1",
            other => other,
        };
        format!("http://{}", format_tcp_addr(host, self.engine.http_port))
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs.max(1))
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.dial_timeout_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.subscription.fetch_timeout_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs.max(1))
    }

    pub fn probe_backoff(&self) -> Duration {
        Duration::from_millis(self.probe.backoff_ms)
    }

    /// Get the admin API address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_subscription_url() -> Result<String> {
    let raw = env::var("SUBVISOR_SUBSCRIBE_URL").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SubvisorError::InvalidConfig(
            "SUBVISOR_SUBSCRIBE_URL is required".into(),
        ));
    }

    let url = Url::parse(raw).map_err(|e| {
        SubvisorError::InvalidConfig(format!("SUBVISOR_SUBSCRIBE_URL must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(SubvisorError::InvalidConfig(format!(
            "SUBVISOR_SUBSCRIBE_URL has unsupported scheme: {}",
            other
        ))),
    }
}

fn parse_port(key: &str, default: u16) -> Result<u16> {
    let port: u16 = parse_env_or(key, default)?;
    if port == 0 {
        return Err(SubvisorError::InvalidConfig(format!(
            "{} must be a valid port number",
            key
        )));
    }
    Ok(port)
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SubvisorError::InvalidConfig(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
