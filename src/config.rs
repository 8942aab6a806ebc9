#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::{MirrorError, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = ".lodestar/mirror.toml";
pub const URL_ENV_VAR: &str = "LODESTAR_MIRROR_URL";
const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";

/// Exponential backoff for reconnect attempts. Delays never shrink from one
/// attempt to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    pub endpoint: Url,
    pub reconnect: ReconnectPolicy,
    pub expiry_tick: Duration,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    pub snapshot_timeout: Duration,
    pub scopes: Vec<String>,
}

impl MirrorConfig {
    /// # Errors
    /// Returns `MirrorError::ConfigError` if the endpoint is not a ws/wss URL.
    pub fn for_endpoint(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            reconnect: ReconnectPolicy::default(),
            expiry_tick: Duration::from_millis(1000),
            ping_interval: Duration::from_millis(15_000),
            idle_timeout: Duration::from_millis(45_000),
            snapshot_timeout: Duration::from_millis(10_000),
            scopes: vec!["all".to_string()],
        })
    }

    /// # Errors
    /// Returns `MirrorError::ConfigError` if the endpoint is not a ws/wss URL.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "url": self.endpoint.as_str(),
            "reconnect_base_ms": duration_ms(self.reconnect.base_delay),
            "reconnect_multiplier": self.reconnect.multiplier,
            "reconnect_max_ms": duration_ms(self.reconnect.max_delay),
            "max_reconnect_attempts": self.reconnect.max_attempts,
            "expiry_tick_ms": duration_ms(self.expiry_tick),
            "ping_interval_ms": duration_ms(self.ping_interval),
            "idle_timeout_ms": duration_ms(self.idle_timeout),
            "snapshot_timeout_ms": duration_ms(self.snapshot_timeout),
            "scopes": self.scopes,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Loads the config file (if present) over the defaults, then applies the
/// environment override for the endpoint.
///
/// # Errors
/// Returns `MirrorError::ConfigError` if the file cannot be read or holds an
/// invalid value.
pub async fn load_config(path: Option<PathBuf>) -> Result<MirrorConfig> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let base = if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| MirrorError::ConfigError(format!("Failed to read config: {e}")))?;
        parse_config_content(&content)?
    } else {
        MirrorConfig::for_endpoint(DEFAULT_URL)?
    };

    match non_empty_env_var(URL_ENV_VAR) {
        Some(url) => base.with_endpoint(&url),
        None => Ok(base),
    }
}

/// # Errors
/// Returns `MirrorError::ConfigError` naming the first invalid key.
pub fn parse_config_content(content: &str) -> Result<MirrorConfig> {
    let mut config = MirrorConfig::for_endpoint(DEFAULT_URL)?;

    for line in content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = expand_env_vars(raw.trim().trim_matches('"'));
        match key {
            "url" => config = config.with_endpoint(&value)?,
            "reconnect_base_ms" => config.reconnect.base_delay = parse_millis(key, &value)?,
            "reconnect_max_ms" => config.reconnect.max_delay = parse_millis(key, &value)?,
            "reconnect_multiplier" => config.reconnect.multiplier = parse_multiplier(&value)?,
            "max_reconnect_attempts" => {
                config.reconnect.max_attempts = parse_number::<u32>(key, &value)?.max(1);
            }
            "expiry_tick_ms" => config.expiry_tick = parse_millis(key, &value)?,
            "ping_interval_ms" => config.ping_interval = parse_millis(key, &value)?,
            "idle_timeout_ms" => config.idle_timeout = parse_millis(key, &value)?,
            "snapshot_timeout_ms" => config.snapshot_timeout = parse_millis(key, &value)?,
            "scopes" => {
                config.scopes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|scope| !scope.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }

    Ok(config)
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| MirrorError::ConfigError(format!("Invalid endpoint URL {raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(MirrorError::ConfigError(format!(
            "Endpoint must use ws or wss, got {other}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| MirrorError::ConfigError(format!("Invalid value for {key}: {value}")))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    match parse_number::<u64>(key, value)? {
        0 => Err(MirrorError::ConfigError(format!("{key} must be positive"))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

fn parse_multiplier(value: &str) -> Result<f64> {
    let multiplier = parse_number::<f64>("reconnect_multiplier", value)?;
    if multiplier.is_finite() && multiplier >= 1.0 {
        Ok(multiplier)
    } else {
        Err(MirrorError::ConfigError(format!(
            "reconnect_multiplier must be a finite number >= 1.0, got {value}"
        )))
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_part = &result[start + 2..start + end];
            let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
            let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
            result.replace_range(start..=(start + end), &value);
        } else {
            break;
        }
    }
    result
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::{parse_config_content, MirrorConfig, ReconnectPolicy};
    use std::time::Duration;

    #[test]
    fn parse_reads_endpoint_and_tuning_keys() {
        let content = r#"# mirror settings
url = "wss://lodestar.example/ws"
reconnect_base_ms = 250
reconnect_multiplier = 1.5
max_reconnect_attempts = 4
expiry_tick_ms = 500
scopes = "agents, tasks,leases"
"#;
        let config = parse_config_content(content).unwrap();
        assert_eq!(config.endpoint.as_str(), "wss://lodestar.example/ws");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert!((config.reconnect.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.reconnect.max_attempts, 4);
        assert_eq!(config.expiry_tick, Duration::from_millis(500));
        assert_eq!(config.scopes, vec!["agents", "tasks", "leases"]);
    }

    #[test]
    fn env_default_expansion_applies_when_var_missing() {
        let content = "url = \"${LODESTAR_MIRROR_TEST_UNSET_VAR:-ws://fallback:9000/ws}\"";
        let config = parse_config_content(content).unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://fallback:9000/ws");
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(parse_config_content("url = \"http://not-a-socket\"").is_err());
        assert!(parse_config_content("reconnect_multiplier = 0.5").is_err());
        assert!(parse_config_content("expiry_tick_ms = 0").is_err());
        assert!(parse_config_content("idle_timeout_ms = soon").is_err());
    }

    #[test]
    fn backoff_is_non_decreasing_and_capped() {
        let policy = ReconnectPolicy::default();
        let delays = (1..=policy.max_attempts)
            .map(|attempt| policy.delay_for(attempt))
            .collect::<Vec<_>>();
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert!(delays.windows(2).all(|pair| pair[1] >= pair[0]));
        assert_eq!(delays.last().copied(), Some(policy.max_delay));
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
    }

    #[test]
    fn summary_reports_effective_values() {
        let config = MirrorConfig::for_endpoint("ws://127.0.0.1:8000/ws").unwrap();
        let summary = config.summary();
        assert_eq!(summary["max_reconnect_attempts"], 10);
        assert_eq!(summary["url"], "ws://127.0.0.1:8000/ws");
    }
}
