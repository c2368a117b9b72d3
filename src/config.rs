//! Configuration types.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_API_BASE, LlmConfig};
use crate::trip::manager::ManagerConfig;

/// Default listen port. The upstream chat backend conventionally runs on 8000.
pub const DEFAULT_PORT: u16 = 8080;

/// Which transport supplies slot inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceBackendKind {
    /// A chat backend reached over REST.
    Rest,
    /// A language model prompted directly.
    Model,
}

impl FromStr for InferenceBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "model" | "llm" => Ok(Self::Model),
            other => Err(ConfigError::InvalidValue {
                key: "TRIP_PLANNER_BACKEND".to_string(),
                message: format!("expected 'rest' or 'model', got '{other}'"),
            }),
        }
    }
}

/// Planner server configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Port the HTTP server listens on.
    pub port: u16,
    pub backend: InferenceBackendKind,
    /// Base URL of the REST chat backend.
    pub chat_api_base: String,
    /// Base URL of the itinerary service.
    pub itinerary_api_base: String,
    pub inference_timeout: Duration,
    pub itinerary_timeout: Duration,
    /// Conversations idle this long are pruned.
    pub idle_timeout: Duration,
    pub max_conversations: usize,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    /// Present only for the model backend.
    pub llm: Option<LlmConfig>,
}

impl PlannerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get, "TRIP_PLANNER_PORT", DEFAULT_PORT)?;
        let backend = match get("TRIP_PLANNER_BACKEND") {
            Some(raw) => raw.parse()?,
            None => InferenceBackendKind::Rest,
        };

        let chat_api_base =
            get("TRIP_PLANNER_CHAT_API_BASE").unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
        let itinerary_api_base =
            get("TRIP_PLANNER_ITINERARY_API_BASE").unwrap_or_else(|| chat_api_base.clone());
        check_upstream("TRIP_PLANNER_ITINERARY_API_BASE", &itinerary_api_base, port)?;
        if backend == InferenceBackendKind::Rest {
            check_upstream("TRIP_PLANNER_CHAT_API_BASE", &chat_api_base, port)?;
        }

        let inference_timeout =
            Duration::from_secs(parse_or(&get, "TRIP_PLANNER_INFERENCE_TIMEOUT_SECS", 30u64)?);
        let itinerary_timeout =
            Duration::from_secs(parse_or(&get, "TRIP_PLANNER_ITINERARY_TIMEOUT_SECS", 120u64)?);
        let idle_timeout =
            Duration::from_secs(parse_or(&get, "TRIP_PLANNER_IDLE_TIMEOUT_SECS", 3600u64)?);
        let max_conversations = parse_or(&get, "TRIP_PLANNER_MAX_CONVERSATIONS", 10_000usize)?;
        if max_conversations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIP_PLANNER_MAX_CONVERSATIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let cors_origins: Vec<String> = get("TRIP_PLANNER_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let llm = match backend {
            InferenceBackendKind::Rest => None,
            InferenceBackendKind::Model => {
                let api_key = get("LLM_API_KEY")
                    .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;
                Some(LlmConfig {
                    api_key: SecretString::from(api_key),
                    model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                    base_url: get("LLM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                    request_timeout: inference_timeout,
                })
            }
        };

        Ok(Self {
            port,
            backend,
            chat_api_base,
            itinerary_api_base,
            inference_timeout,
            itinerary_timeout,
            idle_timeout,
            max_conversations,
            cors_origins,
            llm,
        })
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            inference_timeout: self.inference_timeout,
            itinerary_timeout: self.itinerary_timeout,
            idle_timeout: self.idle_timeout,
            max_conversations: self.max_conversations,
        }
    }
}

/// Reject an upstream base URL that is malformed or points back at this server.
fn check_upstream(key: &str, base: &str, own_port: u16) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };
    let url = reqwest::Url::parse(base).map_err(|e| invalid(format!("'{base}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| invalid(format!("'{base}' has no host")))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let local = match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    };
    if local && url.port_or_known_default() == Some(own_port) {
        return Err(invalid(format!(
            "'{base}' points at this server's own port {own_port}"
        )));
    }
    Ok(())
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
