use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "You are a friendly assistant for a refugee support charity. \
Answer questions about donations, volunteering, and the charity's programs briefly and kindly.";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the gateway.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub rate_limit: RateLimitConfig,
    pub store: StoreConfig,
    pub mail: MailConfig,
    pub chat: ChatConfig,
    pub outbound_timeout: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;
        let cors_origins = optional_env("APP_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let rate_limit = RateLimitConfig {
            window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", 60)?,
            max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10)?,
            max_tracked_clients: parse_env("RATE_LIMIT_MAX_CLIENTS", 10_000)?,
            trust_forwarded_for: parse_env("APP_TRUST_FORWARDED_FOR", false)?,
        };

        let firestore = match optional_env("FIRESTORE_PROJECT_ID") {
            Some(project_id) => Some(FirestoreConfig {
                project_id,
                access_token: optional_env("FIRESTORE_ACCESS_TOKEN").ok_or(
                    ConfigError::MissingSetting {
                        name: "FIRESTORE_ACCESS_TOKEN",
                        required_by: "FIRESTORE_PROJECT_ID",
                    },
                )?,
                base_url: optional_env("FIRESTORE_BASE_URL")
                    .unwrap_or_else(|| "https://firestore.googleapis.com/v1".to_string()),
            }),
            None => None,
        };

        let sendgrid_api_key = optional_env("SENDGRID_API_KEY");
        let from = optional_env("MAIL_FROM");
        if sendgrid_api_key.is_some() && from.is_none() {
            return Err(ConfigError::MissingSetting {
                name: "MAIL_FROM",
                required_by: "SENDGRID_API_KEY",
            });
        }
        let mail = MailConfig {
            sendgrid_api_key,
            from,
            inbox: optional_env("MAIL_INBOX"),
            donation_template_id: optional_env("MAIL_DONATION_TEMPLATE_ID"),
        };

        let chat = ChatConfig {
            api_key: optional_env("CHAT_API_KEY"),
            base_url: optional_env("CHAT_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: optional_env("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            system_prompt: optional_env("CHAT_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_CHAT_SYSTEM_PROMPT.to_string()),
        };

        let outbound_timeout = Duration::from_secs(parse_env("OUTBOUND_TIMEOUT_SECS", 10)?);

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                cors_origins,
            },
            telemetry: TelemetryConfig { log_level },
            rate_limit,
            store: StoreConfig { firestore },
            mail,
            chat,
            outbound_timeout,
        })
    }
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_env(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Per-client request budget shared by the mutating endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub max_tracked_clients: usize,
    /// Key clients by the first `X-Forwarded-For` hop instead of the socket peer.
    pub trust_forwarded_for: bool,
}

/// Document store selection. Without Firestore settings submissions live in memory.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub firestore: Option<FirestoreConfig>,
}

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub access_token: String,
    pub base_url: String,
}

/// Email provider settings.
#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub sendgrid_api_key: Option<String>,
    pub from: Option<String>,
    pub inbox: Option<String>,
    pub donation_template_id: Option<String>,
}

/// Hosted chat-completion settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidValue {
        name: &'static str,
        value: String,
    },
    MissingSetting {
        name: &'static str,
        required_by: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
            ConfigError::MissingSetting { name, required_by } => {
                write!(f, "{name} must be set when {required_by} is configured")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingSetting { .. } => None,
        }
    }
}
