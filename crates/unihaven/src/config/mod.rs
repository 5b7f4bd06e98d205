use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_MAIL_FROM: &str = "noreply@unihaven.local";

/// Deployment stage the service runs in, taken from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnvironment {
    #[default]
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "live" => Self::Production,
            "test" | "testing" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the service reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub mail: MailConfig,
    pub seed_demo_data: bool,
}

impl AppConfig {
    /// Reads `.env` when present, then the `APP_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            environment: env::var("APP_ENV")
                .map(|label| AppEnvironment::from_label(&label))
                .unwrap_or_default(),
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig {
                log_level: var_or("APP_LOG_LEVEL", DEFAULT_LOG_LEVEL),
            },
            mail: MailConfig::from_env()?,
            seed_demo_data: flag("APP_SEED_DEMO")?,
        })
    }
}

fn var_or(name: &str, fallback: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn flag(name: &'static str) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { name, value: raw }),
    }
}

/// Address the HTTP listener binds to.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("APP_PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self {
            host: var_or("APP_HOST", DEFAULT_HOST),
            port,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost {
                    host: self.host.clone(),
                    source,
                })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Outbound mail settings for specialist notifications.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from_address: String,
    pub backend: MailBackend,
}

impl MailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("APP_MAIL_BACKEND") {
            Ok(raw) => MailBackend::parse(&raw).ok_or(ConfigError::InvalidMailBackend(raw))?,
            Err(_) => MailBackend::Console,
        };
        Ok(Self {
            from_address: var_or("APP_MAIL_FROM", DEFAULT_MAIL_FROM),
            backend,
        })
    }
}

/// Where notification mail ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailBackend {
    /// Every message is written to the tracing log.
    Console,
    /// Messages are kept in an in-process outbox.
    Memory,
}

impl MailBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" | "log" => Some(Self::Console),
            "memory" | "outbox" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a port number between 0 and 65535, got '{0}'")]
    InvalidPort(String),
    #[error("APP_HOST '{host}' is neither 'localhost' nor an IP address")]
    InvalidHost {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("APP_MAIL_BACKEND must be 'console' or 'memory', got '{0}'")]
    InvalidMailBackend(String),
    #[error("{name} must be a boolean flag, got '{value}'")]
    InvalidFlag { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    const VARS: [&str; 7] = [
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "APP_MAIL_FROM",
        "APP_MAIL_BACKEND",
        "APP_SEED_DEMO",
    ];

    /// Holds the process-wide env lock and starts from a clean slate.
    fn clean_env() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let guard = LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for name in VARS {
            env::remove_var(name);
        }
        guard
    }

    #[test]
    fn defaults_apply_without_env() {
        let _env = clean_env();
        let config = AppConfig::load().expect("defaults load");

        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.mail.backend, MailBackend::Console);
        assert_eq!(config.mail.from_address, DEFAULT_MAIL_FROM);
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn env_overrides_every_section() {
        let _env = clean_env();
        env::set_var("APP_ENV", "prod");
        env::set_var("APP_HOST", "localhost");
        env::set_var("APP_PORT", "9090");
        env::set_var("APP_LOG_LEVEL", "debug");
        env::set_var("APP_MAIL_FROM", "housing@unihaven.test");
        env::set_var("APP_MAIL_BACKEND", "Memory");
        env::set_var("APP_SEED_DEMO", "yes");

        let config = AppConfig::load().expect("config loads");

        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(
            config.server.socket_addr().expect("localhost resolves"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9090)
        );
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.mail.from_address, "housing@unihaven.test");
        assert_eq!(config.mail.backend, MailBackend::Memory);
        assert!(config.seed_demo_data);
    }

    #[test]
    fn malformed_values_are_reported() {
        let _env = clean_env();
        env::set_var("APP_PORT", "eighty");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidPort(raw)) if raw == "eighty"
        ));

        env::remove_var("APP_PORT");
        env::set_var("APP_MAIL_BACKEND", "pigeon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidMailBackend(raw)) if raw == "pigeon"
        ));

        env::remove_var("APP_MAIL_BACKEND");
        env::set_var("APP_SEED_DEMO", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag {
                name: "APP_SEED_DEMO",
                ..
            })
        ));
    }

    #[test]
    fn hostnames_other_than_localhost_are_rejected() {
        let server = ServerConfig {
            host: "unihaven.internal".to_string(),
            port: DEFAULT_PORT,
        };
        assert!(matches!(
            server.socket_addr(),
            Err(ConfigError::InvalidHost { host, .. }) if host == "unihaven.internal"
        ));
    }
}
