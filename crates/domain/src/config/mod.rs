mod connections;
mod executor;
mod llm;
mod observability;
mod risk;
mod server;
mod sessions;

pub use connections::*;
pub use executor::*;
pub use llm::*;
pub use observability::*;
pub use risk::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration, returning both errors (startup should
    /// abort) and warnings (startup may proceed). Empty vec is a clean bill.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }
        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: "provider base_url must not be empty".into(),
                });
            } else if !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        provider.base_url
                    ),
                });
            }
            if !provider.id.is_empty() && !seen_ids.insert(&provider.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider will shadow earlier one",
                        provider.id
                    ),
                });
            }
            let needs_credentials = matches!(provider.auth.mode, AuthMode::ApiKey | AuthMode::QueryParam);
            if needs_credentials {
                let has_env = provider.auth.env.as_ref().is_some_and(|v| !v.is_empty());
                let has_key = provider.auth.key.as_ref().is_some_and(|v| !v.is_empty());
                if !has_env && !has_key {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers[{i}].auth"),
                        message: format!(
                            "provider \"{}\" uses {:?} auth mode but has no auth.env or auth.key configured",
                            provider.id, provider.auth.mode
                        ),
                    });
                }
            }
        }

        let mut seen_conn_ids: HashSet<&str> = HashSet::new();
        for (i, conn) in self.connections.providers.iter().enumerate() {
            if conn.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("connections.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if !conn.id.is_empty() && !seen_conn_ids.insert(&conn.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("connections.providers[{i}].id"),
                    message: format!("duplicate connection provider id \"{}\"", conn.id),
                });
            }
            match conn.transport {
                crate::connection::Transport::Local if conn.command.is_empty() => {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("connections.providers[{i}].command"),
                        message: "local transport requires a non-empty command".into(),
                    });
                }
                crate::connection::Transport::Remote if conn.url.is_none() => {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("connections.providers[{i}].url"),
                        message: "remote transport requires a url".into(),
                    });
                }
                _ => {}
            }
        }

        if self.sessions.idle_timeout_minutes <= 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.idle_timeout_minutes".into(),
                message: "idle_timeout_minutes must be greater than 0".into(),
            });
        }

        if self.risk.confirmation_tokens.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "risk.confirmation_tokens".into(),
                message: "at least one confirmation token must be configured".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig { port: 8080, ..ServerConfig::default() },
            llm: LlmConfig {
                providers: vec![ProviderConfig {
                    id: "openai".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "https://api.openai.com/v1".into(),
                    auth: AuthConfig { mode: AuthMode::ApiKey, env: Some("OPENAI_API_KEY".into()), ..AuthConfig::default() },
                    default_model: None,
                }],
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "server.port").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "server.cors.allowed_origins").unwrap().severity,
            ConfigSeverity::Warning
        );
    }

    #[test]
    fn provider_api_key_mode_no_credentials_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth = AuthConfig { mode: AuthMode::ApiKey, ..AuthConfig::default() };
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "llm.providers[0].auth").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn duplicate_provider_ids_is_warning() {
        let mut cfg = valid_config();
        let mut second = cfg.llm.providers[0].clone();
        second.auth.env = Some("OPENAI_API_KEY_2".into());
        cfg.llm.providers.push(second);
        let issues = cfg.validate();
        let dup = issues.iter().find(|e| e.message.contains("duplicate provider id")).unwrap();
        assert_eq!(dup.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn local_connection_without_command_is_error() {
        let mut cfg = valid_config();
        cfg.connections.providers.push(ProviderConnectionConfig {
            id: "calendar".into(),
            transport: crate::connection::Transport::Local,
            command: String::new(),
            args: vec![],
            env: Default::default(),
            url: None,
        });
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "connections.providers[0].command").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn remote_connection_without_url_is_error() {
        let mut cfg = valid_config();
        cfg.connections.providers.push(ProviderConnectionConfig {
            id: "chat".into(),
            transport: crate::connection::Transport::Remote,
            command: String::new(),
            args: vec![],
            env: Default::default(),
            url: None,
        });
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "connections.providers[0].url").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn zero_idle_timeout_is_error() {
        let mut cfg = valid_config();
        cfg.sessions.idle_timeout_minutes = 0;
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "sessions.idle_timeout_minutes").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError { severity: ConfigSeverity::Error, field: "server.port".into(), message: "port must be greater than 0".into() };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
