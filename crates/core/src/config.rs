use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::MAX_OFFERS;

pub const DEFAULT_CONFIG_FILE: &str = "staffflow.toml";
pub const NESTED_CONFIG_FILE: &str = "config/staffflow.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Endpoints of the master-agreement catalog and the candidate source.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub catalog_base_url: Option<String>,
    pub candidate_base_url: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub candidate_timeout_secs: u64,
    pub max_offers_per_slot: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub catalog_base_url: Option<String>,
    pub candidate_base_url: Option<String>,
    pub upstream_api_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://staffflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            upstream: UpstreamConfig {
                catalog_base_url: None,
                candidate_base_url: None,
                api_token: None,
                timeout_secs: 10,
            },
            workflow: WorkflowConfig {
                candidate_timeout_secs: 10,
                max_offers_per_slot: MAX_OFFERS,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(upstream) = patch.upstream {
            if let Some(catalog_base_url) = upstream.catalog_base_url {
                self.upstream.catalog_base_url = Some(catalog_base_url);
            }
            if let Some(candidate_base_url) = upstream.candidate_base_url {
                self.upstream.candidate_base_url = Some(candidate_base_url);
            }
            if let Some(api_token) = upstream.api_token {
                self.upstream.api_token = Some(secret_value(api_token));
            }
            if let Some(timeout_secs) = upstream.timeout_secs {
                self.upstream.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(candidate_timeout_secs) = workflow.candidate_timeout_secs {
                self.workflow.candidate_timeout_secs = candidate_timeout_secs;
            }
            if let Some(max_offers_per_slot) = workflow.max_offers_per_slot {
                self.workflow.max_offers_per_slot = max_offers_per_slot;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STAFFFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("STAFFFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("STAFFFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("STAFFFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("STAFFFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STAFFFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STAFFFLOW_SERVER_PORT") {
            self.server.port = parse_u16("STAFFFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STAFFFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("STAFFFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("STAFFFLOW_UPSTREAM_CATALOG_BASE_URL") {
            self.upstream.catalog_base_url = Some(value);
        }
        if let Some(value) = read_env("STAFFFLOW_UPSTREAM_CANDIDATE_BASE_URL") {
            self.upstream.candidate_base_url = Some(value);
        }
        if let Some(value) = read_env("STAFFFLOW_UPSTREAM_API_TOKEN") {
            self.upstream.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("STAFFFLOW_UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = parse_u64("STAFFFLOW_UPSTREAM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("STAFFFLOW_WORKFLOW_CANDIDATE_TIMEOUT_SECS") {
            self.workflow.candidate_timeout_secs =
                parse_u64("STAFFFLOW_WORKFLOW_CANDIDATE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STAFFFLOW_WORKFLOW_MAX_OFFERS_PER_SLOT") {
            self.workflow.max_offers_per_slot =
                parse_u32("STAFFFLOW_WORKFLOW_MAX_OFFERS_PER_SLOT", &value)?;
        }

        let log_level =
            read_env("STAFFFLOW_LOGGING_LEVEL").or_else(|| read_env("STAFFFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STAFFFLOW_LOGGING_FORMAT").or_else(|| read_env("STAFFFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(catalog_base_url) = overrides.catalog_base_url {
            self.upstream.catalog_base_url = Some(catalog_base_url);
        }
        if let Some(candidate_base_url) = overrides.candidate_base_url {
            self.upstream.candidate_base_url = Some(candidate_base_url);
        }
        if let Some(api_token) = overrides.upstream_api_token {
            self.upstream.api_token = Some(secret_value(api_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_upstream(&self.upstream)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Finds the config file the loader would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("upstream.catalog_base_url", &upstream.catalog_base_url),
        ("upstream.candidate_base_url", &upstream.candidate_base_url),
    ] {
        if let Some(url) = value {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if let Some(token) = &upstream.api_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.api_token must not be blank when set".to_string(),
            ));
        }
    }

    if upstream.timeout_secs == 0 || upstream.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "upstream.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.candidate_timeout_secs == 0 || workflow.candidate_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "workflow.candidate_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if workflow.max_offers_per_slot == 0 || workflow.max_offers_per_slot > MAX_OFFERS {
        return Err(ConfigError::Validation(format!(
            "workflow.max_offers_per_slot must be in range 1..={MAX_OFFERS}"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    upstream: Option<UpstreamPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamPatch {
    catalog_base_url: Option<String>,
    candidate_base_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    candidate_timeout_secs: Option<u64>,
    max_offers_per_slot: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
