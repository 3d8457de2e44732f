use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::ExposeSecret;
use staffflow_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

struct ConfigFile {
    path: PathBuf,
    doc: Value,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: 2,
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let file = load_config_file(resolve_config_path(None));
    CommandResult { exit_code: 0, output: render(&config, file.as_ref()) }
}

fn render(config: &AppConfig, file: Option<&ConfigFile>) -> String {
    let upstream = &config.upstream;
    let fields: Vec<(&str, &str, String)> = vec![
        ("database.url", "STAFFFLOW_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "STAFFFLOW_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "STAFFFLOW_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        (
            "server.bind_address",
            "STAFFFLOW_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        ("server.port", "STAFFFLOW_SERVER_PORT", config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "STAFFFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "upstream.catalog_base_url",
            "STAFFFLOW_UPSTREAM_CATALOG_BASE_URL",
            upstream.catalog_base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        (
            "upstream.candidate_base_url",
            "STAFFFLOW_UPSTREAM_CANDIDATE_BASE_URL",
            upstream.candidate_base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        (
            "upstream.api_token",
            "STAFFFLOW_UPSTREAM_API_TOKEN",
            upstream
                .api_token
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |token| redact_token(token.expose_secret())),
        ),
        (
            "upstream.timeout_secs",
            "STAFFFLOW_UPSTREAM_TIMEOUT_SECS",
            upstream.timeout_secs.to_string(),
        ),
        (
            "workflow.candidate_timeout_secs",
            "STAFFFLOW_WORKFLOW_CANDIDATE_TIMEOUT_SECS",
            config.workflow.candidate_timeout_secs.to_string(),
        ),
        (
            "workflow.max_offers_per_slot",
            "STAFFFLOW_WORKFLOW_MAX_OFFERS_PER_SLOT",
            config.workflow.max_offers_per_slot.to_string(),
        ),
        ("logging.level", "STAFFFLOW_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "STAFFFLOW_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in fields {
        lines.push(format!("- {key} = {value} (source: {})", field_source(key, env_key, file)));
    }
    lines.join("\n")
}

fn load_config_file(path: Option<PathBuf>) -> Option<ConfigFile> {
    let path = path?;
    let raw = fs::read_to_string(&path).ok()?;
    let doc = raw.parse::<Value>().ok()?;
    Some(ConfigFile { path, doc })
}

fn field_source(key_path: &str, env_key: &str, file: Option<&ConfigFile>) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(file) = file {
        if contains_path(&file.doc, key_path) {
            return format!("file ({})", file.path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps at most the first four characters of a token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_never_render_in_full() {
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("sk-live-0123456789"), "sk-l***");
    }

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: toml::Value =
            "[upstream]\ncatalog_base_url = \"https://catalog.test\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "upstream.catalog_base_url"));
        assert!(!contains_path(&doc, "upstream.api_token"));
    }
}
