use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cartkeeper_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigField {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<ConfigField> = effective_values(&config)
        .into_iter()
        .map(|(key, value)| ConfigField {
            key,
            value,
            source: field_source(key, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(render_line));

    let data = serde_json::to_value(&fields).ok();
    CommandResult::success_with_data("config", lines.join("\n"), data)
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let unset = || "<unset>".to_string();
    let commerce = &config.commerce;

    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("commerce.catalog_url", commerce.catalog_url.clone().unwrap_or_else(unset)),
        ("commerce.cart_init_url", commerce.cart_init_url.clone().unwrap_or_else(unset)),
        ("commerce.order_url", commerce.order_url.clone().unwrap_or_else(unset)),
        (
            "commerce.publishable_api_key",
            commerce
                .publishable_api_key
                .as_ref()
                .map(|key| redact_key(key.expose_secret()))
                .unwrap_or_else(unset),
        ),
        ("commerce.request_timeout_secs", commerce.request_timeout_secs.to_string()),
        ("checkout.max_submit_attempts", config.checkout.max_submit_attempts.to_string()),
        ("checkout.retry_base_delay_ms", config.checkout.retry_base_delay_ms.to_string()),
        ("checkout.retry_max_delay_ms", config.checkout.retry_max_delay_ms.to_string()),
        ("memory.context_window", config.memory.context_window.to_string()),
        ("memory.session_idle_secs", config.memory.session_idle_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_ascii_lowercase()),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("cartkeeper.toml"), PathBuf::from("config/cartkeeper.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

/// `commerce.order_url` is overridden by `CARTKEEPER_COMMERCE_ORDER_URL`.
fn env_key(key_path: &str) -> String {
    format!("CARTKEEPER_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn field_source(
    key_path: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
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

fn render_line(field: &ConfigField) -> String {
    format!("- {} = {} (source: {})", field.key, field.value, field.source)
}

/// Keeps the key's type prefix (`pk_`) and hides the rest.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('_') {
        return format!("{prefix}_***");
    }

    "<redacted>".to_string()
}
