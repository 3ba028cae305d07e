use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::conversation::{DEFAULT_CONTEXT_WINDOW, MAX_CONVERSATION_ENTRIES};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub commerce: CommerceConfig,
    pub checkout: CheckoutConfig,
    pub memory: MemoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Endpoints of the external commerce backend.
#[derive(Clone, Debug)]
pub struct CommerceConfig {
    pub catalog_url: Option<String>,
    pub cart_init_url: Option<String>,
    pub order_url: Option<String>,
    pub publishable_api_key: Option<SecretString>,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    pub max_submit_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    pub context_window: usize,
    /// Idle sessions older than this may drop their in-process flow state.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub catalog_url: Option<String>,
    pub cart_init_url: Option<String>,
    pub order_url: Option<String>,
    pub publishable_api_key: Option<String>,
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
                url: "sqlite://cartkeeper.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            commerce: CommerceConfig {
                catalog_url: None,
                cart_init_url: None,
                order_url: None,
                publishable_api_key: None,
                request_timeout_secs: 10,
            },
            checkout: CheckoutConfig {
                max_submit_attempts: 3,
                retry_base_delay_ms: 250,
                retry_max_delay_ms: 2_000,
            },
            memory: MemoryConfig { context_window: DEFAULT_CONTEXT_WINDOW, session_idle_secs: 1_800 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
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

impl CommerceConfig {
    pub fn require_order_url(&self) -> Result<&str, ConfigError> {
        required_url(&self.order_url, "commerce.order_url")
    }
}

fn required_url<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url),
        _ => Err(ConfigError::Validation(format!(
            "{key} is required (set it in cartkeeper.toml or CARTKEEPER_{})",
            key.replace('.', "_").to_ascii_uppercase()
        ))),
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
                options.config_path.unwrap_or_else(|| PathBuf::from("cartkeeper.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
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

        if let Some(commerce) = patch.commerce {
            if let Some(catalog_url) = commerce.catalog_url {
                self.commerce.catalog_url = Some(catalog_url);
            }
            if let Some(cart_init_url) = commerce.cart_init_url {
                self.commerce.cart_init_url = Some(cart_init_url);
            }
            if let Some(order_url) = commerce.order_url {
                self.commerce.order_url = Some(order_url);
            }
            if let Some(api_key) = commerce.publishable_api_key {
                self.commerce.publishable_api_key = Some(secret_value(api_key));
            }
            if let Some(request_timeout_secs) = commerce.request_timeout_secs {
                self.commerce.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(checkout) = patch.checkout {
            if let Some(max_submit_attempts) = checkout.max_submit_attempts {
                self.checkout.max_submit_attempts = max_submit_attempts;
            }
            if let Some(retry_base_delay_ms) = checkout.retry_base_delay_ms {
                self.checkout.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_max_delay_ms) = checkout.retry_max_delay_ms {
                self.checkout.retry_max_delay_ms = retry_max_delay_ms;
            }
        }

        if let Some(memory) = patch.memory {
            if let Some(context_window) = memory.context_window {
                self.memory.context_window = context_window;
            }
            if let Some(session_idle_secs) = memory.session_idle_secs {
                self.memory.session_idle_secs = session_idle_secs;
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
        if let Some(value) = read_env("CARTKEEPER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CARTKEEPER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CARTKEEPER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CARTKEEPER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CARTKEEPER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARTKEEPER_COMMERCE_CATALOG_URL") {
            self.commerce.catalog_url = Some(value);
        }
        if let Some(value) = read_env("CARTKEEPER_COMMERCE_CART_INIT_URL") {
            self.commerce.cart_init_url = Some(value);
        }
        if let Some(value) = read_env("CARTKEEPER_COMMERCE_ORDER_URL") {
            self.commerce.order_url = Some(value);
        }
        if let Some(value) = read_env("CARTKEEPER_COMMERCE_PUBLISHABLE_API_KEY") {
            self.commerce.publishable_api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CARTKEEPER_COMMERCE_REQUEST_TIMEOUT_SECS") {
            self.commerce.request_timeout_secs =
                parse_u64("CARTKEEPER_COMMERCE_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARTKEEPER_CHECKOUT_MAX_SUBMIT_ATTEMPTS") {
            self.checkout.max_submit_attempts =
                parse_u32("CARTKEEPER_CHECKOUT_MAX_SUBMIT_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("CARTKEEPER_CHECKOUT_RETRY_BASE_DELAY_MS") {
            self.checkout.retry_base_delay_ms =
                parse_u64("CARTKEEPER_CHECKOUT_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("CARTKEEPER_CHECKOUT_RETRY_MAX_DELAY_MS") {
            self.checkout.retry_max_delay_ms =
                parse_u64("CARTKEEPER_CHECKOUT_RETRY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("CARTKEEPER_MEMORY_CONTEXT_WINDOW") {
            self.memory.context_window = parse_usize("CARTKEEPER_MEMORY_CONTEXT_WINDOW", &value)?;
        }
        if let Some(value) = read_env("CARTKEEPER_MEMORY_SESSION_IDLE_SECS") {
            self.memory.session_idle_secs =
                parse_u64("CARTKEEPER_MEMORY_SESSION_IDLE_SECS", &value)?;
        }

        if let Some(value) = read_env("CARTKEEPER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CARTKEEPER_SERVER_PORT") {
            self.server.port = parse_u16("CARTKEEPER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CARTKEEPER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CARTKEEPER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CARTKEEPER_LOGGING_LEVEL").or_else(|| read_env("CARTKEEPER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARTKEEPER_LOGGING_FORMAT").or_else(|| read_env("CARTKEEPER_LOG_FORMAT"));
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
        if let Some(catalog_url) = overrides.catalog_url {
            self.commerce.catalog_url = Some(catalog_url);
        }
        if let Some(cart_init_url) = overrides.cart_init_url {
            self.commerce.cart_init_url = Some(cart_init_url);
        }
        if let Some(order_url) = overrides.order_url {
            self.commerce.order_url = Some(order_url);
        }
        if let Some(api_key) = overrides.publishable_api_key {
            self.commerce.publishable_api_key = Some(secret_value(api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_commerce(&self.commerce)?;
        validate_checkout(&self.checkout)?;
        validate_memory(&self.memory)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cartkeeper.toml"), PathBuf::from("config/cartkeeper.toml")]
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

fn validate_commerce(commerce: &CommerceConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("commerce.catalog_url", &commerce.catalog_url),
        ("commerce.cart_init_url", &commerce.cart_init_url),
        ("commerce.order_url", &commerce.order_url),
    ] {
        if let Some(url) = value {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    if let Some(api_key) = &commerce.publishable_api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "commerce.publishable_api_key must not be blank when set".to_string(),
            ));
        }
    }

    if commerce.request_timeout_secs == 0 || commerce.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "commerce.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_checkout(checkout: &CheckoutConfig) -> Result<(), ConfigError> {
    if checkout.max_submit_attempts == 0 || checkout.max_submit_attempts > 10 {
        return Err(ConfigError::Validation(
            "checkout.max_submit_attempts must be in range 1..=10".to_string(),
        ));
    }

    if checkout.retry_max_delay_ms < checkout.retry_base_delay_ms {
        return Err(ConfigError::Validation(
            "checkout.retry_max_delay_ms must not be below checkout.retry_base_delay_ms"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
    if memory.context_window == 0 || memory.context_window > MAX_CONVERSATION_ENTRIES {
        return Err(ConfigError::Validation(format!(
            "memory.context_window must be in range 1..={MAX_CONVERSATION_ENTRIES}"
        )));
    }
    if memory.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "memory.session_idle_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    commerce: Option<CommercePatch>,
    checkout: Option<CheckoutPatch>,
    memory: Option<MemoryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CommercePatch {
    catalog_url: Option<String>,
    cart_init_url: Option<String>,
    order_url: Option<String>,
    publishable_api_key: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutPatch {
    max_submit_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryPatch {
    context_window: Option<usize>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://cartkeeper.db", "default database url")?;
        ensure(config.checkout.max_submit_attempts == 3, "default submit attempts")?;
        ensure(config.memory.context_window == 3, "default context window")?;
        ensure(config.memory.session_idle_secs == 1_800, "default session idle time")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        ensure(config.commerce.require_order_url().is_err(), "order url is unset by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_COMMERCE_BASE", "https://commerce.example.test");
        env::set_var("TEST_PUBLISHABLE_KEY", "pk_from_env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cartkeeper.toml");
            fs::write(
                &path,
                r#"
[commerce]
catalog_url = "${TEST_COMMERCE_BASE}/catalog"
cart_init_url = "${TEST_COMMERCE_BASE}/cart-init"
order_url = "${TEST_COMMERCE_BASE}/orders"
publishable_api_key = "${TEST_PUBLISHABLE_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let order_url =
                config.commerce.require_order_url().map_err(|err| err.to_string())?;
            ensure(
                order_url == "https://commerce.example.test/orders",
                "order url should be interpolated from environment",
            )?;
            ensure(
                config
                    .commerce
                    .publishable_api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "pk_from_env")
                    .unwrap_or(false),
                "api key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_COMMERCE_BASE", "TEST_PUBLISHABLE_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("cartkeeper.toml");
        fs::write(&path, "[commerce]\norder_url = \"${CARTKEEPER_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected interpolation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "CARTKEEPER_TEST_UNSET_VAR"),
            "interpolation failure should name the variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTKEEPER_LOG_LEVEL", "warn");
        env::set_var("CARTKEEPER_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CARTKEEPER_LOG_LEVEL", "CARTKEEPER_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTKEEPER_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CARTKEEPER_COMMERCE_ORDER_URL", "https://env.example.test/orders");
        env::set_var("CARTKEEPER_CHECKOUT_MAX_SUBMIT_ATTEMPTS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cartkeeper.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[commerce]
order_url = "https://file.example.test/orders"
catalog_url = "https://file.example.test/catalog"

[checkout]
max_submit_attempts = 2

[memory]
session_idle_secs = 600

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.commerce.order_url.as_deref() == Some("https://env.example.test/orders"),
                "env order url should win over file and defaults",
            )?;
            ensure(
                config.commerce.catalog_url.as_deref()
                    == Some("https://file.example.test/catalog"),
                "file catalog url should win over defaults",
            )?;
            ensure(config.checkout.max_submit_attempts == 5, "env retry bound should win")?;
            ensure(config.memory.session_idle_secs == 600, "file session idle time should apply")?;
            Ok(())
        })();

        clear_vars(&[
            "CARTKEEPER_DATABASE_URL",
            "CARTKEEPER_COMMERCE_ORDER_URL",
            "CARTKEEPER_CHECKOUT_MAX_SUBMIT_ATTEMPTS",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTKEEPER_COMMERCE_ORDER_URL", "ftp://orders.example.test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("commerce.order_url")
            );
            ensure(has_message, "validation failure should mention commerce.order_url")
        })();

        clear_vars(&["CARTKEEPER_COMMERCE_ORDER_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTKEEPER_COMMERCE_REQUEST_TIMEOUT_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "CARTKEEPER_COMMERCE_REQUEST_TIMEOUT_SECS"),
                "override failure should name the variable",
            )
        })();

        clear_vars(&["CARTKEEPER_COMMERCE_REQUEST_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTKEEPER_COMMERCE_PUBLISHABLE_API_KEY", "pk_live_secret_value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("pk_live_secret_value"),
                "debug output should not contain the publishable key",
            )
        })();

        clear_vars(&["CARTKEEPER_COMMERCE_PUBLISHABLE_API_KEY"]);
        result
    }
}
