use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::ScheduleSpec;

const MAX_TTL_HOURS: u64 = 24 * 366;
const MAX_RETENTION_DAYS: u64 = 3_650;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub oracle: OracleConfig,
    pub scheduler: SchedulerConfig,
    pub workflow: WorkflowConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OracleConfig {
    pub kind: OracleKind,
    pub max_candidates: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cron: String,
    pub run_on_startup: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkflowConfig {
    pub recommendation_ttl_hours: u64,
    pub retention_days: u64,
    pub customer_timeout_secs: Option<u64>,
    pub max_concurrency: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    Heuristic,
    Disabled,
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
    pub oracle_kind: Option<OracleKind>,
    pub scheduler_enabled: Option<bool>,
    pub scheduler_cron: Option<String>,
    pub server_port: Option<u16>,
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
                url: "sqlite://reengage.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            oracle: OracleConfig { kind: OracleKind::Heuristic, max_candidates: 3 },
            scheduler: SchedulerConfig {
                enabled: true,
                cron: "0 2 */2 * *".to_string(),
                run_on_startup: false,
            },
            workflow: WorkflowConfig {
                recommendation_ttl_hours: 48,
                retention_days: 30,
                customer_timeout_secs: None,
                max_concurrency: 1,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for OracleKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported oracle kind `{other}` (expected heuristic|disabled)"
            ))),
        }
    }
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

impl WorkflowConfig {
    pub fn recommendation_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recommendation_ttl_hours.min(MAX_TTL_HOURS) as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.min(MAX_RETENTION_DAYS) as i64)
    }

    pub fn customer_timeout(&self) -> Option<Duration> {
        self.customer_timeout_secs.map(Duration::from_secs)
    }
}

impl SchedulerConfig {
    pub fn schedule(&self) -> Result<ScheduleSpec, ConfigError> {
        ScheduleSpec::parse(&self.cron).map_err(|error| {
            ConfigError::Validation(format!("scheduler.cron `{}` is invalid: {error}", self.cron))
        })
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("reengage.toml"));
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

        if let Some(oracle) = patch.oracle {
            if let Some(kind) = oracle.kind {
                self.oracle.kind = kind;
            }
            if let Some(max_candidates) = oracle.max_candidates {
                self.oracle.max_candidates = max_candidates;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(enabled) = scheduler.enabled {
                self.scheduler.enabled = enabled;
            }
            if let Some(cron) = scheduler.cron {
                self.scheduler.cron = cron;
            }
            if let Some(run_on_startup) = scheduler.run_on_startup {
                self.scheduler.run_on_startup = run_on_startup;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(ttl) = workflow.recommendation_ttl_hours {
                self.workflow.recommendation_ttl_hours = ttl;
            }
            if let Some(retention_days) = workflow.retention_days {
                self.workflow.retention_days = retention_days;
            }
            if let Some(timeout) = workflow.customer_timeout_secs {
                self.workflow.customer_timeout_secs = Some(timeout);
            }
            if let Some(max_concurrency) = workflow.max_concurrency {
                self.workflow.max_concurrency = max_concurrency;
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
        if let Some(value) = read_env("REENGAGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REENGAGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("REENGAGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REENGAGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REENGAGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REENGAGE_ORACLE_KIND") {
            self.oracle.kind = value.parse()?;
        }
        if let Some(value) = read_env("REENGAGE_ORACLE_MAX_CANDIDATES") {
            self.oracle.max_candidates = parse_usize("REENGAGE_ORACLE_MAX_CANDIDATES", &value)?;
        }

        if let Some(value) = read_env("REENGAGE_SCHEDULER_ENABLED") {
            self.scheduler.enabled = parse_bool("REENGAGE_SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("REENGAGE_SCHEDULER_CRON") {
            self.scheduler.cron = value;
        }
        if let Some(value) = read_env("REENGAGE_SCHEDULER_RUN_ON_STARTUP") {
            self.scheduler.run_on_startup =
                parse_bool("REENGAGE_SCHEDULER_RUN_ON_STARTUP", &value)?;
        }

        if let Some(value) = read_env("REENGAGE_WORKFLOW_RECOMMENDATION_TTL_HOURS") {
            self.workflow.recommendation_ttl_hours =
                parse_u64("REENGAGE_WORKFLOW_RECOMMENDATION_TTL_HOURS", &value)?;
        }
        if let Some(value) = read_env("REENGAGE_WORKFLOW_RETENTION_DAYS") {
            self.workflow.retention_days = parse_u64("REENGAGE_WORKFLOW_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("REENGAGE_WORKFLOW_CUSTOMER_TIMEOUT_SECS") {
            self.workflow.customer_timeout_secs =
                Some(parse_u64("REENGAGE_WORKFLOW_CUSTOMER_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = read_env("REENGAGE_WORKFLOW_MAX_CONCURRENCY") {
            self.workflow.max_concurrency =
                parse_usize("REENGAGE_WORKFLOW_MAX_CONCURRENCY", &value)?;
        }

        if let Some(value) = read_env("REENGAGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REENGAGE_SERVER_PORT") {
            self.server.port = parse_u16("REENGAGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("REENGAGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("REENGAGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("REENGAGE_LOGGING_LEVEL").or_else(|| read_env("REENGAGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REENGAGE_LOGGING_FORMAT").or_else(|| read_env("REENGAGE_LOG_FORMAT"));
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
        if let Some(oracle_kind) = overrides.oracle_kind {
            self.oracle.kind = oracle_kind;
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = enabled;
        }
        if let Some(cron) = overrides.scheduler_cron {
            self.scheduler.cron = cron;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_oracle(&self.oracle)?;
        validate_scheduler(&self.scheduler)?;
        validate_workflow(&self.workflow)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("reengage.toml"), PathBuf::from("config/reengage.toml")]
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

fn validate_oracle(oracle: &OracleConfig) -> Result<(), ConfigError> {
    if !(1..=7).contains(&oracle.max_candidates) {
        return Err(ConfigError::Validation(
            "oracle.max_candidates must be in range 1..=7".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    scheduler.schedule().map(|_| ())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.recommendation_ttl_hours == 0 || workflow.recommendation_ttl_hours > MAX_TTL_HOURS {
        return Err(ConfigError::Validation(format!(
            "workflow.recommendation_ttl_hours must be in range 1..={MAX_TTL_HOURS}"
        )));
    }
    if workflow.retention_days == 0 || workflow.retention_days > MAX_RETENTION_DAYS {
        return Err(ConfigError::Validation(format!(
            "workflow.retention_days must be in range 1..={MAX_RETENTION_DAYS}"
        )));
    }
    if matches!(workflow.customer_timeout_secs, Some(secs) if secs == 0 || secs > 300) {
        return Err(ConfigError::Validation(
            "workflow.customer_timeout_secs must be in range 1..=300 when set".to_string(),
        ));
    }
    if !(1..=32).contains(&workflow.max_concurrency) {
        return Err(ConfigError::Validation(
            "workflow.max_concurrency must be in range 1..=32".to_string(),
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    oracle: Option<OraclePatch>,
    scheduler: Option<SchedulerPatch>,
    workflow: Option<WorkflowPatch>,
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
struct OraclePatch {
    kind: Option<OracleKind>,
    max_candidates: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    enabled: Option<bool>,
    cron: Option<String>,
    run_on_startup: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    recommendation_ttl_hours: Option<u64>,
    retention_days: Option<u64>,
    customer_timeout_secs: Option<u64>,
    max_concurrency: Option<usize>,
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

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, OracleKind};

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
    fn defaults_validate_and_schedule_every_other_day() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("defaults should validate: {err}"))?;
        ensure(config.scheduler.cron == "0 2 */2 * *", "default cron should be every other day")?;
        ensure(config.workflow.recommendation_ttl().num_hours() == 48, "ttl should be 48h")?;
        ensure(config.workflow.retention().num_days() == 30, "retention should be 30 days")?;
        ensure(config.oracle.kind == OracleKind::Heuristic, "heuristic oracle by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_REENGAGE_DB_PATH", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("reengage.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_REENGAGE_DB_PATH}"

[workflow]
max_concurrency = 4
customer_timeout_secs = 20
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.workflow.max_concurrency == 4, "concurrency should come from file")?;
            ensure(
                config.workflow.customer_timeout_secs == Some(20),
                "customer timeout should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_REENGAGE_DB_PATH"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REENGAGE_LOG_LEVEL", "warn");
        env::set_var("REENGAGE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["REENGAGE_LOG_LEVEL", "REENGAGE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REENGAGE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("REENGAGE_SCHEDULER_CRON", "every 6h");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("reengage.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[scheduler]
cron = "30 3 * * *"
enabled = false

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
                    oracle_kind: Some(OracleKind::Disabled),
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
            ensure(config.scheduler.cron == "every 6h", "env cron should win over file")?;
            ensure(!config.scheduler.enabled, "file should disable the scheduler")?;
            ensure(
                config.oracle.kind == OracleKind::Disabled,
                "a disabled oracle is a valid configuration",
            )?;
            Ok(())
        })();

        clear_vars(&["REENGAGE_DATABASE_URL", "REENGAGE_SCHEDULER_CRON"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REENGAGE_SCHEDULER_CRON", "0 25 * * *");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("scheduler.cron")),
                "invalid cron should name the offending key",
            )
        })();

        clear_vars(&["REENGAGE_SCHEDULER_CRON"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REENGAGE_WORKFLOW_RETENTION_DAYS", "thirty");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "REENGAGE_WORKFLOW_RETENTION_DAYS"),
                "bad retention override should be reported by key",
            )
        })();

        clear_vars(&["REENGAGE_WORKFLOW_RETENTION_DAYS"]);
        result
    }

    #[test]
    fn concurrency_outside_range_is_rejected() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.workflow.max_concurrency = 0;
        ensure(config.validate().is_err(), "zero concurrency should be rejected")?;
        config.workflow.max_concurrency = 33;
        ensure(config.validate().is_err(), "concurrency above 32 should be rejected")?;
        config.workflow.max_concurrency = 8;
        ensure(config.validate().is_ok(), "concurrency 8 should be accepted")
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");
        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing file error".to_string()),
            Err(error) => error,
        };
        ensure(matches!(error, ConfigError::MissingConfigFile(_)), "missing file error expected")
    }
}
