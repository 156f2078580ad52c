use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use reengage_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

const ENV_PREFIX: &str = "REENGAGE_";

/// Shorter environment names accepted alongside the canonical ones.
const ENV_ALIASES: &[(&str, &str)] =
    &[("logging.level", "REENGAGE_LOG_LEVEL"), ("logging.format", "REENGAGE_LOG_FORMAT")];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    match render(&config, config_file_doc.as_ref(), config_file_path.as_deref()) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 3),
    }
}

pub fn render(
    config: &AppConfig,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> Result<String, toml::ser::Error> {
    let effective = Value::try_from(config)?;
    let mut entries = Vec::new();
    flatten("", &effective, &mut entries);

    let mut lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
    ];
    for (key_path, value) in entries {
        lines.push(render_line(
            &key_path,
            &value,
            field_source(&key_path, config_file_doc, config_file_path),
        ));
    }
    Ok(lines.join("\n"))
}

fn flatten(prefix: &str, value: &Value, entries: &mut Vec<(String, String)>) {
    match value {
        Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten(&path, child, entries);
            }
        }
        Value::String(text) => entries.push((prefix.to_string(), text.clone())),
        other => entries.push((prefix.to_string(), other.to_string())),
    }
}

pub fn env_key(key_path: &str) -> String {
    format!("{ENV_PREFIX}{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("reengage.toml"), PathBuf::from("config/reengage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let canonical = env_key(key_path);
    let alias = ENV_ALIASES.iter().find(|(path, _)| *path == key_path).map(|(_, alias)| *alias);
    for name in std::iter::once(canonical.as_str()).chain(alias) {
        if env::var(name).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({name})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
