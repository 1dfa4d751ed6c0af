use std::env;
use std::str::FromStr;

use crate::config::ConfigError;

pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_trimmed_env(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

pub(crate) fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match optional_trimmed_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::ParseNumber(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_list_env(key: &str, default: &[&str]) -> Vec<String> {
    let parsed = optional_trimmed_env(key)
        .map(|raw| parse_csv_list(&raw))
        .unwrap_or_default();

    if parsed.is_empty() {
        default.iter().map(|item| (*item).to_string()).collect()
    } else {
        parsed
    }
}

pub(crate) fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
