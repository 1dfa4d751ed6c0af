use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_env::{optional_trimmed_env, parse_env, parse_list_env, require_env};
use crate::conversation::heuristics::DEFAULT_COMPLETION_PHRASES;
use crate::session::DEFAULT_SESSION_ID;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SESSION_NAME: &str = "Feedback session";
const DEFAULT_PRESENTATION_TITLE: &str = "Untitled presentation";
const DEFAULT_MAX_FOLLOW_UPS: u32 = 2;
const DEFAULT_SHORT_ANSWER_CHARS: usize = 40;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid number in env var {0}")]
    ParseNumber(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Collection-session metadata. Only `session_id` is later re-resolved
/// through [`crate::session::SessionIdResolver`]; the other fields are fixed
/// for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: String,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub presentation_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let created_at = match optional_trimmed_env("FEEDBACK_SESSION_CREATED_AT") {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|value| value.with_timezone(&Utc))
                .map_err(|_| {
                    ConfigError::InvalidConfiguration(format!(
                        "FEEDBACK_SESSION_CREATED_AT must be RFC 3339, got '{raw}'"
                    ))
                })?,
            None => Utc::now(),
        };

        Ok(Self {
            session_id: optional_trimmed_env("FEEDBACK_SESSION_ID")
                .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
            session_name: optional_trimmed_env("FEEDBACK_SESSION_NAME")
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            created_at,
            presentation_title: optional_trimmed_env("FEEDBACK_PRESENTATION_TITLE")
                .unwrap_or_else(|| DEFAULT_PRESENTATION_TITLE.to_string()),
            description: optional_trimmed_env("FEEDBACK_SESSION_DESCRIPTION"),
            database_name: optional_trimmed_env("FEEDBACK_DATABASE_NAME"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FollowUpConfig {
    pub max_follow_ups: u32,
    pub short_answer_chars: usize,
    pub completion_phrases: Vec<String>,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            max_follow_ups: DEFAULT_MAX_FOLLOW_UPS,
            short_answer_chars: DEFAULT_SHORT_ANSWER_CHARS,
            completion_phrases: DEFAULT_COMPLETION_PHRASES
                .iter()
                .map(|phrase| (*phrase).to_string())
                .collect(),
        }
    }
}

impl FollowUpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_follow_ups: parse_env("FEEDBACK_MAX_FOLLOW_UPS", DEFAULT_MAX_FOLLOW_UPS)?,
            short_answer_chars: parse_env(
                "FEEDBACK_SHORT_ANSWER_CHARS",
                DEFAULT_SHORT_ANSWER_CHARS,
            )?,
            completion_phrases: parse_list_env(
                "FEEDBACK_COMPLETION_PHRASES",
                DEFAULT_COMPLETION_PHRASES,
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    pub session: SessionConfig,
    pub session_file: Option<PathBuf>,
    pub follow_ups: FollowUpConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: optional_trimmed_env("BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
            migrations_dir: optional_trimmed_env("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../migrations")),
            session: SessionConfig::from_env()?,
            session_file: optional_trimmed_env("FEEDBACK_SESSION_FILE").map(PathBuf::from),
            follow_ups: FollowUpConfig::from_env()?,
        })
    }
}
