use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_SESSION_ID: &str = "default-session";
const SESSION_ID_MIN_LEN: usize = 3;
const SESSION_ID_SEPARATOR: char = '-';
const RANDOM_COMPONENT_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error(
        "invalid session id '{0}': must start with a letter or digit, be at least 3 characters, and contain only letters, digits, '-' or '_'"
    )]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence for a manually chosen session id. Callers treat every error
/// as "store unavailable".
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, SessionStoreError>;
    fn save(&self, session_id: &str) -> Result<(), SessionStoreError>;
    fn clear(&self) -> Result<(), SessionStoreError>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    value: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn with_value(session_id: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(session_id.into())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<String>, SessionStoreError> {
        Ok(self.lock().clone())
    }

    fn save(&self, session_id: &str) -> Result<(), SessionStoreError> {
        *self.lock() = Some(session_id.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *self.lock() = None;
        Ok(())
    }
}

/// Single-line file holding the persisted id. Writes go through a sibling
/// temp file and a rename so readers never see a torn value.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<String>, SessionStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, format!("{session_id}\n"))?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Resolves the active session id: explicit configuration, then the
/// persisted value, then [`DEFAULT_SESSION_ID`].
#[derive(Clone)]
pub struct SessionIdResolver {
    configured_id: Option<String>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionIdResolver {
    pub fn new(configured_id: Option<&str>, store: Option<Arc<dyn SessionStore>>) -> Self {
        let configured_id = configured_id
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != DEFAULT_SESSION_ID)
            .and_then(|id| {
                if is_valid_session_id(id) {
                    Some(id.to_string())
                } else {
                    warn!(session_id = id, "ignoring configured session id with invalid format");
                    None
                }
            });

        Self {
            configured_id,
            store,
        }
    }

    pub fn resolve_session_id(&self) -> String {
        if let Some(configured_id) = &self.configured_id {
            return configured_id.clone();
        }

        self.persisted_session_id()
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
    }

    pub fn set_session_id(&self, session_id: &str) -> Result<String, SessionIdError> {
        let session_id = session_id.trim();
        if !is_valid_session_id(session_id) {
            return Err(SessionIdError::Invalid(session_id.to_string()));
        }

        if let Some(store) = &self.store
            && let Err(err) = store.save(session_id)
        {
            debug!("session id not persisted: {err}");
        }

        Ok(session_id.to_string())
    }

    pub fn clear_session_id(&self) {
        if let Some(store) = &self.store
            && let Err(err) = store.clear()
        {
            debug!("persisted session id not cleared: {err}");
        }
    }

    pub fn has_explicit_override(&self) -> bool {
        self.configured_id.is_some()
    }

    fn persisted_session_id(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.load() {
            Ok(Some(session_id)) if is_valid_session_id(&session_id) => Some(session_id),
            Ok(Some(session_id)) => {
                warn!(session_id = %session_id, "ignoring persisted session id with invalid format");
                None
            }
            Ok(None) => None,
            Err(err) => {
                debug!("persisted session id unavailable: {err}");
                None
            }
        }
    }
}

pub fn generate_session_id(prefix: Option<&str>) -> String {
    let time_component = to_base36(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0));
    let random_component = Uuid::new_v4().simple().to_string();
    let random_component = &random_component[..RANDOM_COMPONENT_LEN];

    match prefix.and_then(sanitize_prefix) {
        Some(prefix) => format!(
            "{prefix}{SESSION_ID_SEPARATOR}{time_component}{SESSION_ID_SEPARATOR}{random_component}"
        ),
        None => format!("{time_component}{SESSION_ID_SEPARATOR}{random_component}"),
    }
}

pub fn is_valid_session_id(session_id: &str) -> bool {
    let mut chars = session_id.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_alphanumeric()
        && session_id.len() >= SESSION_ID_MIN_LEN
        && chars.all(is_session_id_char)
}

fn is_session_id_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn sanitize_prefix(prefix: &str) -> Option<String> {
    let cleaned = prefix
        .trim()
        .chars()
        .filter(|ch| is_session_id_char(*ch))
        .collect::<String>();

    cleaned
        .chars()
        .next()
        .filter(char::is_ascii_alphanumeric)
        .map(|_| cleaned)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut encoded = Vec::new();
    while value > 0 {
        encoded.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    encoded.reverse();
    String::from_utf8(encoded).unwrap_or_default()
}
