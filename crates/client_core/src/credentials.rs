use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

pub const ACCESS_TOKEN_KEY: &str = "access_token";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    /// `None` for empty tokens.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() {
            return None;
        }
        Some(Self(Zeroizing::new(token)))
    }

    pub fn bearer(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Option<Credential>;
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credential store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write credential store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credential store {path} is not a JSON object of strings: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub struct FileCredentialStore {
    path: PathBuf,
    key: String,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: ACCESS_TOKEN_KEY.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_token(&self, token: &str) -> Result<(), CredentialError> {
        let mut entries = self.read_entries()?;
        entries.insert(self.key.clone(), token.to_string());
        self.write_entries(&entries)
    }

    /// Removes the token; returns whether one was present.
    pub fn clear_token(&self) -> Result<bool, CredentialError> {
        let mut entries = self.read_entries()?;
        let removed = entries.remove(&self.key).is_some();
        if removed {
            self.write_entries(&entries)?;
        }
        Ok(removed)
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| CredentialError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        let write_err = |source| CredentialError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let raw = serde_json::to_string_pretty(entries).map_err(|source| {
            CredentialError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, raw).map_err(write_err)
    }
}

impl CredentialProvider for FileCredentialStore {
    fn access_token(&self) -> Option<Credential> {
        match self.read_entries() {
            Ok(mut entries) => entries.remove(&self.key).and_then(Credential::new),
            Err(err) => {
                warn!(error = %err, "credential store unreadable; treating token as absent");
                None
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialProvider for MemoryCredentialStore {
    fn access_token(&self) -> Option<Credential> {
        self.token
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .and_then(Credential::new)
    }
}
