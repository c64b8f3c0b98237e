use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value as JsonValue};

use crate::error::Error;
use crate::types::{TokenPair, UserProfile};

/// Keys of the persisted session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Serialized profile JSON, tokens included.
    User,
    AccessToken,
    RefreshToken,
}

impl StorageKey {
    pub const ALL: [StorageKey; 3] = [Self::User, Self::AccessToken, Self::RefreshToken];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
        }
    }
}

/// Client-side key–value persistence for the session.
///
/// Operations are synchronous: the manager calls them while holding its state
/// lock so that the persisted and in-memory copies change together.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStorage for KeyringStorage {
///     fn get(&self, key: StorageKey) -> Result<Option<String>, Error> {
///         self.entry(key.as_str()).get_password().map(Some).or_else(not_found)
///     }
///     // ...
/// }
/// ```
pub trait SessionStorage: Send + Sync + 'static {
    fn get(&self, key: StorageKey) -> Result<Option<String>, Error>;

    fn set(&self, key: StorageKey, value: &str) -> Result<(), Error>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: StorageKey) -> Result<(), Error>;
}

impl<T: SessionStorage> SessionStorage for Arc<T> {
    fn get(&self, key: StorageKey) -> Result<Option<String>, Error> {
        (**self).get(key)
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), Error> {
        (**self).set(key, value)
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        (**self).remove(key)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local storage; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>, Error> {
        Ok(lock(&self.entries).get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), Error> {
        lock(&self.entries).insert(key, value.to_owned());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        lock(&self.entries).remove(&key);
        Ok(())
    }
}

/// Storage backed by a single JSON object file, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStorage {
    /// Use `path` as the backing file. It is created on the first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, JsonValue>, Error> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", self.path.display()))),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_all(&self, entries: &Map<String, JsonValue>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("{}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>, Error> {
        let _guard = lock(&self.guard);
        let entries = self.read_all()?;
        Ok(entries
            .get(key.as_str())
            .and_then(JsonValue::as_str)
            .map(str::to_owned))
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), Error> {
        let _guard = lock(&self.guard);
        let mut entries = self.read_all()?;
        entries.insert(key.as_str().to_owned(), JsonValue::from(value));
        self.write_all(&entries)
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        let _guard = lock(&self.guard);
        let mut entries = self.read_all()?;
        if entries.remove(key.as_str()).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Storage selected at runtime from configuration.
#[derive(Debug)]
pub enum AnyStorage {
    Memory(MemoryStorage),
    File(FileStorage),
}

impl SessionStorage for AnyStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>, Error> {
        match self {
            Self::Memory(s) => s.get(key),
            Self::File(s) => s.get(key),
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), Error> {
        match self {
            Self::Memory(s) => s.set(key, value),
            Self::File(s) => s.set(key, value),
        }
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        match self {
            Self::Memory(s) => s.remove(key),
            Self::File(s) => s.remove(key),
        }
    }
}

/// Persist the profile and both tokens.
pub(crate) fn save_session<S: SessionStorage>(
    storage: &S,
    profile: &UserProfile,
) -> Result<(), Error> {
    storage.set(StorageKey::User, &serde_json::to_string(profile)?)?;
    put_or_remove(storage, StorageKey::AccessToken, profile.access_token.as_deref())?;
    put_or_remove(storage, StorageKey::RefreshToken, profile.refresh_token.as_deref())
}

/// Persist a token pair without a profile.
pub(crate) fn save_tokens<S: SessionStorage>(storage: &S, tokens: &TokenPair) -> Result<(), Error> {
    storage.set(StorageKey::AccessToken, &tokens.access_token)?;
    storage.set(StorageKey::RefreshToken, &tokens.refresh_token)
}

fn put_or_remove<S: SessionStorage>(
    storage: &S,
    key: StorageKey,
    value: Option<&str>,
) -> Result<(), Error> {
    match value {
        Some(v) => storage.set(key, v),
        None => storage.remove(key),
    }
}

/// Load the persisted session.
///
/// Returns `None` unless both a profile and an access token are stored.
/// Tokens missing from the stored profile are backfilled from their own keys.
pub(crate) fn load_session<S: SessionStorage>(storage: &S) -> Result<Option<UserProfile>, Error> {
    let Some(raw_user) = storage.get(StorageKey::User)? else {
        return Ok(None);
    };
    let Some(access_token) = storage.get(StorageKey::AccessToken)? else {
        return Ok(None);
    };
    let refresh_token = storage.get(StorageKey::RefreshToken)?;

    let mut profile: UserProfile = serde_json::from_str(&raw_user)?;
    if profile.access_token.is_none() {
        profile.access_token = Some(access_token);
    }
    if profile.refresh_token.is_none() {
        profile.refresh_token = refresh_token;
    }
    profile.derive_fields();
    Ok(Some(profile))
}

/// Remove every persisted key. Every key is attempted; the first failure is
/// returned.
pub(crate) fn clear_session<S: SessionStorage>(storage: &S) -> Result<(), Error> {
    StorageKey::ALL
        .into_iter()
        .map(|key| storage.remove(key))
        .fold(Ok(()), |acc, res| acc.and(res))
}
