//! Durable key-value storage and the cookie mirror read by the route guard.

use crate::error::StorageError;
use crate::jwt::now_ms;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// Name of the cookie mirroring the access token.
pub const TOKEN_COOKIE_NAME: &str = "token";

/// Per-origin string store surviving restarts.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process store. Not durable; used when no session file is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON-file backed store. Each mutation rewrites the file through a
/// temporary sibling and a rename, so readers never see a torn file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.load()?;
        if mutate(&mut entries) {
            self.save(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        f.write_str(value)
    }
}

/// A cookie as written by the session layer. `max_age <= 0` expires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age: i64,
    pub same_site: SameSite,
}

impl MirrorCookie {
    pub fn is_expired(&self) -> bool {
        self.max_age <= 0
    }
}

impl fmt::Display for MirrorCookie {
    /// `Set-Cookie` header form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Max-Age={}; SameSite={}",
            self.name, self.value, self.path, self.max_age, self.same_site
        )
    }
}

pub trait CookieJar: Send + Sync {
    fn set_cookie(&self, cookie: &MirrorCookie) -> Result<(), StorageError>;

    /// Value of a live (non-expired) cookie.
    fn cookie(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    // name -> (value, absolute expiry in epoch ms)
    cookies: RwLock<HashMap<String, (String, i64)>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live cookies rendered as a request `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        let now = now_ms();
        let cookies = self.cookies.read().ok()?;
        let mut pairs: Vec<String> = cookies
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(name, (value, _))| format!("{}={}", name, value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        Some(pairs.join("; "))
    }
}

impl CookieJar for MemoryCookieJar {
    fn set_cookie(&self, cookie: &MirrorCookie) -> Result<(), StorageError> {
        let mut cookies = self.cookies.write().map_err(|_| StorageError::Poisoned)?;
        if cookie.is_expired() {
            cookies.remove(&cookie.name);
        } else {
            let expires_at = now_ms().saturating_add(cookie.max_age.saturating_mul(1000));
            cookies.insert(cookie.name.clone(), (cookie.value.clone(), expires_at));
        }
        Ok(())
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.read().ok()?;
        cookies
            .get(name)
            .filter(|(_, expires_at)| *expires_at > now_ms())
            .map(|(value, _)| value.clone())
    }
}
