//! Identity store and its persistence adapters.

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{debug, warn};

/// Storage keys
pub mod keys {
    /// Current user identifier.
    pub const USER_ID: &str = concat!("tebex:", "user_id");

    /// Current basket identifier.
    pub const BASKET_IDENT: &str = concat!("tebex:", "basket_ident");
}

/// Persisted string slots.
pub trait StorageAdapter: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value by key
    fn set(&self, key: &str, value: &str);

    /// Remove a value by key
    fn remove(&self, key: &str);
}

/// In-memory storage, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// File-based storage.
///
/// Values live in `tebex.json` within the given directory.
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file in `storage_dir`.
    ///
    /// Returns `None` if the directory doesn't exist or the file can't be read.
    pub fn new(storage_dir: &Path) -> Option<Self> {
        if !storage_dir.is_dir() {
            return None;
        }

        let path = storage_dir.join("tebex.json");

        let cache = if path.exists() {
            let contents = std::fs::read_to_string(&path).ok()?;
            serde_json::from_str(&contents).unwrap_or_else(|error| {
                warn!(path = %path.display(), "discarding unreadable identity state: {error}");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        Some(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    fn save(&self) {
        let contents = {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*cache)
        };

        match contents {
            Ok(contents) => {
                if let Err(error) = std::fs::write(&self.path, contents) {
                    warn!(path = %self.path.display(), "failed to persist identity: {error}");
                }
            }
            Err(error) => warn!("failed to serialise identity: {error}"),
        }
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.save();
    }

    fn remove(&self, key: &str) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.save();
    }
}

impl Debug for FileStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}

/// Called with the abandoned basket identifier whenever it is cleared.
pub type BasketClearedListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Current user and basket identifiers.
///
/// Empty strings are treated as absent. Clearing the user also clears the
/// basket and every registered listener hears about it.
pub struct IdentityStore {
    storage: Arc<dyn StorageAdapter>,
    listeners: RwLock<Vec<BasketClearedListener>>,
}

impl IdentityStore {
    /// Identity backed by `storage`.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Current user identifier.
    pub fn user_id(&self) -> Option<String> {
        self.read(keys::USER_ID)
    }

    /// Set the current user.
    ///
    /// Switching to a different user abandons the current basket; an empty
    /// identifier is a logout.
    pub fn set_user_id(&self, user_id: &str) {
        if user_id.is_empty() {
            self.clear_user();
            return;
        }

        if self.user_id().is_some_and(|current| current != user_id) {
            self.clear_basket();
        }

        self.storage.set(keys::USER_ID, user_id);
    }

    /// Forget the current user and their basket.
    pub fn clear_user(&self) {
        self.storage.remove(keys::USER_ID);
        self.clear_basket();
    }

    /// Current basket identifier.
    pub fn basket_ident(&self) -> Option<String> {
        self.read(keys::BASKET_IDENT)
    }

    /// Persist the current basket identifier.
    pub fn set_basket_ident(&self, ident: &str) {
        if ident.is_empty() {
            self.clear_basket();
            return;
        }

        self.storage.set(keys::BASKET_IDENT, ident);
    }

    /// Forget the current basket, returning its identifier.
    pub fn clear_basket(&self) -> Option<String> {
        let ident = self.basket_ident();

        self.storage.remove(keys::BASKET_IDENT);

        if let Some(ident) = &ident {
            debug!(basket = %ident, "basket identifier cleared");

            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            for listener in listeners {
                listener(ident);
            }
        }

        ident
    }

    /// Register a listener for basket clearing.
    pub fn on_basket_cleared(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    fn read(&self, key: &str) -> Option<String> {
        self.storage.get(key).filter(|value| !value.is_empty())
    }
}

impl Debug for IdentityStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("IdentityStore")
            .field("user_id", &self.user_id())
            .field("basket_ident", &self.basket_ident())
            .finish_non_exhaustive()
    }
}
