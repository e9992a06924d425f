//! Persistent credential store, keyed by (collection, token endpoint,
//! credentials id).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::token::{now_ms, TokenBundle};

/// The composite identity a bundle is stored under. Mismatched keys never
/// alias: two `credentials_id` values at the same endpoint are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub collection_uid: String,
    pub token_url: String,
    pub credentials_id: String,
}

impl StoreKey {
    /// The key a request configuration resolves to: bundles are always
    /// addressed by the access-token endpoint, even when refresh exchanges
    /// go elsewhere.
    #[must_use]
    pub fn for_request(config: &crate::config::OAuthRequestConfig, collection_uid: &str) -> Self {
        Self::new(
            collection_uid,
            config.access_token_url.as_str(),
            &config.credentials_id,
        )
    }

    pub fn new(
        collection_uid: impl Into<String>,
        token_url: impl Into<String>,
        credentials_id: impl Into<String>,
    ) -> Self {
        Self {
            collection_uid: collection_uid.into(),
            token_url: token_url.into(),
            credentials_id: credentials_id.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: StoreKey,
    bundle: TokenBundle,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: Vec<StoredEntry>,
}

/// Process-wide credential state.
///
/// Backed by a JSON file that survives restarts (written atomically via a
/// sibling temp file and rename), or purely in-memory for tests and
/// ephemeral callers. All access is serialised behind one lock.
#[derive(Debug)]
pub struct CredentialStore {
    entries: Mutex<HashMap<StoreKey, TokenBundle>>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    /// A store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Open (or create) a persistent store at `path`.
    ///
    /// An unreadable directory is an error; an unparsable file is not — the
    /// store starts empty and overwrites it on the next write.
    ///
    /// # Errors
    /// Fails with [`Error::Store`] if the parent directory cannot be created
    /// or the file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::store)?;
        }
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<StoreFile>(&bytes) {
                Ok(file) => file
                    .entries
                    .into_iter()
                    .map(|e| (e.key, e.bundle))
                    .collect(),
                Err(e) => {
                    tracing::warn!("Discarding unparsable credential store file: {e}");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::store(e)),
        };
        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    /// Open the store at the platform data directory
    /// (`<data_dir>/tokenmint/credentials.json`).
    ///
    /// # Errors
    /// See [`CredentialStore::open`]; also fails when the platform exposes no
    /// data directory.
    pub fn open_default() -> Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| {
            Error::store(io::Error::new(
                io::ErrorKind::NotFound,
                "no platform data directory",
            ))
        })?;
        Self::open(base.join("tokenmint").join("credentials.json"))
    }

    /// The stored bundle at `key`, if any. Never fails on a missing key.
    #[must_use]
    pub fn get(&self, key: &StoreKey) -> Option<TokenBundle> {
        self.entries.lock().expect("Non-poisoned lock").get(key).cloned()
    }

    /// Store a bundle under `key`, stamping `created_at` with the receipt
    /// time. Bundles without an access token, or carrying an `error` member,
    /// are ignored. Returns the stored copy.
    ///
    /// # Errors
    /// Fails with [`Error::Store`] if the file cannot be written.
    pub fn put(&self, key: &StoreKey, mut bundle: TokenBundle) -> Result<Option<TokenBundle>> {
        if !bundle.has_access_token() || bundle.has_error() {
            tracing::debug!("Ignoring token bundle without usable access token");
            return Ok(None);
        }
        bundle.created_at = Some(now_ms());
        let mut entries = self.entries.lock().expect("Non-poisoned lock");
        entries.insert(key.clone(), bundle.clone());
        self.flush(&entries)?;
        Ok(Some(bundle))
    }

    /// Remove the bundle at `key`. Idempotent; neighbours under other
    /// `credentials_id` values are untouched.
    ///
    /// # Errors
    /// Fails with [`Error::Store`] if the file cannot be written.
    pub fn clear(&self, key: &StoreKey) -> Result<()> {
        let mut entries = self.entries.lock().expect("Non-poisoned lock");
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    /// Seed a bundle without stamping `created_at`, so tests can stage
    /// tokens that expired in the past.
    #[cfg(test)]
    pub(crate) fn seed(&self, key: &StoreKey, bundle: TokenBundle) {
        self.entries
            .lock()
            .expect("Non-poisoned lock")
            .insert(key.clone(), bundle);
    }

    /// Write the full map to disk, atomically replacing the previous file.
    fn flush(&self, entries: &HashMap<StoreKey, TokenBundle>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut sorted: Vec<StoredEntry> = entries
            .iter()
            .map(|(key, bundle)| StoredEntry {
                key: key.clone(),
                bundle: bundle.clone(),
            })
            .collect();
        sorted.sort_by(|a, b| {
            (&a.key.collection_uid, &a.key.token_url, &a.key.credentials_id).cmp(&(
                &b.key.collection_uid,
                &b.key.token_url,
                &b.key.credentials_id,
            ))
        });
        let file = StoreFile {
            version: 1,
            entries: sorted,
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| Error::store(e.into()))?;
        let tmp = tmp_path(path);
        fs::write(&tmp, json).map_err(Error::store)?;
        fs::rename(&tmp, path).map_err(Error::store)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("credentials.json"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}
