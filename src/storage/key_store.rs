use crate::common::{AttendanceError, Result};
use crate::storage::crypto::{MasterKey, KEY_LEN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

const KEYSET_VERSION: u32 = 1;

/// Source of the master key protecting reference photos.
pub trait KeyStore: Send + Sync {
    fn master_key(&self) -> Result<MasterKey>;
}

/// Holds a key supplied by the embedding host.
pub struct StaticKeyStore {
    key: MasterKey,
}

impl StaticKeyStore {
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }
}

impl KeyStore for StaticKeyStore {
    fn master_key(&self) -> Result<MasterKey> {
        Ok(self.key.clone())
    }
}

#[derive(Serialize, Deserialize)]
struct Keyset {
    version: u32,
    created_at: i64,
    key: Vec<u8>,
}

/// Keeps the master key in a bincode keyset file, generated on first use and
/// readable by the owner only.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_keyset(&self) -> Result<MasterKey> {
        let data = fs::read(&self.path)?;
        let mut keyset: Keyset = bincode::deserialize(&data)
            .map_err(|e| AttendanceError::Storage(format!("Failed to deserialize keyset: {}", e)))?;

        if keyset.version != KEYSET_VERSION {
            keyset.key.zeroize();
            return Err(AttendanceError::Storage(format!(
                "Unsupported keyset version {}", keyset.version
            )));
        }

        let result = <[u8; KEY_LEN]>::try_from(keyset.key.as_slice())
            .map(MasterKey::new)
            .map_err(|_| AttendanceError::Crypto(format!(
                "Keyset holds a {}-byte key, expected {}", keyset.key.len(), KEY_LEN
            )));
        keyset.key.zeroize();
        result
    }

    fn create_keyset(&self) -> Result<MasterKey> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let key = MasterKey::generate();
        let mut keyset = Keyset {
            version: KEYSET_VERSION,
            created_at: chrono::Utc::now().timestamp(),
            key: key.expose().to_vec(),
        };
        let encoded = bincode::serialize(&keyset)
            .map_err(|e| AttendanceError::Storage(format!("Failed to serialize keyset: {}", e)));
        keyset.key.zeroize();
        let mut encoded = encoded?;

        // Owner-only temp file, linked into place only once fully written.
        let written = tempfile::Builder::new()
            .prefix(".keyset.")
            .suffix(".tmp")
            .tempfile_in(dir)
            .and_then(|mut temp| {
                temp.write_all(&encoded)?;
                temp.as_file().sync_all()?;
                Ok(temp)
            });
        encoded.zeroize();

        let published = written.and_then(|temp| {
            temp.persist_noclobber(&self.path).map(|_| ()).map_err(|e| e.error)
        });

        match published {
            Ok(()) => {
                tracing::info!("Created photo master key at {:?}", self.path);
                Ok(key)
            }
            // Another process created the keyset first; use theirs.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.read_keyset(),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn master_key(&self) -> Result<MasterKey> {
        if self.path.exists() {
            self.read_keyset()
        } else {
            self.create_keyset()
        }
    }
}
