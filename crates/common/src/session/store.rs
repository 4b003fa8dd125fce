use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::SessionError;
use crate::auth::UserData;

pub const SESSION_DATA_VERSION: u32 = 1;

/// What survives a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub version: u32,
    /// Hex transit key of a sign-in that has not completed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserData>,
}

/// Persists the session blob.
///
/// Called with the session lock held, so implementations must not call back
/// into the session.
pub trait SessionStore: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<Option<SessionData>, SessionError>;
    fn save(&self, data: &SessionData) -> Result<(), SessionError>;
    fn delete(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Option<SessionData>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current persisted blob, for inspection in tests
    pub fn snapshot(&self) -> Option<SessionData> {
        self.inner.lock().clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionData>, SessionError> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, data: &SessionData) -> Result<(), SessionError> {
        *self.inner.lock() = Some(data.clone());
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionError> {
        self.inner.lock().take();
        Ok(())
    }
}

/// JSON file store. The file holds the app private key, so it is written
/// owner-readable only.
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
    fn load(&self) -> Result<Option<SessionData>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let data: SessionData = serde_json::from_str(&contents)?;
        if data.version > SESSION_DATA_VERSION {
            return Err(SessionError::UnsupportedVersion(data.version));
        }
        Ok(Some(data))
    }

    fn save(&self, data: &SessionData) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        // a leftover tmp would keep whatever mode it was created with
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        write_private(&tmp, contents.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The file is owner-only from the moment it exists; it holds the app key
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));
        assert!(store.load().unwrap().is_none());

        let data = SessionData {
            version: SESSION_DATA_VERSION,
            transit_key: Some("ab".repeat(32)),
            user_data: None,
        };
        store.save(&data).unwrap();
        assert_eq!(store.load().unwrap(), Some(data));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
        // deleting twice is fine
        store.delete().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_replaces_leftover_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, "stale").unwrap();
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSessionStore::new(path.clone());
        let data = SessionData {
            version: SESSION_DATA_VERSION,
            transit_key: Some("cd".repeat(32)),
            user_data: None,
        };
        store.save(&data).unwrap();

        assert!(!tmp.exists());
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap(), Some(data));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_private_creates_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        write_private(&path, b"key").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read(&path).unwrap(), b"key");
        // never reuses an existing file
        assert!(write_private(&path, b"again").is_err());
    }

    #[test]
    fn test_file_store_rejects_newer_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"version": 99}"#).unwrap();
        assert!(matches!(
            FileSessionStore::new(path).load(),
            Err(SessionError::UnsupportedVersion(99))
        ));
    }
}
