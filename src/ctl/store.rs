//! Durable storage of the control-plane credentials.
//!
//! The default store is a single pretty-printed JSON document. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! target, so a crash mid-write never leaves a half-written config behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::ctl::error::StoreError;
use crate::ctl::types::Config;

/// Load and persist one [`Config`] record.
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Config>, StoreError>;

    /// Replace the stored record wholesale.
    fn store(&self, config: &Config) -> Result<(), StoreError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.display_path(),
            source,
        }
    }
}

impl CredentialStore for JsonFileStore {
    fn load(&self) -> Result<Option<Config>, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let config: Config = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.display_path(),
            reason: e.to_string(),
        })?;

        debug!(path = %self.path.display(), "Loaded stored config");
        Ok(Some(config))
    }

    fn store(&self, config: &Config) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| self.io_error(e))?;

        let content = serde_json::to_string_pretty(config).map_err(|e| StoreError::Corrupt {
            path: self.display_path(),
            reason: e.to_string(),
        })?;

        // Created with 0600 permissions on unix
        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| self.io_error(e))?;
        temp.write_all(content.as_bytes())
            .map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        debug!(
            path = %self.path.display(),
            has_password = !config.password.expose_secret().is_empty(),
            "Config saved atomically"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn sample(user: &str) -> Config {
        Config {
            fqdn: "https://acme.example.com".to_string(),
            username: user.to_string(),
            password: SecretString::new("pw".to_string().into()),
            tenant: "service".to_string(),
            region: "RegionOne".to_string(),
            allow_insecure: true,
            proxy_url: "http://proxy:3128".to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("config.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("db").join("config.json"));

        store.store(&sample("ops@acme.io")).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.username, "ops@acme.io");
        assert_eq!(loaded.password.expose_secret(), "pw");
        assert!(loaded.allow_insecure);
        assert_eq!(loaded.proxy_url, "http://proxy:3128");
    }

    #[test]
    fn test_store_replaces_wholesale_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = JsonFileStore::new(&path);

        store.store(&sample("first")).unwrap();
        store.store(&sample("second")).unwrap();

        assert_eq!(store.load().unwrap().unwrap().username, "second");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temporary files left behind");
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{\"fqdn\": ").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let err = JsonFileStore::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        JsonFileStore::new(&path).store(&sample("u")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
