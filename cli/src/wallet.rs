//! File-backed stand-in for the wallet extension's key handling.
//!
//! The key comes from `--aes-key` / `COFFER_AES_KEY` when given, otherwise
//! from `aes.key` in the data directory. Onboarding generates a fresh
//! 256-bit key and writes that file.

use async_trait::async_trait;
use rand::RngCore;
use std::path::{Path, PathBuf};

use coffer_core::config::AES_KEY_LENGTH;
use coffer_core::keys::{AesKey, KeyError, KeySource};

pub const KEY_FILE_NAME: &str = "aes.key";

pub struct FileKeySource {
    explicit: Option<String>,
    key_path: PathBuf,
}

impl FileKeySource {
    pub fn new(data_dir: &Path, explicit: Option<String>) -> Self {
        Self {
            explicit: explicit.filter(|k| !k.trim().is_empty()),
            key_path: data_dir.join(KEY_FILE_NAME),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn read_file(&self) -> Result<Option<AesKey>, KeyError> {
        match std::fs::read_to_string(&self.key_path) {
            Ok(contents) => Ok(Some(AesKey::new(contents.trim()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeyError::KeyRequestFailed(format!(
                "{}: {e}",
                self.key_path.display()
            ))),
        }
    }

    fn write_file(&self, key: &str) -> Result<(), KeyError> {
        let failed = |e: std::io::Error| {
            KeyError::KeyRequestFailed(format!("{}: {e}", self.key_path.display()))
        };
        std::fs::write(&self.key_path, key).map_err(failed)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.key_path, std::fs::Permissions::from_mode(0o600))
                .map_err(failed)?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeySource for FileKeySource {
    async fn fetch_key(&self) -> Result<AesKey, KeyError> {
        if let Some(key) = &self.explicit {
            return Ok(AesKey::new(key.trim()));
        }
        self.read_file()?.ok_or(KeyError::NotOnboarded)
    }

    async fn onboard(&self) -> Result<AesKey, KeyError> {
        if let Some(key) = &self.explicit {
            return Ok(AesKey::new(key.trim()));
        }
        if let Some(existing) = self.read_file()? {
            return Ok(existing);
        }

        let mut bytes = [0u8; AES_KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let key = hex::encode(bytes);
        self.write_file(&key)?;
        tracing::info!(path = %self.key_path.display(), "new AES key written");
        Ok(AesKey::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_before_onboarding_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileKeySource::new(dir.path(), None);
        assert_eq!(source.fetch_key().await, Err(KeyError::NotOnboarded));
    }

    #[tokio::test]
    async fn onboard_persists_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileKeySource::new(dir.path(), None);

        let created = source.onboard().await.unwrap();
        assert_eq!(created.expose().len(), AES_KEY_LENGTH * 2);
        assert_eq!(source.fetch_key().await.unwrap(), created);
        assert_eq!(source.onboard().await.unwrap(), created);
    }

    #[tokio::test]
    async fn explicit_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileKeySource::new(dir.path(), Some("k1".into()));
        assert_eq!(source.fetch_key().await.unwrap(), AesKey::new("k1"));
        assert!(!source.key_path().exists());
    }
}
