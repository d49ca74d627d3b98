use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Command line settings layered over the file, never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub transcoder_binary: Option<String>,
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(ref address) = self.bind_address {
            config.web.bind_address = address.clone();
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(ref binary) = self.transcoder_binary {
            config.transcoder.binary = binary.clone();
        }
    }
}

/// Configuration store backed by a JSON file
///
/// Uses `ArcSwap` for lock-free reads; sessions snapshot the transcoder
/// settings from here on every connect. Readers see the file contents with
/// the [`RuntimeOverrides`] applied, the file only ever receives the former.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    /// Exactly what is on disk
    persisted: Arc<ArcSwap<AppConfig>>,
    overrides: Arc<ArcSwap<RuntimeOverrides>>,
    /// Effective configuration served to readers
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    /// Open a configuration file, creating it with defaults if missing
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let config = Self::load_config(path).await?;
        Ok(Self::with_config(path, config))
    }

    /// In-memory store that never touches the filesystem until updated
    pub fn ephemeral(path: &Path, config: AppConfig) -> Self {
        Self::with_config(path, config)
    }

    fn with_config(path: &Path, config: AppConfig) -> Self {
        let config = Arc::new(config);
        Self {
            path: path.to_path_buf(),
            persisted: Arc::new(ArcSwap::new(config.clone())),
            overrides: Arc::new(ArcSwap::from_pointee(RuntimeOverrides::default())),
            cache: Arc::new(ArcSwap::new(config)),
        }
    }

    async fn load_config(path: &Path) -> Result<AppConfig> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Create default config
                let config = AppConfig::default();
                Self::save_config(path, &config).await?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        // Write then rename so a crash never leaves a half-written file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Get current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Update the persisted configuration with a closure, then swap the cache
    ///
    /// The closure sees the file contents, not the overrides. Last write
    /// wins for concurrent updates.
    pub async fn update<F>(&self, f: F) -> Result<Arc<AppConfig>>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (**self.persisted.load()).clone();
        f(&mut config);

        Self::save_config(&self.path, &config).await?;

        self.persisted.store(Arc::new(config));
        Ok(self.refresh())
    }

    /// Layer command line overrides over the persisted configuration
    pub fn set_overrides(&self, overrides: RuntimeOverrides) {
        self.overrides.store(Arc::new(overrides));
        self.refresh();
    }

    fn refresh(&self) -> Arc<AppConfig> {
        let mut effective = (**self.persisted.load()).clone();
        self.overrides.load().apply(&mut effective);
        let effective = Arc::new(effective);
        self.cache.store(effective.clone());
        effective
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioMode;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = ConfigStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.get().web.port, 9999);

        store
            .update(|c| {
                c.web.port = 9000;
                c.transcoder.audio = AudioMode::Aac;
            })
            .await
            .unwrap();

        let config = store.get();
        assert_eq!(config.web.port, 9000);

        // Reopen and verify persistence
        let store2 = ConfigStore::open(&path).await.unwrap();
        let config = store2.get();
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.transcoder.audio, AudioMode::Aac);
    }

    #[tokio::test]
    async fn test_runtime_override_is_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path).await.unwrap();

        store.set_overrides(RuntimeOverrides {
            transcoder_binary: Some("/opt/ffmpeg/bin/ffmpeg".to_string()),
            ..Default::default()
        });
        assert_eq!(store.get().transcoder.binary, "/opt/ffmpeg/bin/ffmpeg");

        let reopened = ConfigStore::open(&path).await.unwrap();
        assert_eq!(reopened.get().transcoder.binary, "ffmpeg");
    }

    #[tokio::test]
    async fn test_update_keeps_overrides_off_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path).await.unwrap();

        store.set_overrides(RuntimeOverrides {
            port: Some(1234),
            ..Default::default()
        });
        let updated = store
            .update(|c| c.transcoder.preset = "veryfast".to_string())
            .await
            .unwrap();

        // Readers still see the override
        assert_eq!(updated.web.port, 1234);
        assert_eq!(store.get().web.port, 1234);
        assert_eq!(store.get().transcoder.preset, "veryfast");

        let reopened = ConfigStore::open(&path).await.unwrap();
        assert_eq!(reopened.get().web.port, 9999);
        assert_eq!(reopened.get().transcoder.preset, "veryfast");
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = RuntimeOverrides {
            bind_address: Some("127.0.0.1".to_string()),
            port: Some(8080),
            transcoder_binary: None,
        };
        assert!(!overrides.is_empty());
        assert!(RuntimeOverrides::default().is_empty());

        let mut config = AppConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.web.bind_address, "127.0.0.1");
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.transcoder.binary, "ffmpeg");
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        match ConfigStore::open(&path).await {
            Err(AppError::Config(msg)) => assert!(msg.contains("config.json")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected config error"),
        }
    }
}
