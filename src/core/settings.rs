//! Persistence of the last-used conversion options.

use std::path::{Path, PathBuf};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::debug;
use crate::processing::RawOptions;
use crate::utils::{ConverterError, ConverterResult};

/// Key the options are stored under inside the settings file.
pub const SETTINGS_KEY: &str = "converter_settings";

/// JSON file store for [`RawOptions`].
///
/// The file holds an object so other keys written by a front end survive a save.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads saved options. A missing file or key is not an error.
    pub async fn load(&self) -> ConverterResult<Option<RawOptions>> {
        let Some(mut root) = self.read_root().await? else {
            debug!("No settings file at {}", self.path.display());
            return Ok(None);
        };

        match root.remove(SETTINGS_KEY) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, options: &RawOptions) -> ConverterResult<()> {
        let mut root = self.read_root().await?.unwrap_or_default();
        root.insert(SETTINGS_KEY.to_string(), serde_json::to_value(options)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&Value::Object(root))?;
        fs::write(&self.path, json).await?;
        debug!("Settings saved to {}", self.path.display());
        Ok(())
    }

    /// Removes the saved options, keeping any other keys in the file.
    pub async fn clear(&self) -> ConverterResult<()> {
        let Some(mut root) = self.read_root().await? else {
            return Ok(());
        };
        if root.remove(SETTINGS_KEY).is_some() {
            let json = serde_json::to_vec_pretty(&Value::Object(root))?;
            fs::write(&self.path, json).await?;
        }
        Ok(())
    }

    async fn read_root(&self) -> ConverterResult<Option<Map<String, Value>>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&data)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(ConverterError::settings(format!(
                "Settings file is not a JSON object: {}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));

        let options = RawOptions {
            format: Some("webp".into()),
            quality: Some(75),
            ..RawOptions::default()
        };
        store.save(&options).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(options));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn keeps_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
        store.save(&RawOptions::default()).await.unwrap();

        let root: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(root["theme"], "dark");
        assert!(root.get(SETTINGS_KEY).is_some());
    }

    #[tokio::test]
    async fn malformed_file_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2").unwrap();
        let err = SettingsStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ConverterError::Settings(_)));
    }
}
