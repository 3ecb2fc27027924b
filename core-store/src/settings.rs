//! Typed sync settings over the key/value settings table.

use crate::error::{Result, StoreError};
use crate::store::Store;
use std::fmt;
use std::str::FromStr;

/// Which directions a sync cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Both,
    DownloadOnly,
    UploadOnly,
}

impl SyncDirection {
    pub fn allows_download(&self) -> bool {
        matches!(self, SyncDirection::Both | SyncDirection::DownloadOnly)
    }

    pub fn allows_upload(&self) -> bool {
        matches!(self, SyncDirection::Both | SyncDirection::UploadOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Both => "both",
            SyncDirection::DownloadOnly => "download_only",
            SyncDirection::UploadOnly => "upload_only",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "both" => Ok(SyncDirection::Both),
            "download_only" => Ok(SyncDirection::DownloadOnly),
            "upload_only" => Ok(SyncDirection::UploadOnly),
            other => Err(StoreError::InvalidSetting {
                key: "sync_direction".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved sync settings with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub autosync_enabled: bool,
    pub sync_interval_minutes: u32,
    pub sync_direction: SyncDirection,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            autosync_enabled: true,
            sync_interval_minutes: 15,
            sync_direction: SyncDirection::Both,
        }
    }
}

/// Settings accessor over the store.
pub struct Settings<'a> {
    store: &'a Store,
}

impl<'a> Settings<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Read one raw setting, falling back to `default` when unset.
    pub async fn get(&self, key: &str, default: &str) -> Result<String> {
        let row = self
            .store
            .fetch_optional(
                "SELECT value FROM app_settings WHERE key = ?",
                &[key.into()],
            )
            .await?;
        Ok(row
            .and_then(|r| r.get("value").and_then(|v| v.as_str().map(String::from)))
            .unwrap_or_else(|| default.to_string()))
    }

    /// Upsert one raw setting.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.store
            .execute(
                "INSERT INTO app_settings (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                &[key.into(), value.into()],
            )
            .await?;
        Ok(())
    }

    /// Load the resolved sync settings. Malformed stored values fall back
    /// to the defaults rather than failing the cycle; the interval is
    /// clamped to at least one minute.
    pub async fn sync_settings(&self) -> Result<SyncSettings> {
        let defaults = SyncSettings::default();

        let enabled = self
            .get("autosync_enabled", "true")
            .await?
            .trim()
            .eq_ignore_ascii_case("true");
        let interval = self
            .get("sync_interval_minutes", "15")
            .await?
            .trim()
            .parse::<u32>()
            .unwrap_or(defaults.sync_interval_minutes)
            .max(1);
        let direction = self
            .get("sync_direction", "both")
            .await?
            .parse()
            .unwrap_or(defaults.sync_direction);

        Ok(SyncSettings {
            autosync_enabled: enabled,
            sync_interval_minutes: interval,
            sync_direction: direction,
        })
    }

    pub async fn set_sync_settings(&self, settings: &SyncSettings) -> Result<()> {
        self.set(
            "autosync_enabled",
            if settings.autosync_enabled { "true" } else { "false" },
        )
        .await?;
        self.set(
            "sync_interval_minutes",
            &settings.sync_interval_minutes.to_string(),
        )
        .await?;
        self.set("sync_direction", settings.sync_direction.as_str())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn defaults_apply_when_table_is_empty() {
        let store = Store::new(create_test_pool().await.unwrap());
        let settings = Settings::new(&store).sync_settings().await.unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[tokio::test]
    async fn roundtrip_and_clamp() {
        let store = Store::new(create_test_pool().await.unwrap());
        let settings = Settings::new(&store);

        settings
            .set_sync_settings(&SyncSettings {
                autosync_enabled: false,
                sync_interval_minutes: 30,
                sync_direction: SyncDirection::UploadOnly,
            })
            .await
            .unwrap();

        let loaded = settings.sync_settings().await.unwrap();
        assert!(!loaded.autosync_enabled);
        assert_eq!(loaded.sync_interval_minutes, 30);
        assert_eq!(loaded.sync_direction, SyncDirection::UploadOnly);

        settings.set("sync_interval_minutes", "0").await.unwrap();
        let clamped = settings.sync_settings().await.unwrap();
        assert_eq!(clamped.sync_interval_minutes, 1);
    }

    #[tokio::test]
    async fn malformed_direction_falls_back() {
        let store = Store::new(create_test_pool().await.unwrap());
        let settings = Settings::new(&store);
        settings.set("sync_direction", "sideways").await.unwrap();
        let loaded = settings.sync_settings().await.unwrap();
        assert_eq!(loaded.sync_direction, SyncDirection::Both);
    }
}
