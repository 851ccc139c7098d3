use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerSettings {
    /// Route scans into the payment confirmation flow instead of history.
    pub delivery_mode: bool,
    /// Webhook endpoint for the payment flow. Empty means unconfigured.
    pub webhook_url: String,
    /// Rank rear-facing camera labels first when picking a default device.
    pub prefer_rear_camera: bool,
    /// Start scanning shortly after launch.
    pub auto_start: bool,
    pub chime_enabled: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            delivery_mode: false,
            webhook_url: String::new(),
            prefer_rear_camera: false,
            auto_start: false,
            chime_enabled: true,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ScannerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ScannerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn scanner(&self) -> ScannerSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, settings: ScannerSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &ScannerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
