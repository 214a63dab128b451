//! Persisted OCR settings and presets
//!
//! Settings live in a durable JSON document: the default engine id, a
//! parameter map per engine, and a global timeout/retry policy. They are
//! lazily created with defaults on first access and merged with engine
//! defaults on every read, so new default parameters introduced later still
//! surface for old settings files. Presets are named (engine, parameter-map)
//! snapshots in a sibling document.

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Recursively merge `user` over `defaults`.
///
/// For keys whose values are objects on both sides the merge recurses;
/// otherwise the user value replaces the default wholesale. Keys absent from
/// `user` keep their defaults.
pub fn deep_merge(defaults: &Value, user: &Value) -> Value {
    match (defaults, user) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                match (merged.get(key), value) {
                    (Some(Value::Object(_)), Value::Object(_)) => {
                        let nested = deep_merge(&merged[key], value);
                        merged.insert(key.clone(), nested);
                    }
                    _ => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        _ => user.clone(),
    }
}

/// Global OCR execution policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalOcrSettings {
    #[serde(default = "crate::config::default_ocr_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "crate::config::default_ocr_max_retries")]
    pub max_retries: u32,
}

impl Default for GlobalOcrSettings {
    fn default() -> Self {
        Self {
            timeout_secs: crate::config::default_ocr_timeout_secs(),
            max_retries: crate::config::default_ocr_max_retries(),
        }
    }
}

/// Persisted OCR settings document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Preferred engine id; `None` falls through the registry's resolution order
    #[serde(default)]
    pub default_engine: Option<String>,

    /// Per-engine parameter overrides
    #[serde(default)]
    pub engines: BTreeMap<String, Value>,

    /// Global timeout/retry policy
    #[serde(default)]
    pub global: GlobalOcrSettings,
}

impl OcrSettings {
    /// Persisted parameter overrides for one engine
    pub fn engine_params(&self, engine_id: &str) -> Value {
        self.engines
            .get(engine_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// A named (engine, parameter-map) snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrPreset {
    pub engine: String,
    pub settings: Value,
    pub created_at: String,
}

/// Durable storage for OCR settings and presets
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings_path: PathBuf,
    presets_path: PathBuf,
}

impl SettingsStore {
    pub fn new(settings_path: PathBuf, presets_path: PathBuf) -> Self {
        Self {
            settings_path,
            presets_path,
        }
    }

    /// Load settings, creating the file with defaults on first access.
    ///
    /// An unreadable or malformed file falls back to defaults with a warning
    /// rather than failing the registry.
    pub fn load_settings(&self) -> OcrSettings {
        if !self.settings_path.exists() {
            let settings = OcrSettings::default();
            if let Err(e) = self.save_settings(&settings) {
                warn!("Failed to write default OCR settings: {}", e);
            }
            return settings;
        }

        match std::fs::read_to_string(&self.settings_path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "OCR settings file {:?} unreadable ({}); using defaults",
                    self.settings_path, e
                );
                OcrSettings::default()
            }
        }
    }

    /// Persist settings
    pub fn save_settings(&self, settings: &OcrSettings) -> Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.settings_path, content)?;
        debug!("Saved OCR settings to {:?}", self.settings_path);
        Ok(())
    }

    /// Replace the persisted parameter map for one engine
    pub fn update_engine_params(&self, engine_id: &str, params: Value) -> Result<OcrSettings> {
        let mut settings = self.load_settings();
        settings.engines.insert(engine_id.to_string(), params);
        self.save_settings(&settings)?;
        Ok(settings)
    }

    /// Set the preferred default engine
    pub fn set_default_engine(&self, engine_id: Option<String>) -> Result<OcrSettings> {
        let mut settings = self.load_settings();
        settings.default_engine = engine_id;
        self.save_settings(&settings)?;
        Ok(settings)
    }

    /// Load all presets; malformed file falls back to empty with a warning
    pub fn load_presets(&self) -> BTreeMap<String, OcrPreset> {
        if !self.presets_path.exists() {
            return BTreeMap::new();
        }

        match std::fs::read_to_string(&self.presets_path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(presets) => presets,
            Err(e) => {
                warn!(
                    "OCR presets file {:?} unreadable ({}); starting empty",
                    self.presets_path, e
                );
                BTreeMap::new()
            }
        }
    }

    /// Create or overwrite a preset by name
    pub fn save_preset(&self, name: &str, engine: &str, settings: Value) -> Result<()> {
        let mut presets = self.load_presets();
        presets.insert(
            name.to_string(),
            OcrPreset {
                engine: engine.to_string(),
                settings,
                created_at: Utc::now().to_rfc3339(),
            },
        );
        self.write_presets(&presets)
    }

    /// Delete a preset; a no-op if the name is absent. Returns whether it existed.
    pub fn delete_preset(&self, name: &str) -> Result<bool> {
        let mut presets = self.load_presets();
        let existed = presets.remove(name).is_some();
        if existed {
            self.write_presets(&presets)?;
        }
        Ok(existed)
    }

    fn write_presets(&self, presets: &BTreeMap<String, OcrPreset>) -> Result<()> {
        if let Some(parent) = self.presets_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(presets)?;
        std::fs::write(&self.presets_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (SettingsStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::new(
            tmp.path().join("ocr_settings.json"),
            tmp.path().join("ocr_presets.json"),
        );
        (store, tmp)
    }

    #[test]
    fn test_deep_merge_precedence() {
        let defaults = json!({"a": {"x": 1, "y": 2}});
        let user = json!({"a": {"x": 9}});
        assert_eq!(deep_merge(&defaults, &user), json!({"a": {"x": 9, "y": 2}}));
    }

    #[test]
    fn test_deep_merge_scalar_replaces_wholesale() {
        let defaults = json!({"a": {"x": 1}, "b": 5});
        let user = json!({"a": "flat", "c": true});
        assert_eq!(
            deep_merge(&defaults, &user),
            json!({"a": "flat", "b": 5, "c": true})
        );
    }

    #[test]
    fn test_deep_merge_nested_levels() {
        let defaults = json!({"a": {"b": {"c": 1, "d": 2}}});
        let user = json!({"a": {"b": {"c": 7}}});
        assert_eq!(
            deep_merge(&defaults, &user),
            json!({"a": {"b": {"c": 7, "d": 2}}})
        );
    }

    #[test]
    fn test_settings_lazily_created() {
        let (store, tmp) = setup();
        let settings = store.load_settings();
        assert!(settings.default_engine.is_none());
        // First access persisted the defaults.
        assert!(tmp.path().join("ocr_settings.json").exists());
    }

    #[test]
    fn test_settings_round_trip() {
        let (store, _tmp) = setup();
        store
            .update_engine_params("tesseract", json!({"lang": "deu"}))
            .unwrap();
        store
            .set_default_engine(Some("tesseract".to_string()))
            .unwrap();

        let settings = store.load_settings();
        assert_eq!(settings.default_engine.as_deref(), Some("tesseract"));
        assert_eq!(settings.engine_params("tesseract"), json!({"lang": "deu"}));
        assert_eq!(settings.engine_params("other"), json!({}));
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let (store, tmp) = setup();
        std::fs::write(tmp.path().join("ocr_settings.json"), "{ not json").unwrap();

        let settings = store.load_settings();
        assert!(settings.default_engine.is_none());
        assert!(settings.engines.is_empty());
    }

    #[test]
    fn test_preset_create_overwrite_delete() {
        let (store, _tmp) = setup();
        store
            .save_preset("scans", "tesseract", json!({"psm": 6}))
            .unwrap();
        store
            .save_preset("scans", "tesseract", json!({"psm": 4}))
            .unwrap();

        let presets = store.load_presets();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets["scans"].settings, json!({"psm": 4}));

        assert!(store.delete_preset("scans").unwrap());
        // Deleting an absent preset is a no-op, not an error.
        assert!(!store.delete_preset("scans").unwrap());
    }
}
