use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::document::{CalibrationOption, ControllerOption, Selection, SettingsDocument};
use crate::error::StageError;

/// Where settings come from and where the selection record goes back to.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<SettingsDocument, StageError>;

    /// Overwrites only the given keys of the persisted selection record.
    fn update_selection(&self, changes: &Map<String, Value>) -> Result<(), StageError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFiles {
    calibration: String,
    controller: String,
    configuration: String,
}

impl Default for TableFiles {
    fn default() -> Self {
        Self {
            calibration: "calibrations.json".to_string(),
            controller: "controllers.json".to_string(),
            configuration: "presets.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveFile {
    #[serde(default)]
    files: TableFiles,
    #[serde(default)]
    settings: Selection,
    #[serde(default)]
    default: BTreeMap<String, f64>,
    #[serde(default)]
    ports: Vec<String>,
}

/// Directory of JSON files: `save.json` plus the three tables it names.
pub struct JsonSettingsStore {
    dir: PathBuf,
}

impl JsonSettingsStore {
    pub const SAVE_FILE: &'static str = "save.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn save_path(&self) -> PathBuf {
        self.dir.join(Self::SAVE_FILE)
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StageError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<SettingsDocument, StageError> {
        let save: SaveFile = Self::read_json(&self.save_path())?;
        let calibrations: BTreeMap<String, CalibrationOption> =
            Self::read_json(&self.dir.join(&save.files.calibration))?;
        let controllers: BTreeMap<String, ControllerOption> =
            Self::read_json(&self.dir.join(&save.files.controller))?;
        let presets: BTreeMap<String, Map<String, Value>> =
            Self::read_json(&self.dir.join(&save.files.configuration))?;

        debug!(
            "Loaded settings from {}: {} calibration(s), {} controller(s), {} preset(s)",
            self.dir.display(),
            calibrations.len(),
            controllers.len(),
            presets.len()
        );

        Ok(SettingsDocument {
            calibrations,
            controllers,
            presets,
            selection: save.settings,
            default_speeds: save.default,
            ports: save.ports,
        })
    }

    fn update_selection(&self, changes: &Map<String, Value>) -> Result<(), StageError> {
        let path = self.save_path();
        let mut root: Value = Self::read_json(&path)?;

        let root_obj = root
            .as_object_mut()
            .ok_or_else(|| StageError::type_mismatch(Self::SAVE_FILE, "expected a JSON object"))?;
        let settings = root_obj
            .entry("settings")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| StageError::type_mismatch("settings", "expected a JSON object"))?;

        for (key, value) in changes {
            settings.insert(key.clone(), value.clone());
        }

        fs::write(&path, serde_json::to_string_pretty(&root)?)?;
        info!("Saved {} setting(s) to {}", changes.len(), path.display());
        Ok(())
    }
}

/// Store kept in memory, for embedding and tests.
pub struct MemorySettingsStore {
    document: Mutex<SettingsDocument>,
}

impl MemorySettingsStore {
    pub fn new(document: SettingsDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    pub fn snapshot(&self) -> SettingsDocument {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<SettingsDocument, StageError> {
        Ok(self.snapshot())
    }

    fn update_selection(&self, changes: &Map<String, Value>) -> Result<(), StageError> {
        let mut document = self.document.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = match serde_json::to_value(&document.selection)? {
            Value::Object(record) => record,
            _ => Map::new(),
        };
        for (key, value) in changes {
            record.insert(key.clone(), value.clone());
        }
        document.selection = serde_json::from_value(Value::Object(record))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{axis::AxisName, settings::fixture::write_fixture};
    use serde_json::json;

    #[test]
    fn test_json_store_loads_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let document = JsonSettingsStore::new(dir.path()).load().unwrap();
        assert_eq!(document.calibrations.len(), 2);
        assert_eq!(document.controllers["C-Series 9600"].baudrate, 9600);
        assert_eq!(document.selection.calibration(AxisName::Y), Some("Stage 400"));
        assert_eq!(document.default_speeds["speedY"], 2.5);
        assert_eq!(document.ports.len(), 2);
        assert!(document.presets.contains_key("bench"));
    }

    #[test]
    fn test_update_selection_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let store = JsonSettingsStore::new(dir.path());

        let mut changes = Map::new();
        changes.insert("calibrationX".to_string(), json!("Stage 400"));
        store.update_selection(&changes).unwrap();

        let document = store.load().unwrap();
        assert_eq!(document.selection.calibration(AxisName::X), Some("Stage 400"));
        assert_eq!(document.selection.calibration(AxisName::Y), Some("Stage 400"));
        assert_eq!(document.selection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(document.default_speeds["speedX"], 5.0);
    }

    #[test]
    fn test_memory_store_merges_changes() {
        let store = MemorySettingsStore::new(SettingsDocument::default());

        let mut changes = Map::new();
        changes.insert("port".to_string(), json!("COM4"));
        changes.insert("calibrationZ".to_string(), Value::Null);
        store.update_selection(&changes).unwrap();

        let selection = store.snapshot().selection;
        assert_eq!(selection.port.as_deref(), Some("COM4"));
        assert_eq!(selection.entries.get("calibrationZ"), Some(&Value::Null));
        assert_eq!(selection.calibration(AxisName::Z), None);
    }
}
