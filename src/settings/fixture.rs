//! Settings shared by the unit tests of several modules.

use std::{fs, path::Path};

use serde_json::json;

use crate::axis::AxisName;

use super::{
    document::{CalibrationOption, ControllerOption, Selection, SettingsDocument},
    store::SettingsStore,
};

/// Writes a complete settings directory for [`super::store::JsonSettingsStore`].
pub(crate) fn write_fixture(dir: &Path) {
    fs::write(
        dir.join("save.json"),
        json!({
            "files": {
                "calibration": "calibrations.json",
                "controller": "controllers.json",
                "configuration": "presets.json"
            },
            "settings": {
                "port": "/dev/ttyUSB0",
                "controller": "C-Series 9600",
                "calibrationX": "Stage 100",
                "calibrationY": "Stage 400"
            },
            "default": { "speedX": 5.0, "speedY": 2.5 },
            "ports": ["/dev/ttyUSB0", "/dev/ttyUSB1"]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("calibrations.json"),
        json!({
            "Stage 100": { "stepscale": 100.0, "vmax": 50.0, "vmin": 5.0 },
            "Stage 400": { "stepscale": 400.0, "vmax": 10.0 }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("controllers.json"),
        json!({
            "C-Series 9600": { "baudrate": 9600 },
            "C-Series 19200": { "baudrate": 19200, "protocol": "c-series" }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("presets.json"),
        json!({
            "bench": {
                "name": "Bench",
                "port": "/dev/ttyUSB1",
                "calibrationX": "Stage 400",
                "unit": "mm"
            }
        })
        .to_string(),
    )
    .unwrap();
}

/// In-memory equivalent of [`write_fixture`]: X uses a 10 step/mm stage
/// limited to [1, 50] mm/s, Y a 10 step/mm stage without limits.
pub(crate) fn document() -> SettingsDocument {
    let mut document = SettingsDocument::default();
    document.calibrations.insert(
        "Fine".to_string(),
        CalibrationOption {
            step_scale: 10.0,
            max_speed: Some(50.0),
            min_speed: Some(1.0),
        },
    );
    document.calibrations.insert(
        "Free".to_string(),
        CalibrationOption {
            step_scale: 10.0,
            max_speed: None,
            min_speed: None,
        },
    );
    document.controllers.insert(
        "C9600".to_string(),
        ControllerOption {
            baudrate: 9600,
            protocol: None,
        },
    );
    let mut selection = Selection {
        port: Some("COM1".to_string()),
        controller: Some("C9600".to_string()),
        ..Selection::default()
    };
    selection.set_calibration(AxisName::X, Some("Fine"));
    selection.set_calibration(AxisName::Y, Some("Free"));
    document.selection = selection;
    document
}

pub(crate) fn memory_store() -> std::sync::Arc<dyn SettingsStore> {
    std::sync::Arc::new(super::store::MemorySettingsStore::new(document()))
}
