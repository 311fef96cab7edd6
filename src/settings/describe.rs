use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::document::{calibration_key, CONTROLLER_KEY, PORT_KEY};
use super::AxisSettings;

/// Settings laid out for a settings form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsDescription {
    pub parameters: BTreeMap<String, ParameterDescription>,
    /// Presets restricted to parameter keys and `name`.
    pub presets: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub default: Option<String>,
    pub options: BTreeMap<String, OptionDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDescription {
    pub name: String,
    pub value: Value,
}

pub(super) fn describe(settings: &AxisSettings) -> SettingsDescription {
    let document = settings.document();
    let mut parameters = BTreeMap::new();

    let calibration_options: BTreeMap<String, OptionDescription> = document
        .calibrations
        .iter()
        .map(|(key, option)| {
            (
                key.clone(),
                OptionDescription {
                    name: key.clone(),
                    value: json!({
                        "stepscale": option.step_scale,
                        "max_speed": option.max_speed,
                        "min_speed": option.min_speed,
                    }),
                },
            )
        })
        .collect();

    for axis in settings.axes() {
        parameters.insert(
            calibration_key(*axis),
            ParameterDescription {
                name: format!("Calibration {}", axis),
                unit: Some("step/mm".to_string()),
                default: document.selection.calibration(*axis).map(str::to_string),
                options: calibration_options.clone(),
            },
        );
    }

    let mut ports: Vec<String> = document.ports.clone();
    if let Some(current) = &document.selection.port {
        if !current.is_empty() && !ports.contains(current) {
            ports.push(current.clone());
        }
    }
    parameters.insert(
        PORT_KEY.to_string(),
        ParameterDescription {
            name: "Port".to_string(),
            unit: None,
            default: document.selection.port.clone(),
            options: ports
                .into_iter()
                .map(|port| {
                    (
                        port.clone(),
                        OptionDescription {
                            name: port.clone(),
                            value: Value::String(port),
                        },
                    )
                })
                .collect(),
        },
    );

    parameters.insert(
        CONTROLLER_KEY.to_string(),
        ParameterDescription {
            name: "Controller".to_string(),
            unit: Some("baud/s".to_string()),
            default: document.selection.controller.clone(),
            options: document
                .controllers
                .iter()
                .map(|(key, option)| {
                    (
                        key.clone(),
                        OptionDescription {
                            name: key.clone(),
                            value: json!(option.baudrate),
                        },
                    )
                })
                .collect(),
        },
    );

    let presets = document
        .presets
        .iter()
        .map(|(key, preset)| {
            let filtered: Map<String, Value> = preset
                .iter()
                .filter(|(field, _)| parameters.contains_key(*field) || *field == "name")
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            (key.clone(), filtered)
        })
        .collect();

    SettingsDescription {
        parameters,
        presets,
    }
}
