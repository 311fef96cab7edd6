//! JSON-lines request/response format of the control socket.

pub mod client_command;
pub mod error;
pub mod server_response;

use serde_json::Value;

use client_command::ClientCommand;
use error::ProtocolError;
use server_response::ServerResponse;

pub fn parse_command(json_str: &str) -> Result<ClientCommand, ProtocolError> {
    let value: Value = serde_json::from_str(json_str)?;
    let kind = value
        .get("type")
        .ok_or_else(|| ProtocolError::MissingField("type".to_string()))?;
    match kind.as_str() {
        Some(kind) if ClientCommand::TYPES.iter().any(|known| *known == kind) => {}
        Some(kind) => return Err(ProtocolError::UnsupportedCommand(kind.to_string())),
        None => return Err(ProtocolError::UnsupportedCommand(kind.to_string())),
    }
    serde_json::from_value(value).map_err(ProtocolError::from)
}

pub fn serialize_response(response: &ServerResponse) -> Result<String, ProtocolError> {
    serde_json::to_string(response).map_err(ProtocolError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        axis::AxisName,
        error::{MissingParameter, StageError},
    };

    #[test]
    fn test_parse_move_command() {
        let json = r#"{"type": "absolute_move", "values": {"X": 12.5}, "speeds": {"X": 3}, "id": "a1"}"#;
        let cmd = parse_command(json).unwrap();

        match cmd {
            ClientCommand::AbsoluteMove {
                values,
                speeds,
                wait,
                id,
            } => {
                assert_eq!(values[&AxisName::X], 12.5);
                assert_eq!(speeds[&AxisName::X], 3.0);
                assert!(!wait);
                assert_eq!(id.as_deref(), Some("a1"));
            }
            _ => panic!("Expected AbsoluteMove command"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_and_untyped_lines() {
        assert!(matches!(
            parse_command(r#"{"type": "jump"}"#),
            Err(ProtocolError::UnsupportedCommand(kind)) if kind == "jump"
        ));
        assert!(matches!(
            parse_command(r#"{"values": {}}"#),
            Err(ProtocolError::MissingField(field)) if field == "type"
        ));
        assert!(matches!(
            parse_command(r#"{"type": "incremental_move", "values": {"Q": 1}}"#),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(parse_command("not json"), Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn test_parse_save_settings_with_detached_axis() {
        let json = r#"{"type": "save_settings", "calibrations": {"X": "Stage 100", "Y": null}}"#;
        match parse_command(json).unwrap() {
            ClientCommand::SaveSettings {
                port,
                calibrations,
                controller,
                ..
            } => {
                let calibrations = calibrations.unwrap();
                assert_eq!(calibrations[&AxisName::X].as_deref(), Some("Stage 100"));
                assert_eq!(calibrations[&AxisName::Y], None);
                assert!(port.is_none() && controller.is_none());
            }
            _ => panic!("Expected SaveSettings command"),
        }
    }

    #[test]
    fn test_serialize_success_response() {
        let response = ServerResponse::success(
            Some("test-id".to_string()),
            serde_json::json!({"result": "ok"}),
        );

        let json = serialize_response(&response).unwrap();
        assert!(json.contains("success"));
        assert!(json.contains("test-id"));
    }

    #[test]
    fn test_serialize_stage_error_response() {
        let response = ServerResponse::stage_error(
            Some("test-id".to_string()),
            &StageError::MissingValue(MissingParameter::Port),
        );

        let json = serialize_response(&response).unwrap();
        assert!(json.contains(r#""status":"error""#));
        assert!(json.contains(r#""code":"missing_value""#));
        assert!(json.contains("port is not set"));
    }
}
