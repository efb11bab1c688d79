//! JSON frames carried by the execution channel.
//!
//! Every frame is an object `{"event": <name>, "data": <payload>}`. Frames are
//! decoded once at the channel boundary into [`ExecutionCommand`] /
//! [`ExecutionEvent`]; nothing past the connector sees raw JSON.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ExecutionCommand, ExecutionEvent};

/// Inbound event names this client understands.
pub const ENGINE_EVENTS: &[&str] = &["execution-output", "waiting-for-input", "execution-result"];

/// Frames sent from client to engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Begin running `code` under the named language engine.
    StartExecution {
        code: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
    /// Deliver one line of interactive input.
    InputLine { text: String },
    /// Request termination of the active run.
    StopExecution {},
}

impl ClientFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<ExecutionCommand> for ClientFrame {
    fn from(command: ExecutionCommand) -> Self {
        match command {
            ExecutionCommand::Start {
                code,
                language_engine_id,
                initial_input,
            } => ClientFrame::StartExecution {
                code,
                language: language_engine_id,
                input: initial_input,
            },
            ExecutionCommand::SubmitInput { text } => ClientFrame::InputLine { text },
            ExecutionCommand::Stop => ClientFrame::StopExecution {},
        }
    }
}

impl From<ClientFrame> for ExecutionCommand {
    fn from(frame: ClientFrame) -> Self {
        match frame {
            ClientFrame::StartExecution {
                code,
                language,
                input,
            } => ExecutionCommand::Start {
                code,
                language_engine_id: language,
                initial_input: input,
            },
            ClientFrame::InputLine { text } => ExecutionCommand::SubmitInput { text },
            ClientFrame::StopExecution {} => ExecutionCommand::Stop,
        }
    }
}

/// Frames sent from engine to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum EngineFrame {
    /// A fragment of stdout/stderr.
    ExecutionOutput {
        #[serde(alias = "output")]
        chunk: String,
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
    /// Engine is blocked on stdin (true) or has resumed (false).
    WaitingForInput {
        #[serde(default = "waiting_default")]
        waiting: bool,
    },
    /// Terminal status of the run.
    ExecutionResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

fn waiting_default() -> bool {
    true
}

impl EngineFrame {
    /// Decode one text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames carrying an event this client
    /// does not handle (other features may share the socket). A missing or
    /// null payload decodes as an empty object so field defaults apply.
    pub fn decode(text: &str) -> serde_json::Result<Option<Self>> {
        let mut value: Value = serde_json::from_str(text)?;
        let Some(object) = value.as_object_mut() else {
            return Err(serde_json::Error::custom("frame is not a JSON object"));
        };

        let known = match object.get("event").and_then(Value::as_str) {
            Some(event) => ENGINE_EVENTS.contains(&event),
            None => return Err(serde_json::Error::custom("frame has no event name")),
        };
        if !known {
            return Ok(None);
        }

        if matches!(object.get("data"), None | Some(Value::Null)) {
            object.insert("data".to_string(), Value::Object(Map::new()));
        }

        serde_json::from_value(value).map(Some)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<EngineFrame> for ExecutionEvent {
    fn from(frame: EngineFrame) -> Self {
        match frame {
            EngineFrame::ExecutionOutput { chunk, is_error } => ExecutionEvent::OutputChunk {
                text: chunk,
                is_error,
            },
            EngineFrame::WaitingForInput { waiting } => ExecutionEvent::InputRequested { waiting },
            EngineFrame::ExecutionResult { success, message } => ExecutionEvent::Terminated {
                ok: success,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_frame_shape() {
        let frame = ClientFrame::from(ExecutionCommand::Start {
            code: "print('hi')".to_string(),
            language_engine_id: "python".to_string(),
            initial_input: None,
        });
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "start-execution", "data": {"code": "print('hi')", "language": "python"}})
        );
    }

    #[test]
    fn test_start_frame_with_initial_input() {
        let frame = ClientFrame::from(ExecutionCommand::Start {
            code: "x".to_string(),
            language_engine_id: "c".to_string(),
            initial_input: Some("5\n".to_string()),
        });
        let json = frame.encode().unwrap();
        assert!(json.contains(r#""input":"5\n""#));
    }

    #[test]
    fn test_input_and_stop_frame_shapes() {
        let input = ClientFrame::from(ExecutionCommand::SubmitInput {
            text: "42".to_string(),
        });
        let value: Value = serde_json::from_str(&input.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "input-line", "data": {"text": "42"}}));

        let stop = ClientFrame::from(ExecutionCommand::Stop);
        let value: Value = serde_json::from_str(&stop.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "stop-execution", "data": {}}));
    }

    #[test]
    fn test_client_frame_back_to_command() {
        let parsed: ClientFrame =
            serde_json::from_str(r#"{"event":"stop-execution","data":{}}"#).unwrap();
        assert_eq!(ExecutionCommand::from(parsed), ExecutionCommand::Stop);
    }

    #[test]
    fn test_decode_output_chunk() {
        let frame = EngineFrame::decode(
            r#"{"event":"execution-output","data":{"chunk":"hi\n","isError":false}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            ExecutionEvent::from(frame),
            ExecutionEvent::OutputChunk {
                text: "hi\n".to_string(),
                is_error: false
            }
        );
    }

    #[test]
    fn test_decode_output_legacy_field_name() {
        let frame = EngineFrame::decode(
            r#"{"event":"execution-output","data":{"output":"oops","isError":true}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            frame,
            EngineFrame::ExecutionOutput {
                chunk: "oops".to_string(),
                is_error: true
            }
        );
    }

    #[test]
    fn test_decode_waiting_without_payload_means_waiting() {
        let frame = EngineFrame::decode(r#"{"event":"waiting-for-input"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, EngineFrame::WaitingForInput { waiting: true });

        let frame = EngineFrame::decode(r#"{"event":"waiting-for-input","data":null}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, EngineFrame::WaitingForInput { waiting: true });

        let frame = EngineFrame::decode(r#"{"event":"waiting-for-input","data":{"waiting":false}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame, EngineFrame::WaitingForInput { waiting: false });
    }

    #[test]
    fn test_decode_result() {
        let frame = EngineFrame::decode(
            r#"{"event":"execution-result","data":{"success":false,"message":"exit code 1"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            ExecutionEvent::from(frame),
            ExecutionEvent::Terminated {
                ok: false,
                message: Some("exit code 1".to_string())
            }
        );
    }

    #[test]
    fn test_decode_unknown_event_is_skipped() {
        let frame = EngineFrame::decode(r#"{"event":"new-notification","data":{"id":1}}"#).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(EngineFrame::decode("not json").is_err());
        assert!(EngineFrame::decode("[1,2,3]").is_err());
        assert!(EngineFrame::decode(r#"{"data":{}}"#).is_err());
        // Known event, wrong payload type
        assert!(EngineFrame::decode(r#"{"event":"execution-result","data":{"success":"yes"}}"#).is_err());
    }

    #[test]
    fn test_engine_frames_use_kebab_case_names() {
        let frames: Vec<(&str, EngineFrame)> = vec![
            ("execution-output", EngineFrame::ExecutionOutput {
                chunk: String::new(),
                is_error: false,
            }),
            ("waiting-for-input", EngineFrame::WaitingForInput { waiting: true }),
            ("execution-result", EngineFrame::ExecutionResult {
                success: true,
                message: None,
            }),
        ];

        for (expected, frame) in frames {
            let json = frame.encode().unwrap();
            let pattern = format!(r#""event":"{}""#, expected);
            assert!(json.contains(&pattern), "Expected event '{}' in JSON: {}", expected, json);
            assert!(ENGINE_EVENTS.contains(&expected));
        }
    }
}
