pub mod config;
pub mod doctor;
pub mod migrate;
pub mod smoke;

use serde::Serialize;
use serde_json::Value;

/// Rendered command output plus the process exit code.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: &'static str,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_details(command, message, None)
    }

    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok",
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error",
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }
}

pub(crate) fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn serialize_payload(payload: &CommandOutcome) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&payload.command),
            escape_json(&error.to_string())
        )
    })
}
