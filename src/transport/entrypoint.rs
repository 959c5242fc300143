//! Out-of-process entrypoint options (SPEC_FULL.md ยง6,
//! "Out-of-process entrypoint options").

use serde::{Deserialize, Serialize};

use super::error::TransportError;

fn default_timeout_ms() -> u64 {
    1000
}

fn default_grace_period_ms() -> u64 {
    3000
}

/// Whether a `CREATE` handshake's reply is awaited before `connect` returns.
///
/// Named in SPEC_FULL.md ยง9 ("Exposed as `CreationMode::Synchronous |
/// CreationMode::Asynchronous` on `OutOfProcessEntry`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationMode {
    #[default]
    Synchronous,
    Asynchronous,
}

/// `activation.type`. There is deliberately no `Invalid` variant: an
/// unrecognized string simply fails to deserialize, which is how "INVALID —
/// rejects parsing" is realized in Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    None,
    Launch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_grace_period_ms", rename = "grace.period.ms")]
    pub grace_period_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutOfProcessEntrypoint {
    #[serde(rename = "activation.type")]
    pub activation: ActivationType,
    #[serde(rename = "control.id")]
    pub control_id: String,
    #[serde(rename = "message.id", default)]
    pub message_id: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub lifecycle: CreationMode,
    #[serde(rename = "launch")]
    pub launch: Option<LaunchSpec>,
}

impl OutOfProcessEntrypoint {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TransportError> {
        let parsed: Self = serde_json::from_value(value.clone())
            .map_err(|e| TransportError::InvalidEntrypoint(e.to_string()))?;
        if parsed.activation == ActivationType::Launch && parsed.launch.is_none() {
            return Err(TransportError::InvalidEntrypoint(
                "activation.type = launch requires a launch.path".to_string(),
            ));
        }
        Ok(parsed)
    }

    pub fn message_id(&self) -> String {
        self.message_id
            .clone()
            .unwrap_or_else(crate::util::random_channel_id)
    }

    pub fn message_uri(&self) -> String {
        format!("ipc://{}", self.message_id())
    }
}
