use crate::errors::MediatorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Names a permission kind, e.g. `{"name": "storageAccess"}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionDescriptor {
    pub name: String,
}

impl PermissionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TryFrom<&Value> for PermissionDescriptor {
    type Error = MediatorError;

    /// Parses an untrusted descriptor; it must be an object with a string `name`.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value.get("name") {
            Some(Value::String(name)) if value.is_object() => Ok(Self::new(name.clone())),
            _ => Err(MediatorError::Validation(
                "permission descriptor must be an object with a string `name`".to_string(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
        };
        f.write_str(s)
    }
}

/// Result of a permission check: `{"state": "granted" | "denied" | "prompt"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub state: PermissionState,
}

impl PermissionStatus {
    pub fn new(state: PermissionState) -> Self {
        Self { state }
    }

    pub fn prompt() -> Self {
        Self::new(PermissionState::Prompt)
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionState::Denied)
    }

    pub fn is_granted(&self) -> bool {
        self.state == PermissionState::Granted
    }

    /// The status as it may be persisted: denial is stored as `prompt` so the
    /// origin can be asked again later.
    pub fn for_storage(&self) -> Self {
        match self.state {
            PermissionState::Denied => Self::prompt(),
            _ => self.clone(),
        }
    }
}

impl Default for PermissionStatus {
    fn default() -> Self {
        Self::prompt()
    }
}

impl TryFrom<&Value> for PermissionStatus {
    type Error = MediatorError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        PermissionStatus::deserialize(value).map_err(|e| {
            MediatorError::Validation(format!(
                "permission status must be an object with `state` one of granted, denied, prompt: {e}"
            ))
        })
    }
}
