//! Control-plane message types.
//!
//! These are the structures that travel inside a control frame: the request
//! a client sends over TCP and the `{status, message}` reply it gets back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier of a hosted server instance.
///
/// A newtype over the 32-character hex string handed to the persistence
/// layer, so an id can't be confused with a username or a wad name.
/// `#[serde(transparent)]` keeps it a plain string in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Outcome flag of a control reply. Serialized as `0` (error) or `1` (ok).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    Error,
    Ok,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Error => 0,
            Status::Ok => 1,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(Status::Error),
            1 => Ok(Status::Ok),
            other => Err(format!("unknown status {other}")),
        }
    }
}

/// The single JSON object written back on every control connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub status: Status,
    pub message: String,
}

impl ControlReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// What a control request asks the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Host,
    Kill,
    Upload,
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "kill" => Ok(Self::Kill),
            "upload" => Ok(Self::Upload),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown action '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Kill => write!(f, "kill"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// A decoded control request.
///
/// The authentication fields are optional at the parsing stage so that a
/// request missing its secret still reaches the secret check (and earns a
/// ban) instead of being reported as malformed JSON. Everything that is not
/// an envelope field lands in `fields` for the action handler to validate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ControlRequest {
    /// Parses the `action` field.
    ///
    /// # Errors
    /// `ProtocolError::InvalidMessage` if the field is missing or names an
    /// unknown action.
    pub fn action(&self) -> Result<Action, ProtocolError> {
        self.action
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidMessage("missing action".into()))?
            .parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_number() {
        let json = serde_json::to_string(&ControlReply::ok("fine")).unwrap();
        assert_eq!(json, r#"{"status":1,"message":"fine"}"#);
    }

    #[test]
    fn test_status_rejects_unknown_number() {
        let result: Result<ControlReply, _> =
            serde_json::from_str(r#"{"status":7,"message":"?"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_action_parse_known_and_unknown() {
        assert_eq!("host".parse::<Action>().unwrap(), Action::Host);
        assert_eq!("upload".parse::<Action>().unwrap(), Action::Upload);
        assert!("restart".parse::<Action>().is_err());
        assert_eq!(Action::Kill.to_string(), "kill");
    }

    #[test]
    fn test_request_missing_action_is_invalid() {
        let req: ControlRequest = serde_json::from_str(r#"{"secret":"x"}"#).unwrap();
        assert!(matches!(req.action(), Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_request_collects_action_fields() {
        let req: ControlRequest = serde_json::from_str(
            r#"{"secret":"x","action":"host","hostname":"Test","iwad":"doom2.wad","gamemode":"deathmatch"}"#,
        )
        .unwrap();
        assert_eq!(req.action().unwrap(), Action::Host);
        assert_eq!(req.fields.len(), 3);
        assert_eq!(req.fields["iwad"], "doom2.wad");
        assert!(!req.fields.contains_key("secret"));
    }

    #[test]
    fn test_server_id_display_is_raw_string() {
        let id = ServerId("00ff".into());
        assert_eq!(id.to_string(), "00ff");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""00ff""#);
    }
}
