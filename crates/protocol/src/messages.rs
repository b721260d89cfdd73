//! Message definitions exchanged with browser clients.
//!
//! Two surfaces use these types: the JSON body of the create-session call and
//! the text frames sent on an attached terminal WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// SSH port used when a request leaves the port unset.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Terminal columns requested when a shell is first started.
pub const DEFAULT_COLS: u32 = 80;

/// Terminal rows requested when a shell is first started.
pub const DEFAULT_ROWS: u32 = 24;

/// Terminal type announced in the pty request.
pub const DEFAULT_TERM: &str = "xterm-256color";

// ============================================================================
// Create-session messages
// ============================================================================

/// Body of a create-session request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    /// Remote host name or address.
    pub hostname: String,
    /// Remote port. Zero means [`DEFAULT_SSH_PORT`].
    pub port: i64,
    /// Login user on the remote host.
    pub username: String,
    /// Password used for password and keyboard-interactive auth.
    pub password: Option<String>,
    /// PEM/OpenSSH encoded private key.
    #[serde(alias = "privateKey", alias = "private_key")]
    pub privatekey: Option<String>,
    /// Passphrase protecting `privatekey`.
    pub passphrase: Option<String>,
}

/// A create-session request whose addressing fields passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

impl ConnectTarget {
    /// Returns true when at least one credential form is present.
    pub fn has_credentials(&self) -> bool {
        self.password.is_some() || self.private_key.is_some()
    }
}

impl ConnectRequest {
    /// Parses a request body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Validates the addressing fields in order: hostname, username, port.
    ///
    /// Credential presence is checked later, after admission control, so it
    /// is not part of this step.
    pub fn validate(self) -> Result<ConnectTarget> {
        let hostname = self.hostname.trim().to_string();
        if hostname.is_empty() {
            return Err(ProtocolError::MissingHostname);
        }
        if self.username.is_empty() {
            return Err(ProtocolError::MissingUsername);
        }
        let port = match self.port {
            0 => DEFAULT_SSH_PORT,
            p => u16::try_from(p)
                .ok()
                .filter(|p| *p >= 1)
                .ok_or(ProtocolError::InvalidPort(p))?,
        };

        Ok(ConnectTarget {
            hostname,
            port,
            username: self.username,
            password: non_empty(self.password),
            private_key: non_empty(self.privatekey),
            passphrase: non_empty(self.passphrase),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Response to a create-session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectResponse {
    /// A successful response carrying the new session identifier.
    pub fn ok(session_id: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: Some(session_id.into()),
            message: None,
        }
    }

    /// An unsuccessful response with a human-readable reason.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            message: Some(message.into()),
        }
    }
}

/// Body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

impl HealthStatus {
    pub fn ok(version: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            version: version.into(),
        }
    }
}

// ============================================================================
// Terminal messages
// ============================================================================

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSize {
    pub rows: u32,
    pub cols: u32,
}

impl TerminalSize {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Reads `rows`/`cols` from an arbitrary JSON value, taking zero for any
    /// dimension that is not a `u32`.
    fn lenient(value: Option<&Value>) -> Self {
        let dim = |key: &str| {
            value
                .and_then(|v| v.get(key))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };
        Self::new(dim("rows"), dim("cols"))
    }

    /// Returns true when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

/// Structured control messages a browser may send as text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Terminal geometry change.
    Resize {
        #[serde(default)]
        resize: TerminalSize,
    },
    /// Keystrokes to forward to the shell.
    Data {
        #[serde(default)]
        data: String,
    },
}

/// Classification of one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput<'a> {
    /// Change the remote terminal geometry; nothing is written to the shell.
    Resize(TerminalSize),
    /// Forward the decoded payload to the shell.
    Data(String),
    /// Not a control message; forward the frame verbatim.
    Raw(&'a str),
}

impl<'a> ClientInput<'a> {
    /// Decodes a text frame, falling back to verbatim forwarding for anything
    /// that is not a recognized control message.
    ///
    /// Any object tagged `resize` is a resize, whatever its body: geometry
    /// that is missing, null, negative or out of range decodes as zero, which
    /// the session ignores. A `data` frame whose payload is not a string is
    /// forwarded verbatim.
    pub fn classify(text: &'a str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return ClientInput::Raw(text);
        };
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("resize") => ClientInput::Resize(TerminalSize::lenient(value.get("resize"))),
            Some("data") => match serde_json::from_value::<ControlMessage>(value) {
                Ok(ControlMessage::Data { data }) => ClientInput::Data(data),
                _ => ClientInput::Raw(text),
            },
            _ => ClientInput::Raw(text),
        }
    }
}
