//! # sshgate Protocol Library
//!
//! Wire types shared between the sshgate gateway and browser clients.
//!
//! ## Overview
//!
//! A browser talks to the gateway over two surfaces:
//!
//! - **Create session**: an HTTP POST carrying a [`ConnectRequest`] and
//!   answered with a [`ConnectResponse`] holding an opaque session id.
//! - **Attach**: a WebSocket whose text frames are classified with
//!   [`ClientInput::classify`] into resize requests, keystroke payloads, or
//!   verbatim input. Terminal output travels back as binary frames.
//!
//! ```rust
//! use protocol::{ClientInput, TerminalSize};
//!
//! let frame = r#"{"type":"resize","resize":{"rows":40,"cols":120}}"#;
//! assert_eq!(ClientInput::classify(frame), ClientInput::Resize(TerminalSize::new(40, 120)));
//! assert_eq!(ClientInput::classify("ls\n"), ClientInput::Raw("ls\n"));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request, response and control message definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    ClientInput, ConnectRequest, ConnectResponse, ConnectTarget, ControlMessage, HealthStatus,
    TerminalSize, DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_SSH_PORT, DEFAULT_TERM,
};
