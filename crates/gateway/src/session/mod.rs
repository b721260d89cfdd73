//! Remote shell sessions.
//!
//! A session is created by the connect call, parked in the
//! [`SessionRegistry`] until claimed, then driven by the [`bridge`] loop
//! once a browser attaches.

pub mod bridge;
pub mod registry;
pub mod shell;
pub mod ssh;

pub use bridge::{BridgeExit, Frame};
pub use registry::{SessionRegistry, SessionSlot, DEFAULT_REAP_INTERVAL, DEFAULT_SESSION_GRACE};
pub use shell::{
    new_session_id, ChannelInput, Connector, ErrorKind, PtyRequest, RemoteShell, SessionError,
    SessionId, SessionState, ShellChannel, ShellConnection, ShellOutput, DEFAULT_BUFFER_SIZE,
};
pub use ssh::{ConnectOptions, Credentials, HostKeyPolicy, SshConnection, SshConnector};
