//! Remote-shell session object.
//!
//! A [`RemoteShell`] owns one live secure-shell connection and, once the
//! shell is started, the interactive channel bound to it. Output and error
//! streams are handed to the caller by [`RemoteShell::start_shell`]; input and
//! resize requests travel through the session so that [`RemoteShell::close`]
//! can cut them off.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use protocol::{TerminalSize, DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_TERM};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::ssh::ConnectOptions;

/// Opaque identifier naming one pending or active session.
pub type SessionId = String;

/// Generates a fresh, unguessable session identifier.
pub fn new_session_id() -> SessionId {
    Uuid::new_v4().to_string()
}

/// Default I/O chunk size.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound on how long `close` waits for the channel task to finish.
const CHANNEL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the per-stream queues between the channel task and the bridge.
pub const STREAM_QUEUE_CAPACITY: usize = 64;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Neither a password nor a private key was supplied.
    #[error("password or private key is required")]
    MissingCredentials,

    /// The private key could not be decoded.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// The transport did not come up within the connect timeout.
    #[error("connection to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// DNS, TCP or handshake failure.
    #[error("failed to connect to {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// The server presented a host key outside the configured policy.
    #[error("host key rejected for {addr}: {fingerprint}")]
    HostKeyRejected { addr: String, fingerprint: String },

    /// Every offered credential was refused.
    #[error("authentication failed for {user}@{addr}")]
    AuthFailed { user: String, addr: String },

    /// Opening the channel, the pty or the shell failed.
    #[error("failed to start shell: {0}")]
    ChannelFailed(String),

    /// `start_shell` was called on a session that already has a shell.
    #[error("shell already started for session {0}")]
    ShellAlreadyStarted(SessionId),

    /// The session has been closed.
    #[error("session closed: {0}")]
    Closed(SessionId),

    /// No pending session carries this identifier.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Read or write failure on an established stream.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Coarse classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller; nothing was attempted on the network.
    Config,
    /// DNS, TCP, handshake or authentication failure.
    Connect,
    /// Pty or shell start failure.
    Channel,
    /// Mid-session read/write failure.
    Stream,
    /// Unknown or already claimed identifier.
    NotFound,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::MissingCredentials | SessionError::InvalidKey(_) => ErrorKind::Config,
            SessionError::Timeout { .. }
            | SessionError::ConnectFailed { .. }
            | SessionError::HostKeyRejected { .. }
            | SessionError::AuthFailed { .. } => ErrorKind::Connect,
            SessionError::ChannelFailed(_) | SessionError::ShellAlreadyStarted(_) => {
                ErrorKind::Channel
            }
            SessionError::Closed(_) | SessionError::Stream(_) => ErrorKind::Stream,
            SessionError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Message safe to show to the browser.
    ///
    /// Connect failures are collapsed into one generic text so that the
    /// response does not reveal whether the host, the user or the password
    /// was wrong.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Config => self.to_string(),
            ErrorKind::Connect => {
                "connection failed, please check the address and credentials".to_string()
            }
            ErrorKind::Channel => "failed to start terminal".to_string(),
            ErrorKind::Stream => "terminal stream closed".to_string(),
            ErrorKind::NotFound => "session does not exist or has expired".to_string(),
        }
    }
}

/// Pseudo-terminal parameters for a new shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: TerminalSize,
    pub echo: bool,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            size: TerminalSize::new(DEFAULT_ROWS, DEFAULT_COLS),
            echo: true,
        }
    }
}

/// Requests delivered to the task that owns an interactive channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelInput {
    /// Bytes for the shell's stdin.
    Data(Bytes),
    /// Window-change request.
    Resize(TerminalSize),
}

/// The bound stream endpoints of one interactive channel.
///
/// `pump` is the task that owns the underlying channel. It must exit once
/// `input` is dropped, and it ends `output` when the remote side reaches
/// end-of-stream.
#[derive(Debug)]
pub struct ShellChannel {
    pub input: mpsc::Sender<ChannelInput>,
    pub output: mpsc::Receiver<Bytes>,
    pub error: mpsc::Receiver<Bytes>,
    pub pump: JoinHandle<()>,
}

/// Output side of a started shell, owned by the bridge.
#[derive(Debug)]
pub struct ShellOutput {
    pub output: mpsc::Receiver<Bytes>,
    pub error: mpsc::Receiver<Bytes>,
}

/// One established secure-shell transport.
#[async_trait]
pub trait ShellConnection: Send + Sync {
    /// Opens a channel, requests a pty and starts the login shell.
    async fn open_shell(&self, pty: &PtyRequest) -> Result<ShellChannel, SessionError>;

    /// Tears down the transport. Must tolerate being called after the peer
    /// has already gone away.
    async fn disconnect(&self);
}

/// Opens secure-shell transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn ShellConnection>, SessionError>;
}

/// Lifecycle state of a [`RemoteShell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    ShellStarted = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::ShellStarted,
            _ => SessionState::Closed,
        }
    }
}

/// A remote shell session: one connection, at most one interactive channel.
pub struct RemoteShell {
    id: SessionId,
    buffer_size: usize,
    state: AtomicU8,
    connection: Mutex<Option<Arc<dyn ShellConnection>>>,
    input: Mutex<Option<mpsc::Sender<ChannelInput>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteShell {
    /// Wraps an established connection. A `buffer_size` of zero selects
    /// [`DEFAULT_BUFFER_SIZE`].
    pub fn new(id: SessionId, connection: Arc<dyn ShellConnection>, buffer_size: usize) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        Self {
            id,
            buffer_size,
            state: AtomicU8::new(SessionState::Created as u8),
            connection: Mutex::new(Some(connection)),
            input: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    /// Connects through `connector` and wraps the result under a fresh id.
    pub async fn open(
        connector: &dyn Connector,
        options: &ConnectOptions,
    ) -> Result<Self, SessionError> {
        options.credentials.ensure_present()?;
        let connection = connector.connect(options).await?;
        Ok(Self::new(new_session_id(), connection, options.buffer_size))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Opens the interactive channel with the default pty geometry.
    ///
    /// Succeeds at most once per session.
    pub async fn start_shell(&self) -> Result<ShellOutput, SessionError> {
        if let Err(current) = self.state.compare_exchange(
            SessionState::Created as u8,
            SessionState::ShellStarted as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(match SessionState::from_u8(current) {
                SessionState::Closed => SessionError::Closed(self.id.clone()),
                _ => SessionError::ShellAlreadyStarted(self.id.clone()),
            });
        }

        let connection = self
            .connection
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Closed(self.id.clone()))?;

        let channel = connection.open_shell(&PtyRequest::default()).await?;

        *self.input.lock() = Some(channel.input);
        *self.pump.lock() = Some(channel.pump);

        // A concurrent close may have run while the channel was opening and
        // found nothing to release.
        if self.is_closed() {
            self.input.lock().take();
            if let Some(pump) = self.pump.lock().take() {
                pump.abort();
            }
            return Err(SessionError::Closed(self.id.clone()));
        }

        tracing::debug!(session_id = %self.id, "Shell started");

        Ok(ShellOutput {
            output: channel.output,
            error: channel.error,
        })
    }

    /// Writes bytes to the shell's input.
    pub async fn write(&self, data: Bytes) -> Result<(), SessionError> {
        let input = self
            .input
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Closed(self.id.clone()))?;
        input
            .send(ChannelInput::Data(data))
            .await
            .map_err(|_| SessionError::Stream("shell input closed".to_string()))
    }

    /// Forwards a window-change request.
    ///
    /// A no-op before the shell is started, after close, or for a zero
    /// geometry.
    pub async fn resize(&self, rows: u32, cols: u32) {
        if self.state() != SessionState::ShellStarted {
            return;
        }
        let size = TerminalSize::new(rows, cols);
        if size.is_empty() {
            tracing::debug!(session_id = %self.id, rows, cols, "Ignoring empty resize");
            return;
        }
        let Some(input) = self.input.lock().clone() else {
            return;
        };
        if input.send(ChannelInput::Resize(size)).await.is_err() {
            tracing::debug!(session_id = %self.id, "Resize after channel closed");
        }
    }

    /// Releases the input stream, the channel and the connection, in that
    /// order. Safe to call any number of times from any number of tasks.
    pub async fn close(&self) {
        let previous = self.state.swap(SessionState::Closed as u8, Ordering::SeqCst);
        if previous == SessionState::Closed as u8 {
            return;
        }

        // Dropping the last sender tells the channel task to send EOF and close.
        drop(self.input.lock().take());

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            let abort = pump.abort_handle();
            match tokio::time::timeout(CHANNEL_SHUTDOWN_TIMEOUT, pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %self.id, error = %e, "Channel task failed");
                }
                Err(_) => {
                    tracing::warn!(session_id = %self.id, "Channel did not close in time, aborting");
                    abort.abort();
                }
            }
        }

        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.disconnect().await;
        }

        tracing::info!(session_id = %self.id, "Session closed");
    }
}

impl Drop for RemoteShell {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for RemoteShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteShell")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process stand-in for a secure-shell connection.

    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Observations recorded by a [`LoopbackConnection`].
    #[derive(Default)]
    pub struct Probe {
        pub disconnects: AtomicUsize,
        pub shells_opened: AtomicUsize,
        pub channels_closed: AtomicUsize,
        pub resizes: parking_lot::Mutex<Vec<TerminalSize>>,
        pub input: parking_lot::Mutex<Vec<u8>>,
    }

    /// Echoes every input chunk back on the output stream. A chunk equal to
    /// `exit\n` ends the output stream; `err:<text>` is emitted on the
    /// error stream instead.
    pub struct LoopbackConnection {
        pub probe: Arc<Probe>,
        pub fail_shell: bool,
    }

    impl LoopbackConnection {
        pub fn new() -> (Arc<Self>, Arc<Probe>) {
            let probe = Arc::new(Probe::default());
            let conn = Arc::new(Self {
                probe: Arc::clone(&probe),
                fail_shell: false,
            });
            (conn, probe)
        }
    }

    #[async_trait]
    impl ShellConnection for LoopbackConnection {
        async fn open_shell(&self, _pty: &PtyRequest) -> Result<ShellChannel, SessionError> {
            if self.fail_shell {
                return Err(SessionError::ChannelFailed("pty refused".to_string()));
            }
            self.probe.shells_opened.fetch_add(1, Ordering::SeqCst);

            let (input_tx, mut input_rx) = mpsc::channel::<ChannelInput>(STREAM_QUEUE_CAPACITY);
            let (output_tx, output_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
            let (error_tx, error_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
            let probe = Arc::clone(&self.probe);

            let pump = tokio::spawn(async move {
                while let Some(msg) = input_rx.recv().await {
                    match msg {
                        ChannelInput::Resize(size) => probe.resizes.lock().push(size),
                        ChannelInput::Data(data) => {
                            probe.input.lock().extend_from_slice(&data);
                            if &data[..] == b"exit\n" {
                                break;
                            }
                            if let Some(text) = data.strip_prefix(b"err:") {
                                let _ = error_tx.send(Bytes::copy_from_slice(text)).await;
                                continue;
                            }
                            if output_tx.send(data).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                probe.channels_closed.fetch_add(1, Ordering::SeqCst);
            });

            Ok(ShellChannel {
                input: input_tx,
                output: output_rx,
                error: error_rx,
                pump,
            })
        }

        async fn disconnect(&self) {
            self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Builds a session over a fresh loopback connection.
    pub fn loopback_shell(buffer_size: usize) -> (RemoteShell, Arc<Probe>) {
        let (conn, probe) = LoopbackConnection::new();
        (RemoteShell::new(new_session_id(), conn, buffer_size), probe)
    }

    /// Builds a session whose shell request is always refused.
    pub fn failing_shell() -> (RemoteShell, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let conn = Arc::new(LoopbackConnection {
            probe: Arc::clone(&probe),
            fail_shell: true,
        });
        (RemoteShell::new(new_session_id(), conn, 1024), probe)
    }

    /// Hands out loopback connections and counts connect attempts.
    #[derive(Default)]
    pub struct LoopbackConnector {
        pub attempts: AtomicUsize,
        pub probes: parking_lot::Mutex<Vec<Arc<Probe>>>,
        pub refuse: bool,
    }

    #[async_trait]
    impl Connector for LoopbackConnector {
        async fn connect(
            &self,
            options: &ConnectOptions,
        ) -> Result<Arc<dyn ShellConnection>, SessionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(SessionError::AuthFailed {
                    user: options.username.clone(),
                    addr: options.addr(),
                });
            }
            let (conn, probe) = LoopbackConnection::new();
            self.probes.lock().push(probe);
            Ok(conn)
        }
    }
}
