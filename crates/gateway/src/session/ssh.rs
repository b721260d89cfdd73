//! Secure-shell transport built on `russh`.
//!
//! [`SshConnector`] dials the remote host, authenticates, and returns an
//! [`SshConnection`]. Each interactive channel opened on that connection is
//! owned by a single pump task that demultiplexes channel messages onto the
//! output and error queues and applies input and resize requests in order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use protocol::TerminalSize;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use russh::{ChannelMsg, Disconnect, Pty};
use russh_keys::key;
use tokio::sync::mpsc;

use super::shell::{
    ChannelInput, Connector, PtyRequest, SessionError, ShellChannel, ShellConnection,
    STREAM_QUEUE_CAPACITY,
};

/// Keyboard-interactive rounds answered before giving up.
const MAX_INTERACTIVE_ROUNDS: usize = 8;

/// Extended-data stream number carrying stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Terminal line speed announced in the pty request.
const TTY_SPEED: u32 = 14_400;

/// Credentials offered to the remote host.
#[derive(Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

impl Credentials {
    /// Rejects a credential set with neither a password nor a private key.
    pub fn ensure_present(&self) -> Result<(), SessionError> {
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        let has_key = self.private_key.as_deref().is_some_and(|k| !k.is_empty());
        if has_password || has_key {
            Ok(())
        } else {
            Err(SessionError::MissingCredentials)
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// How the server's host key is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Trust any host key. Logged at warn level on every connection.
    #[default]
    AcceptAny,
    /// Trust only keys whose SHA-256 fingerprint is listed.
    Pinned(Vec<String>),
}

impl HostKeyPolicy {
    /// Builds a policy from configured fingerprints; empty means accept any.
    pub fn from_fingerprints(fingerprints: &[String]) -> Self {
        if fingerprints.is_empty() {
            HostKeyPolicy::AcceptAny
        } else {
            HostKeyPolicy::Pinned(
                fingerprints
                    .iter()
                    .map(|f| normalize_fingerprint(f).to_string())
                    .collect(),
            )
        }
    }

    fn allows(&self, fingerprint: &str) -> bool {
        match self {
            HostKeyPolicy::AcceptAny => true,
            HostKeyPolicy::Pinned(allowed) => {
                let fingerprint = normalize_fingerprint(fingerprint);
                allowed.iter().any(|f| f == fingerprint)
            }
        }
    }
}

fn normalize_fingerprint(fingerprint: &str) -> &str {
    let fingerprint = fingerprint.trim();
    fingerprint.strip_prefix("SHA256:").unwrap_or(fingerprint)
}

/// Everything needed to open one session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub buffer_size: usize,
    pub host_key_policy: HostKeyPolicy,
}

impl ConnectOptions {
    pub fn addr(&self) -> String {
        if self.hostname.contains(':') && !self.hostname.starts_with('[') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// russh client handler holding the host-key policy.
struct ClientHandler {
    addr: String,
    policy: HostKeyPolicy,
    rejected: Arc<parking_lot::Mutex<Option<String>>>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        if !self.policy.allows(&fingerprint) {
            tracing::warn!(addr = %self.addr, fingerprint = %fingerprint, "Host key not pinned");
            *self.rejected.lock() = Some(fingerprint);
            return Ok(false);
        }
        if self.policy == HostKeyPolicy::AcceptAny {
            tracing::warn!(
                addr = %self.addr,
                fingerprint = %fingerprint,
                "Accepting unverified host key"
            );
        }
        Ok(true)
    }
}

/// Production [`Connector`] dialing real SSH servers.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<Arc<dyn ShellConnection>, SessionError> {
        let connection = SshConnection::connect(options).await?;
        Ok(Arc::new(connection))
    }
}

/// One authenticated russh client connection.
pub struct SshConnection {
    addr: String,
    handle: client::Handle<ClientHandler>,
}

impl SshConnection {
    /// Dials and authenticates. The timeout covers TCP connect, key exchange
    /// and authentication together. No retries.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, SessionError> {
        options.credentials.ensure_present()?;

        // Decode the key before touching the network so a bad key is a
        // caller error, not a connect error.
        let key_pair = match options.credentials.private_key.as_deref() {
            Some(pem) if !pem.is_empty() => {
                let passphrase = options
                    .credentials
                    .passphrase
                    .as_deref()
                    .filter(|p| !p.is_empty());
                let key = russh_keys::decode_secret_key(pem, passphrase)
                    .map_err(|e| SessionError::InvalidKey(e.to_string()))?;
                Some(Arc::new(key))
            }
            _ => None,
        };

        let addr = options.addr();
        match tokio::time::timeout(options.timeout, Self::establish(options, key_pair)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                addr,
                timeout: options.timeout,
            }),
        }
    }

    async fn establish(
        options: &ConnectOptions,
        key_pair: Option<Arc<key::KeyPair>>,
    ) -> Result<Self, SessionError> {
        let addr = options.addr();
        let rejected = Arc::new(parking_lot::Mutex::new(None));
        let handler = ClientHandler {
            addr: addr.clone(),
            policy: options.host_key_policy.clone(),
            rejected: Arc::clone(&rejected),
        };

        let config = Arc::new(client::Config::default());
        let mut handle =
            client::connect(config, (options.hostname.as_str(), options.port), handler)
                .await
                .map_err(|e| {
                    if let Some(fingerprint) = rejected.lock().take() {
                        return SessionError::HostKeyRejected {
                            addr: addr.clone(),
                            fingerprint,
                        };
                    }
                    SessionError::ConnectFailed {
                        addr: addr.clone(),
                        reason: e.to_string(),
                    }
                })?;

        let authenticated = authenticate(&mut handle, options, key_pair)
            .await
            .map_err(|e| SessionError::ConnectFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        if !authenticated {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(SessionError::AuthFailed {
                user: options.username.clone(),
                addr,
            });
        }

        tracing::debug!(addr = %addr, user = %options.username, "SSH transport authenticated");

        Ok(Self { addr, handle })
    }
}

/// Tries public key, then password, then keyboard-interactive answering
/// every prompt with the password.
async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    options: &ConnectOptions,
    key_pair: Option<Arc<key::KeyPair>>,
) -> Result<bool, russh::Error> {
    let user = options.username.as_str();

    if let Some(key_pair) = key_pair {
        if handle.authenticate_publickey(user, key_pair).await? {
            return Ok(true);
        }
        tracing::debug!(user, "Public key authentication refused");
    }

    let Some(password) = options
        .credentials
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
    else {
        return Ok(false);
    };

    if handle.authenticate_password(user, password).await? {
        return Ok(true);
    }
    tracing::debug!(user, "Password authentication refused, trying keyboard-interactive");

    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await?;
    for _ in 0..MAX_INTERACTIVE_ROUNDS {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = vec![password.to_string(); prompts.len()];
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
    Ok(matches!(response, KeyboardInteractiveAuthResponse::Success))
}

#[async_trait]
impl ShellConnection for SshConnection {
    async fn open_shell(&self, pty: &PtyRequest) -> Result<ShellChannel, SessionError> {
        let channel_err = |stage: &str, e: russh::Error| {
            SessionError::ChannelFailed(format!("{stage}: {e}"))
        };

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| channel_err("open session", e))?;

        let modes = [
            (Pty::ECHO, u32::from(pty.echo)),
            (Pty::TTY_OP_ISPEED, TTY_SPEED),
            (Pty::TTY_OP_OSPEED, TTY_SPEED),
        ];
        channel
            .request_pty(true, &pty.term, pty.size.cols, pty.size.rows, 0, 0, &modes)
            .await
            .map_err(|e| channel_err("request pty", e))?;
        await_reply(&mut channel, "pty").await?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| channel_err("request shell", e))?;
        await_reply(&mut channel, "shell").await?;

        let (input_tx, input_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);

        let addr = self.addr.clone();
        let pump = tokio::spawn(pump_channel(channel, input_rx, output_tx, error_tx, addr));

        Ok(ShellChannel {
            input: input_tx,
            output: output_rx,
            error: error_rx,
            pump,
        })
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(addr = %self.addr, error = %e, "Disconnect after transport closed");
        }
    }
}

/// Waits for the server's answer to a `want_reply` channel request.
async fn await_reply(
    channel: &mut russh::Channel<client::Msg>,
    what: &str,
) -> Result<(), SessionError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(SessionError::ChannelFailed(format!("{what} request refused")))
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                return Err(SessionError::ChannelFailed(format!(
                    "channel closed during {what} request"
                )))
            }
            Some(_) => {}
        }
    }
}

/// What the pump sees when it reads from an interactive channel.
#[derive(Debug)]
enum ChannelEvent {
    Stdout(Bytes),
    Stderr(Bytes),
    Exited(u32),
    Closed,
    Other,
}

/// The slice of an interactive channel the pump drives.
///
/// `next_event` must be cancel-safe: the pump drops it whenever input wins
/// the race.
#[async_trait]
trait PtyChannel: Send {
    async fn next_event(&mut self) -> ChannelEvent;
    async fn write(&mut self, data: &[u8]) -> Result<(), russh::Error>;
    async fn resize(&mut self, size: TerminalSize) -> Result<(), russh::Error>;
    async fn eof(&mut self);
    async fn close(&mut self) -> Result<(), russh::Error>;
}

#[async_trait]
impl PtyChannel for russh::Channel<client::Msg> {
    async fn next_event(&mut self) -> ChannelEvent {
        match self.wait().await {
            Some(ChannelMsg::Data { data }) => ChannelEvent::Stdout(Bytes::copy_from_slice(&data)),
            Some(ChannelMsg::ExtendedData { data, ext }) if ext == SSH_EXTENDED_DATA_STDERR => {
                ChannelEvent::Stderr(Bytes::copy_from_slice(&data))
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => ChannelEvent::Exited(exit_status),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => ChannelEvent::Closed,
            Some(_) => ChannelEvent::Other,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), russh::Error> {
        self.data(data).await
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), russh::Error> {
        self.window_change(size.cols, size.rows, 0, 0).await
    }

    async fn eof(&mut self) {
        let _ = russh::Channel::eof(self).await;
    }

    async fn close(&mut self) -> Result<(), russh::Error> {
        russh::Channel::close(self).await
    }
}

/// Owns the channel for its whole life.
///
/// Input is polled alongside output at all times: while a stdout chunk waits
/// for queue space, the channel is not read but keystrokes and resizes still
/// go through. Ends when the remote side closes the channel, when the bridge
/// drops the output queue, or when the session drops the input sender.
async fn pump_channel<C: PtyChannel>(
    mut channel: C,
    mut input: mpsc::Receiver<ChannelInput>,
    output: mpsc::Sender<Bytes>,
    error: mpsc::Sender<Bytes>,
    addr: String,
) {
    let mut pending: Option<Bytes> = None;

    loop {
        tokio::select! {
            permit = output.reserve(), if pending.is_some() => {
                let Ok(permit) = permit else {
                    break;
                };
                if let Some(data) = pending.take() {
                    permit.send(data);
                }
            }
            event = channel.next_event(), if pending.is_none() => {
                match event {
                    ChannelEvent::Stdout(data) => pending = Some(data),
                    ChannelEvent::Stderr(data) => {
                        // stderr is best-effort; a full queue drops the chunk.
                        let _ = error.try_send(data);
                    }
                    ChannelEvent::Exited(exit_status) => {
                        tracing::debug!(addr = %addr, exit_status, "Remote shell exited");
                    }
                    ChannelEvent::Closed => break,
                    ChannelEvent::Other => {}
                }
            }
            request = input.recv() => {
                match request {
                    Some(ChannelInput::Data(data)) => {
                        if let Err(e) = channel.write(&data).await {
                            tracing::debug!(addr = %addr, error = %e, "Channel write failed");
                            break;
                        }
                    }
                    Some(ChannelInput::Resize(size)) => {
                        if let Err(e) = channel.resize(size).await {
                            tracing::debug!(addr = %addr, error = %e, "Window change failed");
                        }
                    }
                    None => {
                        channel.eof().await;
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = channel.close().await {
        tracing::trace!(addr = %addr, error = %e, "Channel already closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(credentials: Credentials) -> ConnectOptions {
        ConnectOptions {
            // TEST-NET-1, never routed.
            hostname: "192.0.2.1".to_string(),
            port: 22,
            username: "root".to_string(),
            credentials,
            timeout: Duration::from_secs(30),
            buffer_size: 1024,
            host_key_policy: HostKeyPolicy::AcceptAny,
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fails_without_network() {
        let started = std::time::Instant::now();
        let result = SshConnection::connect(&options(Credentials::default())).await;
        assert!(matches!(result, Err(SessionError::MissingCredentials)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_strings_are_not_credentials() {
        let creds = Credentials {
            password: Some(String::new()),
            private_key: Some(String::new()),
            passphrase: Some("pass".to_string()),
        };
        let result = SshConnection::connect(&options(creds)).await;
        assert!(matches!(result, Err(SessionError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_invalid_key_fails_without_network() {
        let creds = Credentials {
            private_key: Some("-----BEGIN NOT A KEY-----".to_string()),
            ..Default::default()
        };
        let result = SshConnection::connect(&options(creds)).await;
        assert!(matches!(result, Err(SessionError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut opts = options(Credentials {
            password: Some("pw".to_string()),
            ..Default::default()
        });
        opts.hostname = "127.0.0.1".to_string();
        opts.port = port;

        let err = SshConnection::connect(&opts).await.err().unwrap();
        assert_eq!(err.kind(), super::super::shell::ErrorKind::Connect);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Accepts TCP but never speaks SSH.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut opts = options(Credentials {
            password: Some("pw".to_string()),
            ..Default::default()
        });
        opts.hostname = "127.0.0.1".to_string();
        opts.port = port;
        opts.timeout = Duration::from_millis(200);

        let err = SshConnection::connect(&opts).await.err().unwrap();
        assert!(matches!(err, SessionError::Timeout { .. }));
    }

    /// Records what the pump did to a channel whose events the test feeds.
    #[derive(Default)]
    struct ChannelLog {
        writes: parking_lot::Mutex<Vec<u8>>,
        resizes: parking_lot::Mutex<Vec<TerminalSize>>,
        eof: std::sync::atomic::AtomicBool,
        closed: std::sync::atomic::AtomicBool,
    }

    struct ScriptedChannel {
        events: mpsc::Receiver<ChannelEvent>,
        log: Arc<ChannelLog>,
    }

    #[async_trait]
    impl PtyChannel for ScriptedChannel {
        async fn next_event(&mut self) -> ChannelEvent {
            self.events.recv().await.unwrap_or(ChannelEvent::Closed)
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), russh::Error> {
            self.log.writes.lock().extend_from_slice(data);
            Ok(())
        }

        async fn resize(&mut self, size: TerminalSize) -> Result<(), russh::Error> {
            self.log.resizes.lock().push(size);
            Ok(())
        }

        async fn eof(&mut self) {
            self.log.eof.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        async fn close(&mut self) -> Result<(), russh::Error> {
            self.log.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn scripted(
        capacity: usize,
    ) -> (ScriptedChannel, mpsc::Sender<ChannelEvent>, Arc<ChannelLog>) {
        let (tx, events) = mpsc::channel(capacity);
        let log = Arc::new(ChannelLog::default());
        let channel = ScriptedChannel {
            events,
            log: Arc::clone(&log),
        };
        (channel, tx, log)
    }

    fn stdout(data: &'static [u8]) -> ChannelEvent {
        ChannelEvent::Stdout(Bytes::from_static(data))
    }

    #[tokio::test]
    async fn test_full_output_queue_does_not_block_input() {
        let (channel, events, log) = scripted(16);
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(1);
        let (error_tx, _error_rx) = mpsc::channel(1);
        let pump = tokio::spawn(pump_channel(
            channel,
            input_rx,
            output_tx,
            error_tx,
            "test".to_string(),
        ));

        for chunk in [&b"one"[..], b"two", b"three", b"four"] {
            events.send(stdout(chunk)).await.unwrap();
        }

        // Nobody drains the output queue: "one" fills it, "two" is held by
        // the pump and the rest stay unread.
        tokio::time::timeout(Duration::from_secs(2), async {
            while events.capacity() < 14 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        input_tx
            .send(ChannelInput::Data(Bytes::from_static(b"\x03")))
            .await
            .unwrap();
        input_tx
            .send(ChannelInput::Resize(TerminalSize::new(40, 120)))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while log.resizes.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("input stalled behind output");
        assert_eq!(&log.writes.lock()[..], b"\x03");
        assert_eq!(*log.resizes.lock(), vec![TerminalSize::new(40, 120)]);

        // Draining resumes output in order.
        for expected in [&b"one"[..], b"two", b"three", b"four"] {
            assert_eq!(&output_rx.recv().await.unwrap()[..], expected);
        }

        drop(input_tx);
        tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .unwrap()
            .unwrap();
        assert!(log.eof.load(std::sync::atomic::Ordering::SeqCst));
        assert!(log.closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_pump_demuxes_and_ends_on_remote_close() {
        let (channel, events, log) = scripted(16);
        let (_input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let pump = tokio::spawn(pump_channel(
            channel,
            input_rx,
            output_tx,
            error_tx,
            "test".to_string(),
        ));

        events.send(stdout(b"ls\r\n")).await.unwrap();
        events
            .send(ChannelEvent::Stderr(Bytes::from_static(b"warn")))
            .await
            .unwrap();
        events.send(ChannelEvent::Other).await.unwrap();
        events.send(stdout(b"done")).await.unwrap();
        events.send(ChannelEvent::Exited(0)).await.unwrap();
        events.send(ChannelEvent::Closed).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&output_rx.recv().await.unwrap()[..], b"ls\r\n");
        assert_eq!(&output_rx.recv().await.unwrap()[..], b"done");
        assert!(output_rx.recv().await.is_none());
        assert_eq!(&error_rx.recv().await.unwrap()[..], b"warn");
        assert!(log.closed.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!log.eof.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_host_key_policy() {
        assert!(HostKeyPolicy::AcceptAny.allows("anything"));

        let pinned = HostKeyPolicy::from_fingerprints(&["SHA256:abc".to_string()]);
        assert!(pinned.allows("abc"));
        assert!(pinned.allows("SHA256:abc"));
        assert!(!pinned.allows("def"));

        assert_eq!(HostKeyPolicy::from_fingerprints(&[]), HostKeyPolicy::AcceptAny);
    }

    #[test]
    fn test_addr_formats_ipv6() {
        let mut opts = options(Credentials::default());
        assert_eq!(opts.addr(), "192.0.2.1:22");
        opts.hostname = "::1".to_string();
        assert_eq!(opts.addr(), "[::1]:22");
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
    }
}
