//! Bridge loop relaying a started shell to a message transport.
//!
//! Three copies run concurrently and share one shutdown signal:
//!
//! - shell output → transport (binary frames, at most `buffer_size` bytes each)
//! - shell error → transport (best-effort)
//! - transport → shell input, with resize/data control frames decoded
//!
//! The first copy to hit a terminal condition records why and cancels the
//! others; the session is closed exactly once afterwards.

use std::fmt::Display;
use std::sync::OnceLock;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use protocol::ClientInput;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::shell::{RemoteShell, SessionError, ShellOutput};

/// One message on the browser-side transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Close,
}

/// Why a bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The shell's output stream ended.
    OutputClosed,
    /// Sending to the transport failed.
    TransportWriteFailed,
    /// Receiving from the transport failed.
    TransportReadFailed,
    /// The transport was closed by the client.
    TransportClosed,
    /// Writing to the shell's input failed.
    InputWriteFailed,
}

struct Shutdown {
    token: CancellationToken,
    reason: OnceLock<BridgeExit>,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: OnceLock::new(),
        }
    }

    fn trigger(&self, reason: BridgeExit) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    fn reason(&self) -> BridgeExit {
        self.reason
            .get()
            .copied()
            .unwrap_or(BridgeExit::TransportClosed)
    }
}

/// Starts the shell and relays it until either side goes away.
///
/// If the shell cannot be started, an error text frame is sent, the
/// transport and the session are closed, and the start error is returned.
pub async fn run<Tx, Rx, E>(
    shell: RemoteShell,
    mut sink: Tx,
    stream: Rx,
) -> Result<BridgeExit, SessionError>
where
    Tx: Sink<Frame> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let output = match shell.start_shell().await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(session_id = %shell.id(), error = %e, "Failed to start shell");
            let _ = sink
                .send(Frame::Text(format!("error: {}", e.user_message())))
                .await;
            let _ = sink.close().await;
            shell.close().await;
            return Err(e);
        }
    };

    Ok(relay(&shell, output, sink, stream).await)
}

/// Relays a shell whose channel is already open. Closes the session and the
/// transport before returning.
pub async fn relay<Tx, Rx, E>(
    shell: &RemoteShell,
    output: ShellOutput,
    sink: Tx,
    mut stream: Rx,
) -> BridgeExit
where
    Tx: Sink<Frame> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let ShellOutput {
        output: mut stdout,
        error: mut stderr,
    } = output;
    let session_id = shell.id();
    let buffer_size = shell.buffer_size();
    let sink = Mutex::new(sink);
    let shutdown = Shutdown::new();

    let copy_output = async {
        loop {
            let chunk = tokio::select! {
                _ = shutdown.token.cancelled() => return,
                chunk = stdout.recv() => chunk,
            };
            let Some(data) = chunk else {
                shutdown.trigger(BridgeExit::OutputClosed);
                return;
            };
            if let Err(e) = send_chunked(&sink, &shutdown.token, data, buffer_size).await {
                tracing::debug!(session_id = %session_id, error = %e, "Transport write failed");
                shutdown.trigger(BridgeExit::TransportWriteFailed);
                return;
            }
        }
    };

    let copy_error = async {
        loop {
            let chunk = tokio::select! {
                _ = shutdown.token.cancelled() => return,
                chunk = stderr.recv() => chunk,
            };
            let Some(data) = chunk else {
                return;
            };
            if let Err(e) = send_chunked(&sink, &shutdown.token, data, buffer_size).await {
                tracing::debug!(session_id = %session_id, error = %e, "Dropping stderr after write failure");
                return;
            }
        }
    };

    let copy_input = async {
        loop {
            let next = tokio::select! {
                _ = shutdown.token.cancelled() => return,
                next = stream.next() => next,
            };
            let payload = match next {
                None | Some(Ok(Frame::Close)) => {
                    shutdown.trigger(BridgeExit::TransportClosed);
                    return;
                }
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Transport read failed");
                    shutdown.trigger(BridgeExit::TransportReadFailed);
                    return;
                }
                Some(Ok(Frame::Binary(data))) => data,
                Some(Ok(Frame::Text(text))) => match ClientInput::classify(&text) {
                    ClientInput::Resize(size) => {
                        shell.resize(size.rows, size.cols).await;
                        continue;
                    }
                    ClientInput::Data(data) => Bytes::from(data),
                    ClientInput::Raw(raw) => Bytes::copy_from_slice(raw.as_bytes()),
                },
            };
            if payload.is_empty() {
                continue;
            }
            let written = tokio::select! {
                _ = shutdown.token.cancelled() => return,
                written = shell.write(payload) => written,
            };
            if let Err(e) = written {
                tracing::debug!(session_id = %session_id, error = %e, "Shell input write failed");
                shutdown.trigger(BridgeExit::InputWriteFailed);
                return;
            }
        }
    };

    tokio::join!(copy_output, copy_error, copy_input);

    // The channel task may be parked on a full output queue; dropping the
    // receivers lets it see the bridge is gone before close joins it.
    drop(stdout);
    drop(stderr);

    let reason = shutdown.reason();
    tracing::info!(session_id = %session_id, reason = ?reason, "Bridge finished");

    shell.close().await;
    let mut sink = sink.into_inner();
    if let Err(e) = sink.close().await {
        tracing::trace!(session_id = %session_id, error = %e, "Transport already closed");
    }

    reason
}

/// Sends `data` as binary frames of at most `buffer_size` bytes.
async fn send_chunked<Tx>(
    sink: &Mutex<Tx>,
    token: &CancellationToken,
    data: Bytes,
    buffer_size: usize,
) -> Result<(), String>
where
    Tx: Sink<Frame> + Unpin,
    Tx::Error: Display,
{
    let mut sink = sink.lock().await;
    let mut rest = data;
    while !rest.is_empty() {
        let chunk = rest.split_to(buffer_size.min(rest.len()));
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            sent = sink.send(Frame::Binary(chunk)) => sent.map_err(|e| e.to_string())?,
        }
    }
    Ok(())
}
