//! # sshgate Gateway Library
//!
//! Browser-facing gateway to remote SSH shells.
//!
//! ## Overview
//!
//! A browser first calls the create-session endpoint with a target host and
//! credentials. The gateway authenticates to the host, parks the connection
//! under an opaque session id and returns the id. The browser then attaches
//! a WebSocket with that id; the gateway claims the session (at most once),
//! starts an interactive shell and relays bytes in both directions until
//! either side goes away. Sessions that are never attached are expired.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Gateway                            │
//! ├───────────────────────────────────────────────────────────┤
//! │  POST /connect ──► Admission ──► Connector ──► Registry   │
//! │                   (rate, ceiling)  (russh)     (+ reaper) │
//! │                                                   │       │
//! │  GET /ws ────────────────────────► claim ◄────────┘       │
//! │                                      │                    │
//! │                                      ▼                    │
//! │                               Bridge loop                 │
//! │                       (output, error, input copies)       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gateway::{Config, Gateway, SshConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let gateway = Gateway::start(config.settings(), Arc::new(SshConnector::new()));
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
//!     gateway.serve(listener).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`admission`]: Rate limiting and the session ceiling
//! - [`session`]: SSH transport, shell sessions, registry and bridge
//! - [`server`]: HTTP and WebSocket handlers
//! - [`gateway`]: Orchestrator

pub mod admission;
pub mod config;
pub mod gateway;
pub mod server;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use admission::{AdmissionError, RateLimiter};
pub use config::{Config, ConfigError, EnvOverride, GatewaySettings};
pub use gateway::Gateway;
pub use session::{
    BridgeExit, ConnectOptions, Connector, Credentials, ErrorKind, Frame, HostKeyPolicy,
    PtyRequest, RemoteShell, SessionError, SessionId, SessionRegistry, ShellChannel,
    ShellConnection, SshConnector,
};
