//! graphscript-runtime: starts and controls compiled script programs.
//!
//! A program runs inside an external runtime process, locally or behind
//! SSH on a remote machine. This crate launches that process, discovers
//! its control port from a handshake line on the merged output, resolves
//! the runtime facade over a TCP control channel, and then shuttles
//! notifications and messages through a [`transceiver::Transceiver`]. The
//! [`controller`] module ties it together behind two controllers with
//! per-category operation queues.

pub mod controller;
pub mod endpoint;
pub mod error;
pub mod exec;
pub mod handshake;
pub mod launcher;
pub mod process;
pub mod processor;
pub mod session;
pub mod transceiver;

mod wire;

pub use controller::{LocalRuntimeController, RemoteRuntimeController};
pub use endpoint::{RuntimeEndpoint, TcpRuntimeEndpoint, RUNTIME_SERVICE_NAME};
pub use error::{Result, RuntimeControlError};
pub use launcher::{
    LaunchedRuntime, LauncherFactory, LocalLauncher, RemoteLauncher, RemoteLauncherFactory,
    RuntimeLauncher,
};
pub use session::{
    CommandTemplates, RemoteSession, RemoteSessionFactory, RemoteTarget, SshSession,
    SshSessionFactory,
};
pub use transceiver::Transceiver;
