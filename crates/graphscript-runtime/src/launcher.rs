//! Runtime launch sequences.
//!
//! A launch covers everything between "we have an artifact" and "we hold a
//! callable endpoint": deploying the artifact where the runtime can see
//! it, starting the process, scanning its output for the control port, and
//! resolving the runtime facade. Controllers only see the trait, so tests
//! substitute an in-process launcher.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphscript_contracts::MessageSink;
use tokio::process::Command;

use crate::endpoint::{RuntimeEndpoint, TcpRuntimeEndpoint, RUNTIME_SERVICE_NAME};
use crate::error::{Result, RuntimeControlError};
use crate::handshake::discover_control_port;
use crate::process::{spawn_merged, OutputRx, ProcessHandle, SpawnedProcess};
use crate::session::{CommandTemplates, RemoteSessionFactory, RemoteTarget};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// A started runtime: the endpoint to talk to it, the process handle to
/// stop it, and the script path to hand to its run request.
pub struct LaunchedRuntime {
    pub endpoint: Arc<dyn RuntimeEndpoint>,
    pub process: Box<dyn ProcessHandle>,
    pub script_path: String,
}

/// Deploys an artifact and starts a runtime for it.
#[async_trait]
pub trait RuntimeLauncher: Send + Sync {
    async fn launch(&self, artifact: &Path) -> Result<LaunchedRuntime>;
}

/// Launches the runtime as a child process on this machine.
pub struct LocalLauncher {
    /// Program and arguments used to start the runtime.
    pub command: Vec<String>,
}

#[async_trait]
impl RuntimeLauncher for LocalLauncher {
    async fn launch(&self, artifact: &Path) -> Result<LaunchedRuntime> {
        let program = self
            .command
            .first()
            .ok_or_else(|| RuntimeControlError::Spawn("empty runtime command".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]);

        let SpawnedProcess {
            mut handle,
            mut output,
        } = spawn_merged(cmd)?;

        let port = match discover_control_port(&mut output, HANDSHAKE_TIMEOUT).await {
            Ok(port) => port,
            Err(e) => {
                handle.kill(KILL_TIMEOUT).await;
                return Err(e);
            }
        };
        drain_to_log(output);

        let endpoint = match TcpRuntimeEndpoint::resolve(
            "127.0.0.1",
            port,
            RUNTIME_SERVICE_NAME,
            RESOLVE_TIMEOUT,
        )
        .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                handle.kill(KILL_TIMEOUT).await;
                return Err(e);
            }
        };

        Ok(LaunchedRuntime {
            endpoint: Arc::new(endpoint),
            process: handle,
            script_path: artifact.display().to_string(),
        })
    }
}

/// Launches the runtime on a remote machine: uploads the artifact, runs
/// the start command, and resolves the endpoint at the remote host.
pub struct RemoteLauncher {
    pub target: RemoteTarget,
    pub session_factory: Arc<dyn RemoteSessionFactory>,
    pub templates: CommandTemplates,
    /// Remote directory the artifact is uploaded into.
    pub dest_dir: String,
    pub sink: Arc<dyn MessageSink>,
    /// Set to abort an in-flight upload.
    pub cancel: Arc<AtomicBool>,
}

#[async_trait]
impl RuntimeLauncher for RemoteLauncher {
    async fn launch(&self, artifact: &Path) -> Result<LaunchedRuntime> {
        let session = self.session_factory.open(&self.target).await?;

        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RuntimeControlError::Session("artifact has no file name".to_string())
            })?;
        let remote_path = format!("{}/{}", self.dest_dir.trim_end_matches('/'), file_name);

        let sink = self.sink.clone();
        let host = self.target.host.clone();
        let progress = move |percent: u8| {
            sink.info(&format!(
                "Transferring the program to {}... {}%",
                host, percent
            ));
        };
        session
            .upload(artifact, &remote_path, &progress, &self.cancel)
            .await?;

        let SpawnedProcess {
            mut handle,
            mut output,
        } = session.exec(&self.templates.render_start(&self.target)).await?;

        let port = match discover_control_port(&mut output, HANDSHAKE_TIMEOUT).await {
            Ok(port) => port,
            Err(e) => {
                handle.kill(KILL_TIMEOUT).await;
                return Err(e);
            }
        };
        drain_to_log(output);

        let endpoint = match TcpRuntimeEndpoint::resolve(
            &self.target.host,
            port,
            RUNTIME_SERVICE_NAME,
            RESOLVE_TIMEOUT,
        )
        .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                handle.kill(KILL_TIMEOUT).await;
                return Err(e);
            }
        };

        Ok(LaunchedRuntime {
            endpoint: Arc::new(endpoint),
            process: handle,
            script_path: remote_path,
        })
    }
}

/// Builds a launcher for a target machine; the remote controller uses
/// this so its launch path is swappable in tests.
pub trait LauncherFactory: Send + Sync {
    fn launcher_for(&self, target: &RemoteTarget) -> Arc<dyn RuntimeLauncher>;
}

/// Default [`LauncherFactory`] producing [`RemoteLauncher`]s.
pub struct RemoteLauncherFactory {
    pub session_factory: Arc<dyn RemoteSessionFactory>,
    pub templates: CommandTemplates,
    pub dest_dir: String,
    pub sink: Arc<dyn MessageSink>,
    pub cancel: Arc<AtomicBool>,
}

impl LauncherFactory for RemoteLauncherFactory {
    fn launcher_for(&self, target: &RemoteTarget) -> Arc<dyn RuntimeLauncher> {
        Arc::new(RemoteLauncher {
            target: target.clone(),
            session_factory: self.session_factory.clone(),
            templates: self.templates.clone(),
            dest_dir: self.dest_dir.clone(),
            sink: self.sink.clone(),
            cancel: self.cancel.clone(),
        })
    }
}

/// Keep reading leftover runtime output after the handshake so the
/// process never blocks on a full pipe; lines go to the debug log.
fn drain_to_log(mut output: OutputRx) {
    tokio::spawn(async move {
        while let Some(chunk) = output.recv().await {
            let text = String::from_utf8_lossy(&chunk);
            for line in text.lines() {
                if !line.is_empty() {
                    log::debug!("runtime output: {}", line);
                }
            }
        }
    });
}
