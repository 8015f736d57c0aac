//! Remote command and file-transfer sessions.
//!
//! The controllers only see the [`RemoteSession`] trait; the concrete
//! implementation shells out to `ssh` with key-based auth. Uploads are
//! chunked so progress can be reported in whole-percent steps and a
//! cancellation flag takes effect between chunks.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::{Result, RuntimeControlError};
use crate::process::{spawn_merged, SpawnedProcess};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// A machine a program can be deployed to. Key-based SSH auth is assumed;
/// identity is host plus user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub user: String,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
        }
    }

    /// Whether both targets name the same destination.
    pub fn same_destination(&self, other: &Self) -> bool {
        self == other
    }

    fn ssh_destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Start/kill command lines with `{host}` and `{user}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandTemplates {
    /// Command that starts the runtime on the remote machine.
    ///
    /// The command must hand the runtime off to its own session (e.g.
    /// `setsid`/`nohup`) after printing the handshake line: the host may
    /// later release the session that ran it while leaving the runtime
    /// alive.
    pub start: String,
    /// Command that stops the runtime on the remote machine.
    pub kill: String,
}

impl CommandTemplates {
    pub fn render_start(&self, target: &RemoteTarget) -> String {
        render(&self.start, target)
    }

    pub fn render_kill(&self, target: &RemoteTarget) -> String {
        render(&self.kill, target)
    }
}

fn render(template: &str, target: &RemoteTarget) -> String {
    template
        .replace("{host}", &target.host)
        .replace("{user}", &target.user)
}

/// One open session against a remote machine.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a command remotely, returning its merged output and handle.
    async fn exec(&self, command: &str) -> Result<SpawnedProcess>;

    /// Copy a local file to a remote path.
    ///
    /// `progress` is called with whole-percent steps; `cancel` is checked
    /// between chunks and aborts the transfer when set.
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &AtomicBool,
    ) -> Result<()>;
}

/// Opens sessions; injected into the remote controller so tests can
/// substitute an in-process fake.
#[async_trait]
pub trait RemoteSessionFactory: Send + Sync {
    async fn open(&self, target: &RemoteTarget) -> Result<Arc<dyn RemoteSession>>;
}

/// [`RemoteSession`] over the system `ssh` binary.
pub struct SshSession {
    target: RemoteTarget,
}

impl SshSession {
    pub fn new(target: RemoteTarget) -> Self {
        Self { target }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str) -> Result<SpawnedProcess> {
        let mut cmd = Command::new("ssh");
        cmd.arg(self.target.ssh_destination()).arg(command);
        log::info!("remote exec on {}: {}", self.target.host, command);
        spawn_merged(cmd)
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &AtomicBool,
    ) -> Result<()> {
        let mut file = tokio::fs::File::open(local).await?;
        let total = file.metadata().await?.len();

        let mut cmd = Command::new("ssh");
        cmd.arg(self.target.ssh_destination())
            .arg(format!("cat > '{}'", remote))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| RuntimeControlError::Session(e.to_string()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeControlError::Session("no stdin on upload command".to_string()))?;

        let mut sent: u64 = 0;
        let mut last_percent: Option<u8> = None;
        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        loop {
            if cancel.load(Ordering::SeqCst) {
                drop(stdin);
                let _ = child.start_kill();
                return Err(RuntimeControlError::TransferCancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stdin
                .write_all(&buf[..n])
                .await
                .map_err(|e| RuntimeControlError::Session(e.to_string()))?;
            sent += n as u64;
            let percent = transfer_percent(sent, total);
            if last_percent != Some(percent) {
                progress(percent);
                last_percent = Some(percent);
            }
        }
        if last_percent.is_none() {
            progress(100);
        }

        drop(stdin);
        let status = child
            .wait()
            .await
            .map_err(|e| RuntimeControlError::Session(e.to_string()))?;
        if status.success() {
            log::info!("uploaded {} to {}:{}", local.display(), self.target.host, remote);
            Ok(())
        } else {
            Err(RuntimeControlError::Session(format!(
                "upload command exited with {}",
                status
            )))
        }
    }
}

/// Whole-percent completion of a transfer.
pub(crate) fn transfer_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        100
    } else {
        ((sent.min(total) * 100) / total) as u8
    }
}

/// Factory producing [`SshSession`]s.
pub struct SshSessionFactory;

#[async_trait]
impl RemoteSessionFactory for SshSessionFactory {
    async fn open(&self, target: &RemoteTarget) -> Result<Arc<dyn RemoteSession>> {
        Ok(Arc::new(SshSession::new(target.clone())))
    }
}
