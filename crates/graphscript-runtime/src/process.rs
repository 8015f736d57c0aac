//! Child process spawning with merged output.
//!
//! Runtime processes announce their control port on stdout, but nothing
//! stops them from interleaving diagnostics on stderr, so both streams are
//! read by dedicated tasks and merged into a single byte channel the
//! handshake can scan.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{Result, RuntimeControlError};

/// Receiver of the merged stdout/stderr byte stream.
pub type OutputRx = mpsc::Receiver<Vec<u8>>;

const OUTPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUF_SIZE: usize = 4096;

/// Handle to a spawned process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if the process is still attached.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit on its own.
    ///
    /// Returns `Some(success)` if it exited within the limit, `None` on
    /// timeout.
    async fn wait(&mut self, limit: Duration) -> Option<bool>;

    /// Close the process's streams, kill it, and wait for it to go away.
    ///
    /// Returns false if the process did not exit within the limit.
    async fn kill(&mut self, limit: Duration) -> bool;

    /// Give up control of the process without killing it.
    ///
    /// The process keeps running; it is reaped in the background when it
    /// exits on its own.
    fn detach(self: Box<Self>);
}

/// A spawned process together with its merged output stream.
pub struct SpawnedProcess {
    pub handle: Box<dyn ProcessHandle>,
    pub output: OutputRx,
}

/// Spawn a command with piped streams and reader tasks merging stdout and
/// stderr into one channel.
pub fn spawn_merged(mut cmd: Command) -> Result<SpawnedProcess> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| RuntimeControlError::Spawn(e.to_string()))?;

    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx);
    }

    log::info!("spawned runtime process (pid {:?})", child.id());
    Ok(SpawnedProcess {
        handle: Box::new(ChildHandle { child }),
        output: rx,
    })
}

fn spawn_reader<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

struct ChildHandle {
    child: Child,
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self, limit: Duration) -> Option<bool> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => Some(status.success()),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    async fn kill(&mut self, limit: Duration) -> bool {
        // Closing stdin first gives the process a chance to notice.
        drop(self.child.stdin.take());
        if let Err(e) = self.child.start_kill() {
            log::warn!("failed to kill runtime process: {}", e);
        }
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(_) => true,
            Err(_) => {
                log::warn!("runtime process did not exit within {:?}", limit);
                false
            }
        }
    }

    fn detach(mut self: Box<Self>) {
        // Waiting in the background means the child is only dropped after
        // it has exited, so kill-on-drop never fires on a live process.
        let pid = self.child.id();
        tokio::spawn(async move {
            match self.child.wait().await {
                Ok(status) => log::debug!("detached process {:?} exited: {}", pid, status),
                Err(e) => log::warn!("wait on detached process {:?} failed: {}", pid, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let cmd = Command::new("/nonexistent/runtime-binary");
        match spawn_merged(cmd) {
            Err(RuntimeControlError::Spawn(_)) => {}
            other => panic!("expected spawn error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_are_merged() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err 1>&2");
        let mut spawned = spawn_merged(cmd).unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = spawned.output.recv().await {
            collected.extend_from_slice(&chunk);
        }
        let text = String::from_utf8_lossy(&collected);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn test_kill_bounded_wait() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let mut spawned = spawn_merged(cmd).unwrap();
        assert!(spawned.handle.kill(Duration::from_secs(5)).await);
    }
}
