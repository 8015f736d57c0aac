//! The callable handle onto a running runtime.
//!
//! After the handshake announces a port, the host opens one TCP connection,
//! resolves the runtime facade by name, and keeps the connection as the
//! control channel for the life of the program.

use std::time::Duration;

use async_trait::async_trait;
use graphscript_contracts::{ProgramEvent, ProgramMessage, ProgramNotification};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use crate::error::{Result, RuntimeControlError};
use crate::wire::{read_frame, write_frame, ControlFrame};

/// Name the runtime facade registers itself under.
pub const RUNTIME_SERVICE_NAME: &str = "RuntimeFacade";

const RUN_SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations the host can invoke on a runtime.
#[async_trait]
pub trait RuntimeEndpoint: Send + Sync {
    /// Open program message flow.
    async fn connect(&self) -> Result<()>;

    /// Stop program message flow.
    async fn disconnect(&self) -> Result<()>;

    /// Ask the runtime to load and run a script, firing `start_event` once
    /// it is loaded. Requires a receive loop pumping [`Self::recv`].
    async fn run_script(&self, file: &str, start_event: ProgramEvent) -> Result<bool>;

    /// Send a notification to the program.
    async fn send(&self, notification: ProgramNotification) -> Result<()>;

    /// Wait up to `limit` for the next program message. `Ok(None)` means
    /// the limit passed without traffic.
    async fn recv(&self, limit: Duration) -> Result<Option<ProgramMessage>>;
}

/// TCP implementation of [`RuntimeEndpoint`].
pub struct TcpRuntimeEndpoint {
    writer: Mutex<OwnedWriteHalf>,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    pending_run: parking_lot::Mutex<Option<oneshot::Sender<bool>>>,
}

impl TcpRuntimeEndpoint {
    /// Connect to `host:port` and resolve the named service.
    pub async fn resolve(host: &str, port: u16, service: &str, limit: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(limit, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                RuntimeControlError::Channel(format!(
                    "timed out connecting to {}:{}",
                    host, port
                ))
            })??;
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;

        write_frame(
            &mut writer,
            &ControlFrame::Resolve {
                service: service.to_string(),
            },
        )
        .await?;

        let answer = tokio::time::timeout(limit, read_frame(&mut reader))
            .await
            .map_err(|_| {
                RuntimeControlError::Channel("timed out resolving runtime service".to_string())
            })??;
        match answer {
            Some(ControlFrame::Resolved { found: true, .. }) => {
                log::info!("resolved runtime service '{}' at {}:{}", service, host, port);
                Ok(Self {
                    writer: Mutex::new(writer),
                    reader: Mutex::new(reader),
                    pending_run: parking_lot::Mutex::new(None),
                })
            }
            Some(ControlFrame::Resolved { found: false, .. }) | Some(_) => {
                Err(RuntimeControlError::ServiceNotFound(service.to_string()))
            }
            None => Err(RuntimeControlError::Channel(
                "connection closed during resolve".to_string(),
            )),
        }
    }

    async fn write(&self, frame: &ControlFrame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }
}

#[async_trait]
impl RuntimeEndpoint for TcpRuntimeEndpoint {
    async fn connect(&self) -> Result<()> {
        self.write(&ControlFrame::Connect).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.write(&ControlFrame::Disconnect).await
    }

    async fn run_script(&self, file: &str, start_event: ProgramEvent) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        *self.pending_run.lock() = Some(tx);
        self.write(&ControlFrame::RunScript {
            file: file.to_string(),
            start_event,
        })
        .await?;
        match tokio::time::timeout(RUN_SCRIPT_TIMEOUT, rx).await {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_)) | Err(_) => {
                self.pending_run.lock().take();
                Err(RuntimeControlError::Channel(
                    "no answer to run request".to_string(),
                ))
            }
        }
    }

    async fn send(&self, notification: ProgramNotification) -> Result<()> {
        self.write(&ControlFrame::Notification { notification }).await
    }

    async fn recv(&self, limit: Duration) -> Result<Option<ProgramMessage>> {
        let mut reader = self.reader.lock().await;
        loop {
            let frame = match tokio::time::timeout(limit, read_frame(&mut reader)).await {
                Err(_) => return Ok(None),
                Ok(frame) => frame?,
            };
            match frame {
                None => {
                    return Err(RuntimeControlError::Channel(
                        "control connection closed".to_string(),
                    ))
                }
                Some(ControlFrame::Message { message }) => return Ok(Some(message)),
                Some(ControlFrame::RunScriptResult { success }) => {
                    if let Some(tx) = self.pending_run.lock().take() {
                        let _ = tx.send(success);
                    } else {
                        log::warn!("unsolicited run result from runtime");
                    }
                }
                Some(other) => {
                    log::warn!("unexpected control frame from runtime: {:?}", other);
                }
            }
        }
    }
}
