//! Message transceiver for one runtime connection.
//!
//! Owns the outbound queue and the send/receive tasks for a single
//! endpoint. Queueing a notification never blocks and never fails with an
//! exception; callers always get a [`RuntimeStatus`]. A transceiver is
//! created per program run and halted when its program goes away.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graphscript_contracts::{ProgramNotification, RuntimeStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::endpoint::RuntimeEndpoint;
use crate::processor::MessageProcessor;

/// Capacity of the outbound notification queue.
pub const MAX_SEND_QUEUE: usize = 2048;

const RECV_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Sends notifications to and receives messages from one runtime.
pub struct Transceiver {
    id: u64,
    endpoint: Arc<dyn RuntimeEndpoint>,
    connected: Arc<AtomicBool>,
    outbound: mpsc::Sender<ProgramNotification>,
    outbound_rx: parking_lot::Mutex<Option<mpsc::Receiver<ProgramNotification>>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    halted: AtomicBool,
}

impl Transceiver {
    pub fn new(endpoint: Arc<dyn RuntimeEndpoint>) -> Self {
        Self::with_queue_size(endpoint, MAX_SEND_QUEUE)
    }

    pub fn with_queue_size(endpoint: Arc<dyn RuntimeEndpoint>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            endpoint,
            connected: Arc::new(AtomicBool::new(false)),
            outbound: tx,
            outbound_rx: parking_lot::Mutex::new(Some(rx)),
            tasks: parking_lot::Mutex::new(Vec::new()),
            halted: AtomicBool::new(false),
        }
    }

    /// Identifier for log correlation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Start the send and receive loops. Does nothing if already started.
    pub fn start(&self, processor: Arc<MessageProcessor>) {
        let Some(mut rx) = self.outbound_rx.lock().take() else {
            return;
        };
        let id = self.id;

        let endpoint = self.endpoint.clone();
        let connected = self.connected.clone();
        let send_loop = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = endpoint.send(notification).await {
                    log::error!("transceiver {}: send failed: {}", id, e);
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        let endpoint = self.endpoint.clone();
        let connected = self.connected.clone();
        let recv_loop = tokio::spawn(async move {
            loop {
                match endpoint.recv(RECV_FRAME_TIMEOUT).await {
                    Ok(Some(msg)) => processor.process(msg),
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("transceiver {}: receive failed: {}", id, e);
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.push(send_loop);
        tasks.push(recv_loop);
    }

    /// Open message flow. Returns false (and logs) on failure.
    pub async fn connect(&self) -> bool {
        match self.endpoint.connect().await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                log::info!("transceiver {}: connected", self.id);
                true
            }
            Err(e) => {
                log::error!("transceiver {}: connect failed: {}", self.id, e);
                false
            }
        }
    }

    /// Stop message flow. Returns false (and logs) on failure.
    pub async fn disconnect(&self) -> bool {
        match self.endpoint.disconnect().await {
            Ok(()) => {
                self.connected.store(false, Ordering::SeqCst);
                log::info!("transceiver {}: disconnected", self.id);
                true
            }
            Err(e) => {
                log::error!("transceiver {}: disconnect failed: {}", self.id, e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a notification for delivery. Never blocks.
    pub fn push_send(&self, notification: ProgramNotification) -> RuntimeStatus {
        if !self.is_connected() {
            log::warn!("transceiver {}: send while disconnected", self.id);
            return RuntimeStatus::SendWhenDisconnected;
        }
        match self.outbound.try_send(notification) {
            Ok(()) => RuntimeStatus::Success,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("transceiver {}: send queue full", self.id);
                RuntimeStatus::SendQueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("transceiver {}: send after halt", self.id);
                RuntimeStatus::SendWhenDisconnected
            }
        }
    }

    /// Stop both loops and release the connection.
    ///
    /// Idempotent; repeated calls return true immediately. Returns false
    /// if a loop did not wind down within the limit.
    pub async fn halt(&self, limit: Duration) -> bool {
        if self.halted.swap(true, Ordering::SeqCst) {
            return true;
        }
        if self.is_connected() {
            self.disconnect().await;
        }
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let mut clean = true;
        for task in tasks {
            task.abort();
            if tokio::time::timeout(limit, task).await.is_err() {
                clean = false;
            }
        }
        log::info!("transceiver {}: halted (clean: {})", self.id, clean);
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphscript_contracts::{ProgramEvent, ProgramMessage};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    use crate::error::Result;

    /// Endpoint whose `send` waits on a gate, so queued notifications
    /// stay queued until the test releases them.
    struct GatedEndpoint {
        gate: Notify,
        sent: Mutex<Vec<ProgramNotification>>,
    }

    impl GatedEndpoint {
        fn new() -> Self {
            Self {
                gate: Notify::new(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl crate::endpoint::RuntimeEndpoint for GatedEndpoint {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn run_script(&self, _file: &str, _start: ProgramEvent) -> Result<bool> {
            Ok(true)
        }

        async fn send(&self, notification: ProgramNotification) -> Result<()> {
            self.gate.notified().await;
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }

        async fn recv(&self, limit: Duration) -> Result<Option<ProgramMessage>> {
            tokio::time::sleep(limit).await;
            Ok(None)
        }
    }

    fn notification() -> ProgramNotification {
        ProgramNotification::InputText {
            text: "x".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let t = Transceiver::new(Arc::new(GatedEndpoint::new()));
        assert_eq!(t.push_send(notification()), RuntimeStatus::SendWhenDisconnected);
    }

    #[tokio::test]
    async fn test_send_queue_full() {
        let t = Transceiver::with_queue_size(Arc::new(GatedEndpoint::new()), 1);
        assert!(t.connect().await);
        // no send loop running, so the first notification fills the queue
        assert_eq!(t.push_send(notification()), RuntimeStatus::Success);
        assert_eq!(t.push_send(notification()), RuntimeStatus::SendQueueFull);
    }

    #[tokio::test]
    async fn test_successful_queueing() {
        let t = Transceiver::new(Arc::new(GatedEndpoint::new()));
        assert!(t.connect().await);
        assert_eq!(t.push_send(notification()), RuntimeStatus::Success);
    }

    #[tokio::test]
    async fn test_halt_is_idempotent() {
        let sink = Arc::new(graphscript_contracts::VecMessageSink::new());
        let t = Transceiver::new(Arc::new(GatedEndpoint::new()));
        t.start(Arc::new(MessageProcessor::new(sink)));
        assert!(t.halt(Duration::from_secs(1)).await);
        assert!(t.halt(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_push_after_halt_reports_disconnected() {
        let t = Transceiver::new(Arc::new(GatedEndpoint::new()));
        assert!(t.connect().await);
        t.halt(Duration::from_secs(1)).await;
        assert_eq!(t.push_send(notification()), RuntimeStatus::SendWhenDisconnected);
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let a = Transceiver::new(Arc::new(GatedEndpoint::new()));
        let b = Transceiver::new(Arc::new(GatedEndpoint::new()));
        assert_ne!(a.id(), b.id());
    }
}
