//! Runtime controllers.
//!
//! A controller owns at most one controlled program: its transceiver, its
//! process handle, and the running flag, all behind one mutex so a swap is
//! atomic — the old transceiver is halted before the new one becomes
//! visible. Operations are queued on per-category serial executors; the
//! category queues are bounded and nothing runs on a detached thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graphscript_contracts::{
    ConfirmAnswer, ConfirmRequest, MessageSink, ProgramEvent, ProgramNotification, RuntimeStatus,
};
use graphscript_compiler::{CompileDriver, CompileOption, NodeCollection, NodeId};
use tokio::sync::{oneshot, Mutex};

use crate::error::{Result, RuntimeControlError};
use crate::exec::SerialExecutor;
use crate::launcher::{LaunchedRuntime, LauncherFactory, RuntimeLauncher};
use crate::process::ProcessHandle;
use crate::processor::MessageProcessor;
use crate::session::{CommandTemplates, RemoteSessionFactory, RemoteTarget};
use crate::transceiver::Transceiver;

const HALT_TIMEOUT: Duration = Duration::from_secs(5);
const KILL_TIMEOUT: Duration = Duration::from_secs(10);
const REMOTE_KILL_TIMEOUT: Duration = Duration::from_secs(15);

/// What a controller holds for the program it controls.
struct ControlledProgram {
    transceiver: Option<Arc<Transceiver>>,
    process: Option<Box<dyn ProcessHandle>>,
    running: bool,
}

impl ControlledProgram {
    fn empty() -> Self {
        Self {
            transceiver: None,
            process: None,
            running: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.transceiver.is_none() && self.process.is_none()
    }
}

/// State and plumbing shared by the local and remote controllers.
struct ControllerCore {
    state: Mutex<ControlledProgram>,
    sink: Arc<dyn MessageSink>,
    processor: Arc<MessageProcessor>,
}

impl ControllerCore {
    fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            state: Mutex::new(ControlledProgram::empty()),
            processor: Arc::new(MessageProcessor::new(sink.clone())),
            sink,
        }
    }

    /// Halt the transceiver and kill the process, clearing the running
    /// flag regardless of the outcome.
    async fn stop_current(&self, st: &mut ControlledProgram) -> bool {
        let mut ok = true;
        if let Some(t) = st.transceiver.take() {
            if !t.halt(HALT_TIMEOUT).await {
                ok = false;
            }
        }
        if let Some(mut p) = st.process.take() {
            if !p.kill(KILL_TIMEOUT).await {
                ok = false;
            }
        }
        st.running = false;
        ok
    }

    /// Wire up a freshly launched runtime and make it the controlled
    /// program. Anything previously installed is halted before the new
    /// transceiver becomes visible.
    async fn install(&self, launched: LaunchedRuntime) -> Result<()> {
        let LaunchedRuntime {
            endpoint,
            process,
            script_path,
        } = launched;
        let mut process = process;

        let transceiver = Arc::new(Transceiver::new(endpoint.clone()));
        transceiver.start(self.processor.clone());
        if !transceiver.connect().await {
            transceiver.halt(HALT_TIMEOUT).await;
            process.kill(KILL_TIMEOUT).await;
            return Err(RuntimeControlError::Channel(
                "could not open communication with the program".to_string(),
            ));
        }
        match endpoint
            .run_script(&script_path, ProgramEvent::program_start())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                transceiver.halt(HALT_TIMEOUT).await;
                process.kill(KILL_TIMEOUT).await;
                return Err(RuntimeControlError::Channel(
                    "the runtime rejected the program".to_string(),
                ));
            }
            Err(e) => {
                transceiver.halt(HALT_TIMEOUT).await;
                process.kill(KILL_TIMEOUT).await;
                return Err(e);
            }
        }

        let mut st = self.state.lock().await;
        self.stop_current(&mut st).await;
        st.transceiver = Some(transceiver);
        st.process = Some(process);
        st.running = true;
        Ok(())
    }

    async fn connect_current(&self, connect: bool) -> bool {
        let st = self.state.lock().await;
        match &st.transceiver {
            Some(t) => {
                if connect {
                    t.connect().await
                } else {
                    t.disconnect().await
                }
            }
            None => {
                self.sink.error("Start a program first.");
                false
            }
        }
    }

    async fn send_current(&self, notification: ProgramNotification) -> RuntimeStatus {
        let st = self.state.lock().await;
        match &st.transceiver {
            Some(t) => t.push_send(notification),
            None => RuntimeStatus::SendWhenDisconnected,
        }
    }
}

/// Maps an execute failure to a result, reporting it unless the compile
/// driver already did.
fn report_execute_failure(sink: &Arc<dyn MessageSink>, e: RuntimeControlError) -> bool {
    match e {
        // the compile driver reports its own failures
        RuntimeControlError::Compile(_) => {}
        RuntimeControlError::TransferCancelled => {
            sink.info("Transfer cancelled.");
        }
        e => {
            log::error!("execute failed: {}", e);
            sink.error(&format!("Failed to start the program.\n{}", e));
        }
    }
    false
}

/// Controls programs running on this machine.
pub struct LocalRuntimeController {
    core: Arc<ControllerCore>,
    driver: Arc<CompileDriver>,
    launcher: Arc<dyn RuntimeLauncher>,
    sink: Arc<dyn MessageSink>,
    run_ops: SerialExecutor,
    term_ops: SerialExecutor,
    conn_ops: SerialExecutor,
}

impl LocalRuntimeController {
    pub fn new(
        driver: CompileDriver,
        launcher: Arc<dyn RuntimeLauncher>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            core: Arc::new(ControllerCore::new(sink.clone())),
            driver: Arc::new(driver),
            launcher,
            sink,
            run_ops: SerialExecutor::new("local-run"),
            term_ops: SerialExecutor::new("local-terminate"),
            conn_ops: SerialExecutor::new("local-connect"),
        }
    }

    /// Compile the collection and start it on this machine.
    pub fn execute(
        &self,
        nodes: NodeCollection,
        entry: NodeId,
        option: CompileOption,
    ) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        let driver = self.driver.clone();
        let launcher = self.launcher.clone();
        let sink = self.sink.clone();
        self.run_ops.submit(async move {
            match Self::execute_impl(core, driver, launcher, nodes, entry, option).await {
                Ok(()) => true,
                Err(e) => report_execute_failure(&sink, e),
            }
        })
    }

    async fn execute_impl(
        core: Arc<ControllerCore>,
        driver: Arc<CompileDriver>,
        launcher: Arc<dyn RuntimeLauncher>,
        mut nodes: NodeCollection,
        entry: NodeId,
        option: CompileOption,
    ) -> Result<()> {
        {
            let mut st = core.state.lock().await;
            core.stop_current(&mut st).await;
        }
        let artifact = driver.compile(Some(entry), &mut nodes, &option)?;
        let launched = launcher.launch(&artifact).await?;
        core.install(launched).await
    }

    /// Stop the controlled program.
    pub fn terminate(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        let sink = self.sink.clone();
        self.term_ops.submit(async move {
            let mut st = core.state.lock().await;
            if st.is_empty() {
                sink.error("No program is running.");
                return false;
            }
            let ok = core.stop_current(&mut st).await;
            if ok {
                sink.info("Terminated the program.");
            } else {
                sink.error("Failed to terminate the program.");
            }
            ok
        })
    }

    /// Open message flow to the controlled program.
    pub fn connect(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        self.conn_ops.submit(async move { core.connect_current(true).await })
    }

    /// Stop message flow to the controlled program.
    pub fn disconnect(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        self.conn_ops.submit(async move { core.connect_current(false).await })
    }

    /// Queue a notification for the controlled program.
    pub async fn send(&self, notification: ProgramNotification) -> RuntimeStatus {
        self.core.send_current(notification).await
    }

    /// Release everything on shutdown. Unlike terminate, succeeds quietly
    /// when nothing is running.
    pub fn shutdown(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        self.term_ops.submit(async move {
            let mut st = core.state.lock().await;
            core.stop_current(&mut st).await
        })
    }
}

/// Controls programs running on remote machines.
pub struct RemoteRuntimeController {
    core: Arc<ControllerCore>,
    driver: Arc<CompileDriver>,
    launcher_factory: Arc<dyn LauncherFactory>,
    session_factory: Arc<dyn RemoteSessionFactory>,
    templates: CommandTemplates,
    sink: Arc<dyn MessageSink>,
    /// Destination of the currently controlled program.
    current_target: Arc<parking_lot::Mutex<Option<RemoteTarget>>>,
    /// Aborts an in-flight artifact upload.
    cancel_upload: Arc<AtomicBool>,
    run_ops: SerialExecutor,
    term_ops: SerialExecutor,
    conn_ops: SerialExecutor,
}

impl RemoteRuntimeController {
    pub fn new(
        driver: CompileDriver,
        launcher_factory: Arc<dyn LauncherFactory>,
        session_factory: Arc<dyn RemoteSessionFactory>,
        templates: CommandTemplates,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            core: Arc::new(ControllerCore::new(sink.clone())),
            driver: Arc::new(driver),
            launcher_factory,
            session_factory,
            templates,
            sink,
            current_target: Arc::new(parking_lot::Mutex::new(None)),
            cancel_upload: Arc::new(AtomicBool::new(false)),
            run_ops: SerialExecutor::new("remote-run"),
            term_ops: SerialExecutor::new("remote-terminate"),
            conn_ops: SerialExecutor::new("remote-connect"),
        }
    }

    /// The cancellation flag shared with launchers built by the default
    /// factory wiring.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_upload.clone()
    }

    /// Compile the collection and start it on `target`.
    pub fn execute(
        &self,
        nodes: NodeCollection,
        entry: NodeId,
        option: CompileOption,
        target: RemoteTarget,
    ) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        let driver = self.driver.clone();
        let launcher_factory = self.launcher_factory.clone();
        let session_factory = self.session_factory.clone();
        let templates = self.templates.clone();
        let sink = self.sink.clone();
        let current_target = self.current_target.clone();
        let cancel_upload = self.cancel_upload.clone();
        self.run_ops.submit(async move {
            let result = Self::execute_impl(
                &core,
                &driver,
                &launcher_factory,
                &session_factory,
                &templates,
                &sink,
                &current_target,
                &cancel_upload,
                nodes,
                entry,
                option,
                target,
            )
            .await;
            match result {
                Ok(started) => started,
                Err(e) => report_execute_failure(&sink, e),
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_impl(
        core: &Arc<ControllerCore>,
        driver: &CompileDriver,
        launcher_factory: &Arc<dyn LauncherFactory>,
        session_factory: &Arc<dyn RemoteSessionFactory>,
        templates: &CommandTemplates,
        sink: &Arc<dyn MessageSink>,
        current_target: &parking_lot::Mutex<Option<RemoteTarget>>,
        cancel_upload: &AtomicBool,
        mut nodes: NodeCollection,
        entry: NodeId,
        option: CompileOption,
        target: RemoteTarget,
    ) -> Result<bool> {
        {
            let mut st = core.state.lock().await;
            if !st.is_empty() {
                let previous = current_target.lock().clone();
                match previous {
                    Some(prev) if !prev.same_destination(&target) => {
                        let answer = sink.confirm(&ConfirmRequest::new(
                            "Switch target machine",
                            format!(
                                "A program is still controlled on {}.\n\
                                 Stop it before starting on {}?\n\
                                 (\"No\" keeps it running and only disconnects.)",
                                prev.host, target.host
                            ),
                        ));
                        match answer {
                            ConfirmAnswer::Yes => {
                                kill_remote(session_factory, templates, &prev).await;
                                core.stop_current(&mut st).await;
                            }
                            ConfirmAnswer::No => {
                                // leave the remote program running, drop
                                // only our side of the control channel;
                                // the start command handle is released
                                // unkilled so the session going away does
                                // not take the runtime with it
                                if let Some(t) = st.transceiver.take() {
                                    t.disconnect().await;
                                    t.halt(HALT_TIMEOUT).await;
                                }
                                if let Some(p) = st.process.take() {
                                    p.detach();
                                }
                                st.running = false;
                            }
                            ConfirmAnswer::Cancel => {
                                sink.info("Cancelled.");
                                return Ok(false);
                            }
                        }
                    }
                    Some(prev) => {
                        kill_remote(session_factory, templates, &prev).await;
                        core.stop_current(&mut st).await;
                    }
                    None => {
                        core.stop_current(&mut st).await;
                    }
                }
                current_target.lock().take();
            }
        }

        cancel_upload.store(false, Ordering::SeqCst);
        let artifact = driver.compile(Some(entry), &mut nodes, &option)?;
        let launcher = launcher_factory.launcher_for(&target);
        let launched = launcher.launch(&artifact).await?;
        core.install(launched).await?;
        *current_target.lock() = Some(target);
        Ok(true)
    }

    /// Stop the controlled program on its remote machine.
    pub fn terminate(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        let session_factory = self.session_factory.clone();
        let templates = self.templates.clone();
        let sink = self.sink.clone();
        let current_target = self.current_target.clone();
        let cancel_upload = self.cancel_upload.clone();
        self.term_ops.submit(async move {
            // aborts an upload that may be feeding a concurrent execute
            cancel_upload.store(true, Ordering::SeqCst);

            let mut st = core.state.lock().await;
            let Some(target) = current_target.lock().clone() else {
                sink.error("No program is running.");
                return false;
            };
            if let Some(t) = st.transceiver.take() {
                t.halt(HALT_TIMEOUT).await;
            }
            let killed = kill_remote(&session_factory, &templates, &target).await;
            if let Some(mut p) = st.process.take() {
                p.kill(KILL_TIMEOUT).await;
            }
            st.running = false;
            current_target.lock().take();
            if killed {
                sink.info("Terminated the program.");
            } else {
                sink.error("Failed to terminate the program on the remote machine.");
            }
            killed
        })
    }

    /// Open message flow to the program controlled on `target`.
    ///
    /// Connecting to the destination already controlled is a no-op
    /// success when the transceiver is connected.
    pub fn connect(&self, target: RemoteTarget) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        let sink = self.sink.clone();
        let current_target = self.current_target.clone();
        self.conn_ops.submit(async move {
            let st = core.state.lock().await;
            let current = current_target.lock().clone();
            match (&st.transceiver, current) {
                (Some(t), Some(current)) if current.same_destination(&target) => {
                    if t.is_connected() {
                        true
                    } else {
                        t.connect().await
                    }
                }
                _ => {
                    sink.error("Not controlling a program on that machine.");
                    false
                }
            }
        })
    }

    /// Stop message flow to the controlled program.
    pub fn disconnect(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        self.conn_ops.submit(async move { core.connect_current(false).await })
    }

    /// Queue a notification for the controlled program.
    pub async fn send(&self, notification: ProgramNotification) -> RuntimeStatus {
        self.core.send_current(notification).await
    }

    /// Release everything on shutdown without touching the remote program.
    pub fn shutdown(&self) -> oneshot::Receiver<bool> {
        let core = self.core.clone();
        let current_target = self.current_target.clone();
        self.term_ops.submit(async move {
            let mut st = core.state.lock().await;
            current_target.lock().take();
            core.stop_current(&mut st).await
        })
    }
}

/// Run the kill command on the remote machine and wait for it to report
/// success.
async fn kill_remote(
    session_factory: &Arc<dyn RemoteSessionFactory>,
    templates: &CommandTemplates,
    target: &RemoteTarget,
) -> bool {
    let session = match session_factory.open(target).await {
        Ok(session) => session,
        Err(e) => {
            log::error!("could not open session to {}: {}", target.host, e);
            return false;
        }
    };
    let mut spawned = match session.exec(&templates.render_kill(target)).await {
        Ok(spawned) => spawned,
        Err(e) => {
            log::error!("kill command failed to start on {}: {}", target.host, e);
            return false;
        }
    };
    matches!(spawned.handle.wait(REMOTE_KILL_TIMEOUT).await, Some(true))
}
