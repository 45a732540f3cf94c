use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use portable_pty::ChildKiller;
use tokio::sync::mpsc::UnboundedSender;

use crate::display::{DisplayCallbacks, TerminalDisplay};
use crate::pty::{PtyError, PtyHandle, DEFAULT_COLS, DEFAULT_ROWS};

/// Unique identifier for a terminal session.
pub type SessionId = uuid::Uuid;

/// How long `terminate` waits before escalating to a second kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Lifecycle of the shell process behind a session.
///
/// `Exited -> Running` is re-entered via [`PtyLifecycleController::restart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Unstarted,
    Running,
    Exited,
}

/// Asynchronous session updates, marshaled onto the coordinating thread.
///
/// Events from different sessions are independent; the channel imposes no
/// cross-session ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum PtyEvent {
    /// The shell reported a new window title (OSC 0/2).
    TitleChanged { session: SessionId, title: String },
    /// The shell reported its current directory (OSC 7), already parsed.
    WorkingDirectoryChanged { session: SessionId, path: PathBuf },
    /// The display view changed size.
    ViewResized { session: SessionId, cols: u16, rows: u16 },
    /// The shell process exited. `code` is `None` for abnormal or unknown
    /// termination, including spawn failures; it is never conflated with a
    /// genuine exit code 0.
    Exited { session: SessionId, code: Option<u32> },
}

/// Owns the spawn/resize/terminate protocol for one session's shell process.
///
/// All methods must be called from the coordinating thread. Updates flow
/// back asynchronously as [`PtyEvent`]s; `start` in particular is
/// fire-and-forget, with spawn failures surfacing later as an
/// [`PtyEvent::Exited`] carrying no exit code.
pub struct PtyLifecycleController {
    session: SessionId,
    state: ShellState,
    shell: Option<String>,
    events: UnboundedSender<PtyEvent>,
    pty: Option<PtyHandle>,
    killer: Option<Box<dyn ChildKiller + Send + Sync>>,
    kill_issued: bool,
    /// Set by the wait thread once the child is reaped; read by the
    /// termination escalation thread.
    exited: Arc<AtomicBool>,
    /// Non-owning reference to the rendering collaborator.
    display: Option<Weak<dyn TerminalDisplay>>,
}

impl PtyLifecycleController {
    pub fn new(session: SessionId, events: UnboundedSender<PtyEvent>) -> Self {
        Self {
            session,
            state: ShellState::Unstarted,
            shell: None,
            events,
            pty: None,
            killer: None,
            kill_issued: false,
            exited: Arc::new(AtomicBool::new(false)),
            display: None,
        }
    }

    /// Override the shell executable. Tests use this to spawn a predictable
    /// `/bin/sh`; the default is the user's login shell.
    pub fn with_shell(mut self, shell: &str) -> Self {
        self.set_shell(shell);
        self
    }

    /// See [`PtyLifecycleController::with_shell`].
    pub fn set_shell(&mut self, shell: &str) {
        self.shell = Some(shell.to_string());
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    /// Whether a termination signal has been issued for the current process.
    pub fn termination_requested(&self) -> bool {
        self.kill_issued
    }

    /// Attach the rendering collaborator. Held weakly; the controller never
    /// keeps a view alive.
    pub fn attach_display(&mut self, display: &Arc<dyn TerminalDisplay>) {
        self.display = Some(Arc::downgrade(display));
    }

    /// Handle for the rendering collaborator to post callbacks from its own
    /// threads.
    pub fn callbacks(&self) -> DisplayCallbacks {
        DisplayCallbacks::new(self.session, self.events.clone())
    }

    /// Spawn the shell attached to a fresh PTY.
    ///
    /// Ignored while a shell is already running. The working directory falls
    /// back to the home directory, then `/`. Failures are not returned:
    /// they arrive as an exit event with no exit code.
    pub fn start(&mut self, working_directory: Option<&Path>) {
        if self.state == ShellState::Running {
            log::warn!("session {}: start ignored, shell already running", self.session);
            return;
        }

        let dir = working_directory
            .map(Path::to_path_buf)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut pty = match PtyHandle::spawn(
            self.shell.as_deref(),
            &dir,
            DEFAULT_COLS,
            DEFAULT_ROWS,
        ) {
            Ok(pty) => pty,
            Err(e) => {
                log::warn!("session {}: {e}", self.session);
                let _ = self.events.send(PtyEvent::Exited {
                    session: self.session,
                    code: None,
                });
                return;
            }
        };

        let Some(mut child) = pty.take_child() else {
            let _ = self.events.send(PtyEvent::Exited {
                session: self.session,
                code: None,
            });
            return;
        };

        self.killer = Some(child.clone_killer());
        self.kill_issued = false;
        self.exited = Arc::new(AtomicBool::new(false));

        // Dedicated wait thread: blocks until the child is reaped, then
        // reports the exit through the event channel.
        let exited = Arc::clone(&self.exited);
        let events = self.events.clone();
        let session = self.session;
        std::thread::Builder::new()
            .name(format!("pty-wait-{session}"))
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(_) => None,
                };
                exited.store(true, Ordering::SeqCst);
                let _ = events.send(PtyEvent::Exited { session, code });
            })
            .expect("failed to spawn PTY wait thread");

        self.pty = Some(pty);
        self.state = ShellState::Running;
        log::info!("session {}: shell started in {}", self.session, dir.display());
    }

    /// Re-spawn the shell after it exited. Ignored while still running.
    pub fn restart(&mut self, working_directory: Option<&Path>) {
        if self.state == ShellState::Running {
            log::warn!("session {}: restart ignored, shell still running", self.session);
            return;
        }
        self.state = ShellState::Unstarted;
        self.start(working_directory);
    }

    /// Propagate new dimensions to the PTY.
    ///
    /// Resize events can race process teardown, so this is a silent no-op
    /// whenever the shell is not running.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if self.state != ShellState::Running {
            log::debug!("session {}: resize ignored, shell not running", self.session);
            return;
        }
        if let Some(pty) = &self.pty {
            if let Err(e) = pty.resize(cols, rows) {
                log::warn!("session {}: {e}", self.session);
            }
        }
    }

    /// Write user input to the shell. A no-op when the shell is not running.
    pub fn write_input(&mut self, data: &[u8]) -> Result<(), PtyError> {
        match &mut self.pty {
            Some(pty) if self.state == ShellState::Running => pty.write(data),
            _ => {
                log::debug!("session {}: input dropped, shell not running", self.session);
                Ok(())
            }
        }
    }

    /// Extract the PTY reader for the renderer's I/O thread.
    pub fn take_reader(&mut self) -> Option<Box<dyn std::io::Read + Send>> {
        self.pty.as_mut().and_then(PtyHandle::take_reader)
    }

    /// Signal the shell process to terminate and return immediately.
    ///
    /// Exit is observed asynchronously via the wait thread. If the process
    /// is still alive after a grace period, a second kill is issued. A no-op
    /// unless the shell is running, and at most one signal is sent per
    /// spawned process.
    pub fn terminate(&mut self) {
        if self.state != ShellState::Running || self.kill_issued {
            return;
        }
        let Some(killer) = self.killer.as_mut() else {
            return;
        };

        if let Err(e) = killer.kill() {
            log::warn!("session {}: kill failed: {e}", self.session);
        }
        self.kill_issued = true;

        let mut escalation = killer.clone_killer();
        let exited = Arc::clone(&self.exited);
        let session = self.session;
        std::thread::Builder::new()
            .name(format!("pty-kill-{session}"))
            .spawn(move || {
                std::thread::sleep(TERMINATE_GRACE);
                if !exited.load(Ordering::SeqCst) {
                    log::warn!("session {session}: shell ignored termination, killing again");
                    let _ = escalation.kill();
                }
            })
            .expect("failed to spawn kill escalation thread");
    }

    /// Apply an observed process exit: `Running -> Exited`.
    ///
    /// Also reached from `Unstarted` when a spawn failure is reported. Feeds
    /// an informational line to the display collaborator if it still exists.
    pub fn on_process_exited(&mut self, code: Option<u32>) {
        self.state = ShellState::Exited;
        self.exited.store(true, Ordering::SeqCst);
        self.pty = None;
        self.killer = None;

        if let Some(display) = self.display.as_ref().and_then(Weak::upgrade) {
            display.feed("\r\n");
            match code {
                Some(code) => {
                    display.feed(&format!("[Process completed with exit code {code}]\r\n"));
                }
                None => display.feed("[Process terminated abnormally]\r\n"),
            }
        }
        log::info!("session {}: shell exited with code {:?}", self.session, code);
    }
}

impl Drop for PtyLifecycleController {
    fn drop(&mut self) {
        // A destroyed session must not leave an orphaned shell behind.
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingDisplay {
        fed: Mutex<Vec<String>>,
    }

    impl TerminalDisplay for RecordingDisplay {
        fn feed(&self, text: &str) {
            self.fed.lock().unwrap().push(text.to_string());
        }
    }

    fn new_controller() -> (PtyLifecycleController, mpsc::UnboundedReceiver<PtyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = PtyLifecycleController::new(SessionId::new_v4(), tx);
        (controller, rx)
    }

    /// Drain the PTY reader on a background thread so the shell never blocks
    /// on a full output buffer.
    fn drain_reader(controller: &mut PtyLifecycleController) {
        let mut reader = controller.take_reader().expect("reader already taken");
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        });
    }

    #[test]
    fn test_noops_before_start() {
        let (mut controller, mut rx) = new_controller();

        controller.resize(120, 40);
        controller.terminate();
        controller.write_input(b"ignored").unwrap();

        assert_eq!(controller.state(), ShellState::Unstarted);
        assert!(!controller.termination_requested());
        assert!(rx.try_recv().is_err(), "no events expected before start");
    }

    #[test]
    fn test_spawn_failure_surfaces_as_exit_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = PtyLifecycleController::new(SessionId::new_v4(), tx)
            .with_shell("/nonexistent/shell/binary");

        controller.start(None);

        // No synchronous failure; the exit event carries no exit code.
        match rx.try_recv() {
            Ok(PtyEvent::Exited { session, code }) => {
                assert_eq!(session, controller.session());
                assert_eq!(code, None);
            }
            other => panic!("expected Exited event, got {other:?}"),
        }

        controller.on_process_exited(None);
        assert_eq!(controller.state(), ShellState::Exited);
    }

    #[test]
    fn test_exit_message_fed_to_display() {
        let (mut controller, _rx) = new_controller();
        let recording = Arc::new(RecordingDisplay {
            fed: Mutex::new(Vec::new()),
        });
        let display: Arc<dyn TerminalDisplay> = recording.clone();
        controller.attach_display(&display);

        controller.on_process_exited(Some(3));

        let fed = recording.fed.lock().unwrap().join("");
        assert!(
            fed.contains("[Process completed with exit code 3]"),
            "unexpected display feed: {fed:?}"
        );

        controller.on_process_exited(None);
        let fed = recording.fed.lock().unwrap().join("");
        assert!(fed.contains("[Process terminated abnormally]"));
    }

    #[test]
    fn test_exit_message_dropped_display() {
        let (mut controller, _rx) = new_controller();
        {
            let display: Arc<dyn TerminalDisplay> = Arc::new(RecordingDisplay {
                fed: Mutex::new(Vec::new()),
            });
            controller.attach_display(&display);
        }
        // The display is gone; exiting must not panic.
        controller.on_process_exited(Some(0));
        assert_eq!(controller.state(), ShellState::Exited);
    }

    #[tokio::test]
    async fn test_shell_exit_reports_code() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller =
            PtyLifecycleController::new(SessionId::new_v4(), tx).with_shell("/bin/sh");

        controller.start(Some(&std::env::temp_dir()));
        assert_eq!(controller.state(), ShellState::Running);
        drain_reader(&mut controller);

        controller.write_input(b"exit 0\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for exit event")
            .expect("event channel closed");
        match event {
            PtyEvent::Exited { code, .. } => assert_eq!(code, Some(0)),
            other => panic!("expected Exited, got {other:?}"),
        }

        controller.on_process_exited(Some(0));
        assert_eq!(controller.state(), ShellState::Exited);

        // Restart drives the state machine back to Running.
        controller.restart(None);
        assert_eq!(controller.state(), ShellState::Running);
        drain_reader(&mut controller);
        controller.terminate();
    }

    #[tokio::test]
    async fn test_terminate_signals_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller =
            PtyLifecycleController::new(SessionId::new_v4(), tx).with_shell("/bin/sh");

        controller.start(Some(&std::env::temp_dir()));
        drain_reader(&mut controller);

        controller.terminate();
        assert!(controller.termination_requested());
        // Second call is a no-op.
        controller.terminate();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for exit event")
            .expect("event channel closed");
        assert!(matches!(event, PtyEvent::Exited { .. }));
        controller.on_process_exited(None);

        // Exactly one exit event per spawned process.
        assert!(rx.try_recv().is_err());
        controller.terminate();
        assert_eq!(controller.state(), ShellState::Exited);
    }
}
