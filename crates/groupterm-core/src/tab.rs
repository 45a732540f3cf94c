use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use groupterm_pty::{
    DisplayCallbacks, PtyEvent, PtyLifecycleController, SessionId, ShellState, TerminalDisplay,
};

/// Unique identifier for a tab. A tab and its PTY session share one id.
pub type TabId = SessionId;

/// Title given to every new tab until the shell reports one.
pub const DEFAULT_TAB_TITLE: &str = "Terminal";

/// One interactive shell session and its display metadata.
///
/// A tab exclusively owns its [`PtyLifecycleController`] for its entire
/// lifetime; the controller reports back through the shared event channel
/// rather than holding a reference to the tab. Dropping a tab terminates
/// the underlying process.
pub struct Tab {
    id: TabId,
    /// Display title, overwritten by shell-reported titles.
    pub title: String,
    /// Absolute path, overwritten by shell-reported directory updates.
    pub working_directory: PathBuf,
    /// Cached preview image. Cosmetic, never persisted.
    pub thumbnail: Option<Vec<u8>>,
    has_started_shell: bool,
    has_exited: bool,
    controller: PtyLifecycleController,
}

impl Tab {
    /// Create a tab whose shell will start in `working_directory`, or the
    /// home directory when `None`. The shell itself is not spawned until
    /// [`Tab::ensure_shell_started`].
    pub fn new(events: UnboundedSender<PtyEvent>, working_directory: Option<PathBuf>) -> Self {
        let id = TabId::new_v4();
        Self {
            id,
            title: DEFAULT_TAB_TITLE.to_string(),
            working_directory: working_directory.unwrap_or_else(home_directory),
            thumbnail: None,
            has_started_shell: false,
            has_exited: false,
            controller: PtyLifecycleController::new(id, events),
        }
    }

    /// Rebuild a tab from persisted fields. Restored tabs never carry a live
    /// process: the shell stays unstarted until the tab is displayed again.
    pub(crate) fn restore(
        id: TabId,
        title: String,
        working_directory: PathBuf,
        events: UnboundedSender<PtyEvent>,
    ) -> Self {
        Self {
            id,
            title,
            working_directory,
            thumbnail: None,
            has_started_shell: false,
            has_exited: false,
            controller: PtyLifecycleController::new(id, events),
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn has_started_shell(&self) -> bool {
        self.has_started_shell
    }

    pub fn has_exited(&self) -> bool {
        self.has_exited
    }

    pub fn shell_state(&self) -> ShellState {
        self.controller.state()
    }

    pub(crate) fn controller_mut(&mut self) -> &mut PtyLifecycleController {
        &mut self.controller
    }

    /// Callback handle for the rendering collaborator showing this tab.
    pub fn display_callbacks(&self) -> DisplayCallbacks {
        self.controller.callbacks()
    }

    /// Attach the rendering collaborator (held weakly by the controller).
    pub fn attach_display(&mut self, display: &Arc<dyn TerminalDisplay>) {
        self.controller.attach_display(display);
    }

    /// Spawn the shell on first display. Idempotent: later calls while the
    /// flag is set do nothing, so batch-restored tabs cost nothing until
    /// they are brought to the foreground.
    pub(crate) fn ensure_shell_started(&mut self) {
        if self.has_started_shell {
            return;
        }
        let dir = self.working_directory.clone();
        self.controller.start(Some(&dir));
        self.has_started_shell = true;
    }

    /// Explicit user-driven restart after the shell exited.
    pub(crate) fn restart_shell(&mut self) {
        self.has_exited = false;
        self.has_started_shell = false;
        let dir = self.working_directory.clone();
        self.controller.restart(Some(&dir));
        self.has_started_shell = true;
    }

    /// Apply an observed process exit.
    pub(crate) fn mark_exited(&mut self, code: Option<u32>) {
        self.controller.on_process_exited(code);
        self.has_exited = true;
    }

    /// Signal the shell to terminate. Also runs on drop.
    pub(crate) fn terminate(&mut self) {
        self.controller.terminate();
    }

    /// Whether a termination signal has been issued for the current process.
    pub fn termination_requested(&self) -> bool {
        self.controller.termination_requested()
    }

    #[cfg(test)]
    pub(crate) fn override_shell(&mut self, shell: &str) {
        self.controller.set_shell(shell);
    }
}

/// The user's home directory, used as the last fallback for every
/// working-directory resolution.
pub(crate) fn home_directory() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn new_tab(working_directory: Option<PathBuf>) -> Tab {
        let (tx, _rx) = mpsc::unbounded_channel();
        Tab::new(tx, working_directory)
    }

    #[test]
    fn test_new_tab_defaults() {
        let tab = new_tab(None);
        assert_eq!(tab.title, DEFAULT_TAB_TITLE);
        assert_eq!(tab.working_directory, home_directory());
        assert!(!tab.has_started_shell());
        assert!(!tab.has_exited());
        assert_eq!(tab.shell_state(), ShellState::Unstarted);
        assert!(tab.thumbnail.is_none());
    }

    #[test]
    fn test_explicit_directory_wins_over_home() {
        let tab = new_tab(Some(PathBuf::from("/srv/project")));
        assert_eq!(tab.working_directory, PathBuf::from("/srv/project"));
    }

    #[test]
    fn test_restored_tab_is_unstarted() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = TabId::new_v4();
        let tab = Tab::restore(id, "vim".to_string(), PathBuf::from("/tmp"), tx);
        assert_eq!(tab.id(), id);
        assert_eq!(tab.title, "vim");
        assert!(!tab.has_started_shell());
        assert_eq!(tab.shell_state(), ShellState::Unstarted);
    }

    #[test]
    fn test_ensure_shell_started_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tab = Tab::new(tx, None);
        // A shell that cannot spawn still flips the started flag; failure
        // arrives through the exit event.
        tab.override_shell("/nonexistent/shell/binary");

        tab.ensure_shell_started();
        assert!(tab.has_started_shell());
        let first = rx.try_recv();
        assert!(matches!(first, Ok(PtyEvent::Exited { code: None, .. })));

        tab.ensure_shell_started();
        assert!(rx.try_recv().is_err(), "second call must not spawn again");
    }

    #[test]
    fn test_mark_exited() {
        let mut tab = new_tab(None);
        tab.mark_exited(None);
        assert!(tab.has_exited());
        assert_eq!(tab.shell_state(), ShellState::Exited);
    }
}
