use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use crate::controller::{PtyEvent, SessionId};

/// Interface to the external terminal-emulation collaborator.
///
/// Escape-sequence parsing, scrollback, and keystroke translation all live
/// behind this trait. The lifecycle controller only feeds informational text
/// after an exit and, best-effort, asks for a bitmap snapshot to use as a
/// sidebar thumbnail.
pub trait TerminalDisplay: Send + Sync {
    /// Write informational text into the terminal view.
    fn feed(&self, text: &str);

    /// Return the currently selected text, if any.
    fn copy_selection(&self) -> Option<String> {
        None
    }

    /// Capture an encoded bitmap snapshot of the rendered output.
    fn snapshot(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Cloneable callback handle given to the rendering collaborator.
///
/// The collaborator invokes these from its own threads. Each call is posted
/// to the event channel and applied later on the coordinating thread, the
/// only place session state is mutated.
#[derive(Clone)]
pub struct DisplayCallbacks {
    session: SessionId,
    events: UnboundedSender<PtyEvent>,
}

impl DisplayCallbacks {
    pub(crate) fn new(session: SessionId, events: UnboundedSender<PtyEvent>) -> Self {
        Self { session, events }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The terminal view changed size.
    pub fn on_resize(&self, cols: u16, rows: u16) {
        let _ = self.events.send(PtyEvent::ViewResized {
            session: self.session,
            cols,
            rows,
        });
    }

    /// The shell set a new window title.
    pub fn on_title_changed(&self, title: &str) {
        let _ = self.events.send(PtyEvent::TitleChanged {
            session: self.session,
            title: title.to_string(),
        });
    }

    /// The shell reported its current directory as a `file://` URI.
    /// Malformed URIs are dropped silently.
    pub fn on_working_directory_reported(&self, uri: &str) {
        match parse_directory_uri(uri) {
            Some(path) => {
                let _ = self.events.send(PtyEvent::WorkingDirectoryChanged {
                    session: self.session,
                    path,
                });
            }
            None => {
                log::debug!("session {}: dropping malformed directory URI {uri:?}", self.session);
            }
        }
    }

    /// The shell process exited. `None` signals abnormal or unknown
    /// termination.
    pub fn on_process_exited(&self, code: Option<u32>) {
        let _ = self.events.send(PtyEvent::Exited {
            session: self.session,
            code,
        });
    }
}

/// Extract the filesystem path from a `file://` URI.
///
/// Shells report their directory (OSC 7) with the reporting hostname in the
/// authority component; only the decoded path is kept.
pub fn parse_directory_uri(uri: &str) -> Option<PathBuf> {
    let mut url = url::Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.set_host(None).ok()?;
    url.to_file_path().ok()
}
