//! groupterm-pty: shell process lifecycle for groupterm.
//!
//! This crate owns everything between a terminal tab and its shell process:
//! spawning a login shell on a pseudo-terminal, resizing it, signaling it to
//! terminate, and observing its exit. Terminal emulation is delegated to an
//! external collaborator behind the [`TerminalDisplay`] trait.
//!
//! # Architecture
//!
//! - [`PtyHandle`] — Low-level PTY ownership (spawn, read, write, resize).
//! - [`PtyLifecycleController`] — Per-session `Unstarted -> Running -> Exited`
//!   state machine driven from the coordinating thread.
//! - [`DisplayCallbacks`] — Thread-safe handle the rendering collaborator uses
//!   to post title/directory/resize/exit updates, marshaled back to the
//!   coordinating thread as [`PtyEvent`]s.

pub mod controller;
pub mod display;
pub mod pty;

pub use controller::{PtyEvent, PtyLifecycleController, SessionId, ShellState};
pub use display::{parse_directory_uri, DisplayCallbacks, TerminalDisplay};
pub use pty::{PtyError, PtyHandle, DEFAULT_COLS, DEFAULT_ROWS};
