//! groupterm-core: the session/group state model.
//!
//! A [`Hierarchy`] owns an ordered list of [`Group`]s, each owning an
//! ordered list of [`Tab`]s, each owning one PTY session. The hierarchy is
//! the single mutation surface: it enforces the cross-entity invariants
//! (at least one group, exclusive expansion, valid selections), persists
//! every structural change through `groupterm-store`, and applies PTY
//! events marshaled from background threads.

pub mod group;
pub mod hierarchy;
pub mod tab;

pub use group::{Group, GroupId};
pub use hierarchy::{Hierarchy, MAX_FONT_SIZE, MIN_FONT_SIZE};
pub use tab::{Tab, TabId, DEFAULT_TAB_TITLE};

pub use groupterm_store::{ColorScheme, Preferences, StateStore};
