use std::path::PathBuf;

use uuid::Uuid;

use crate::tab::{Tab, TabId};

/// Unique identifier for a group.
pub type GroupId = Uuid;

/// An ordered collection of tabs with single selection and collapse state.
///
/// Tab order is significant (drag-reorder mutates it). The selection
/// invariant holds at all times: `selected_tab_id` names a present tab, or
/// is `None` iff `tabs` is empty. Mutations are crate-private so the
/// hierarchy stays the only sanctioned mutation surface.
pub struct Group {
    id: GroupId,
    pub name: String,
    tabs: Vec<Tab>,
    /// At most one group in the hierarchy is expanded at any time; the
    /// hierarchy enforces this in its create/select operations.
    pub is_expanded: bool,
    selected_tab_id: Option<TabId>,
    /// Directory for newly created tabs in this group, overriding the home
    /// directory but not an explicit caller argument.
    pub default_working_directory: Option<PathBuf>,
}

impl Group {
    /// Create an expanded group containing one tab, which is selected.
    pub(crate) fn new(name: String, first_tab: Tab) -> Self {
        let selected_tab_id = Some(first_tab.id());
        Self {
            id: GroupId::new_v4(),
            name,
            tabs: vec![first_tab],
            is_expanded: true,
            selected_tab_id,
            default_working_directory: None,
        }
    }

    /// Rebuild a group from persisted fields, repairing the selection if the
    /// file named a tab that is not present.
    pub(crate) fn restore(
        id: GroupId,
        name: String,
        tabs: Vec<Tab>,
        is_expanded: bool,
        selected_tab_id: Option<TabId>,
        default_working_directory: Option<PathBuf>,
    ) -> Self {
        let selected_tab_id = selected_tab_id
            .filter(|id| tabs.iter().any(|t| t.id() == *id))
            .or_else(|| tabs.first().map(Tab::id));
        Self {
            id,
            name,
            tabs,
            is_expanded,
            selected_tab_id,
            default_working_directory,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn selected_tab_id(&self) -> Option<TabId> {
        self.selected_tab_id
    }

    pub fn selected_tab(&self) -> Option<&Tab> {
        self.selected_tab_id.and_then(|id| self.tab(id))
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id() == id)
    }

    pub(crate) fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id() == id)
    }

    pub(crate) fn selected_tab_mut(&mut self) -> Option<&mut Tab> {
        let id = self.selected_tab_id?;
        self.tab_mut(id)
    }

    /// Append a tab; the first tab in an empty group is auto-selected.
    pub(crate) fn add_tab(&mut self, tab: Tab) {
        let id = tab.id();
        self.tabs.push(tab);
        if self.selected_tab_id.is_none() {
            self.selected_tab_id = Some(id);
        }
    }

    /// Select a tab by id. Returns whether the selection changed; an absent
    /// id is a logged no-op.
    pub(crate) fn select_tab(&mut self, id: TabId) -> bool {
        if self.tab(id).is_none() {
            log::debug!("group {}: select of unknown tab {id} ignored", self.id);
            return false;
        }
        if self.selected_tab_id == Some(id) {
            return false;
        }
        self.selected_tab_id = Some(id);
        true
    }

    /// Remove a tab, re-deriving the selection (first remaining tab, or
    /// empty). The caller terminates the tab's process.
    pub(crate) fn remove_tab(&mut self, id: TabId) -> Option<Tab> {
        let index = self.tabs.iter().position(|t| t.id() == id)?;
        let tab = self.tabs.remove(index);
        if self.selected_tab_id == Some(id) {
            self.selected_tab_id = self.tabs.first().map(Tab::id);
        }
        Some(tab)
    }

    /// Cyclic step to the next tab. Returns whether the selection changed.
    pub(crate) fn select_next_tab(&mut self) -> bool {
        self.step_selection(1)
    }

    /// Cyclic step to the previous tab.
    pub(crate) fn select_previous_tab(&mut self) -> bool {
        self.step_selection(-1)
    }

    fn step_selection(&mut self, delta: isize) -> bool {
        if self.tabs.len() < 2 {
            return false;
        }
        let Some(current) = self
            .selected_tab_id
            .and_then(|id| self.tabs.iter().position(|t| t.id() == id))
        else {
            return false;
        };
        let len = self.tabs.len() as isize;
        let next = (current as isize + delta).rem_euclid(len) as usize;
        self.selected_tab_id = Some(self.tabs[next].id());
        true
    }

    /// Move the tab at `from` to position `to`, shifting the tabs between.
    /// Out-of-range or degenerate moves are no-ops. Returns whether the
    /// order changed.
    pub(crate) fn reorder_tab(&mut self, from: usize, to: usize) -> bool {
        if self.tabs.len() < 2 || from == to || from >= self.tabs.len() || to >= self.tabs.len() {
            return false;
        }
        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        true
    }

    /// Signal every owned shell process to terminate.
    pub(crate) fn terminate_all(&mut self) {
        for tab in &mut self.tabs {
            tab.terminate();
        }
    }
}
