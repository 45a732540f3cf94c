use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use groupterm_pty::{DisplayCallbacks, PtyEvent, TerminalDisplay};
use groupterm_store::{
    PersistedGroup, PersistedState, PersistedTab, Preferences, StateStore,
};

use crate::group::{Group, GroupId};
use crate::tab::{home_directory, Tab, TabId};

pub const MIN_FONT_SIZE: f32 = 8.0;
pub const MAX_FONT_SIZE: f32 = 32.0;
const FONT_SIZE_STEP: f32 = 1.0;

/// The full collection of groups, the global selection, and preferences.
///
/// This is the single source of truth and the only sanctioned mutation
/// surface: group and tab mutations go through here so the cross-entity
/// invariants (exclusive expansion, selection validity, the never-empty
/// floor) stay centralized. Only the coordinating thread may hold this.
///
/// Operations are total: a stale id or an out-of-range index is a logged
/// no-op, never an error. Every mutation of persisted shape saves through
/// the store and bumps the change revision observed via
/// [`Hierarchy::subscribe`].
pub struct Hierarchy {
    groups: Vec<Group>,
    selected_group_id: Option<GroupId>,
    preferences: Preferences,
    store: StateStore,
    events: UnboundedSender<PtyEvent>,
    changed: watch::Sender<u64>,
}

impl Hierarchy {
    /// Seed one default group and tab, then overwrite from a successful
    /// restore. Runs once at process start.
    pub fn restore_or_bootstrap(store: StateStore, events: UnboundedSender<PtyEvent>) -> Self {
        let (changed, _) = watch::channel(0);
        let mut hierarchy = Self {
            groups: Vec::new(),
            selected_group_id: None,
            preferences: Preferences::default(),
            store,
            events,
            changed,
        };

        match hierarchy.store.load() {
            Some(state) => {
                hierarchy.apply_persisted(state);
                log::info!("restored {} group(s)", hierarchy.groups.len());
            }
            None => {
                log::info!("no saved state, using defaults");
                hierarchy.bootstrap();
            }
        }
        hierarchy
    }

    fn bootstrap(&mut self) {
        let tab = Tab::new(self.events.clone(), None);
        let group = Group::new("Group 1".to_string(), tab);
        self.selected_group_id = Some(group.id());
        self.groups = vec![group];
    }

    fn apply_persisted(&mut self, state: PersistedState) {
        self.groups = state
            .groups
            .into_iter()
            .map(|g| {
                let tabs = g
                    .tabs
                    .into_iter()
                    .map(|t| {
                        Tab::restore(t.id, t.title, t.working_directory, self.events.clone())
                    })
                    .collect();
                Group::restore(
                    g.id,
                    g.name,
                    tabs,
                    g.is_expanded,
                    g.selected_tab_id,
                    g.default_working_directory,
                )
            })
            .collect();
        self.preferences = state.preferences;

        if self.groups.is_empty() {
            // The floor invariant holds even against a degenerate file.
            self.bootstrap();
            return;
        }
        self.selected_group_id = state
            .selected_group_id
            .filter(|id| self.groups.iter().any(|g| g.id() == *id))
            .or_else(|| self.groups.first().map(Group::id));

        // A hand-edited file may expand several groups; keep the selected one.
        let selected = self.selected_group_id;
        for group in &mut self.groups {
            group.is_expanded = Some(group.id()) == selected;
        }
    }

    // ------------------------------------------------------------------
    // Queries

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id() == id)
    }

    pub fn selected_group_id(&self) -> Option<GroupId> {
        self.selected_group_id
    }

    pub fn selected_group(&self) -> Option<&Group> {
        self.selected_group_id.and_then(|id| self.group(id))
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Observe the hierarchy-changed revision counter. Every successful
    /// mutation bumps it exactly once.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    // ------------------------------------------------------------------
    // Group operations

    /// Append a new group with one fresh tab, collapse every other group,
    /// and select the new one.
    pub fn create_group(&mut self) -> GroupId {
        let number = self.groups.len() + 1;
        let tab = Tab::new(self.events.clone(), None);
        let group = Group::new(format!("Group {number}"), tab);
        let id = group.id();

        for existing in &mut self.groups {
            existing.is_expanded = false;
        }
        self.selected_group_id = Some(id);
        self.groups.push(group);
        self.commit();
        id
    }

    /// Remove a group after terminating every shell it owns. Selection
    /// falls to the first remaining group. Refuses to remove the last
    /// group, and ignores unknown ids.
    pub fn remove_group(&mut self, id: GroupId) {
        let Some(index) = self.groups.iter().position(|g| g.id() == id) else {
            log::debug!("remove_group: unknown group {id}");
            return;
        };
        if self.groups.len() == 1 {
            log::info!("refusing to remove the last group");
            return;
        }

        let mut group = self.groups.remove(index);
        group.terminate_all();
        if self.selected_group_id == Some(id) {
            self.selected_group_id = self.groups.first().map(Group::id);
        }
        self.commit();
    }

    /// Collapse all groups, then expand and select the target. Idempotent;
    /// an unknown id is a no-op.
    pub fn select_group(&mut self, id: GroupId) {
        if self.group(id).is_none() {
            log::debug!("select_group: unknown group {id}");
            return;
        }
        for group in &mut self.groups {
            group.is_expanded = group.id() == id;
        }
        self.selected_group_id = Some(id);
        self.commit();
    }

    /// Cyclic step to the next group in creation order.
    pub fn select_next_group(&mut self) {
        self.step_group(1);
    }

    /// Cyclic step to the previous group.
    pub fn select_previous_group(&mut self) {
        self.step_group(-1);
    }

    fn step_group(&mut self, delta: isize) {
        if self.groups.len() < 2 {
            return;
        }
        let Some(current) = self
            .selected_group_id
            .and_then(|id| self.groups.iter().position(|g| g.id() == id))
        else {
            return;
        };
        let len = self.groups.len() as isize;
        let next = (current as isize + delta).rem_euclid(len) as usize;
        let id = self.groups[next].id();
        self.select_group(id);
    }

    /// Rename a group. Whitespace-only names are rejected.
    pub fn rename_group(&mut self, id: GroupId, name: &str) {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            log::debug!("rename_group: empty name ignored");
            return;
        }
        let Some(group) = self.group_mut(id) else {
            return;
        };
        group.name = trimmed.to_string();
        self.commit();
    }

    /// Set or clear the directory used for new tabs in a group. A leading
    /// `~` is expanded; a path that is not an existing directory is a
    /// logged no-op.
    pub fn set_group_default_directory(&mut self, id: GroupId, directory: Option<PathBuf>) {
        let resolved = match directory {
            Some(dir) => {
                let expanded = expand_tilde(&dir);
                if !expanded.is_dir() {
                    log::warn!(
                        "set_group_default_directory: {} is not a directory",
                        expanded.display()
                    );
                    return;
                }
                Some(expanded)
            }
            None => None,
        };
        let Some(group) = self.group_mut(id) else {
            return;
        };
        group.default_working_directory = resolved;
        self.commit();
    }

    // ------------------------------------------------------------------
    // Tab operations

    /// Create a tab in a group and select it. The working directory is, in
    /// priority order: the explicit argument, the group default, the home
    /// directory. The shell is not spawned until the tab is displayed.
    pub fn create_tab(
        &mut self,
        group_id: GroupId,
        working_directory: Option<PathBuf>,
    ) -> Option<TabId> {
        let events = self.events.clone();
        let Some(group) = self.group_mut(group_id) else {
            log::debug!("create_tab: unknown group {group_id}");
            return None;
        };
        let dir = working_directory.or_else(|| group.default_working_directory.clone());
        let tab = Tab::new(events, dir);
        let id = tab.id();
        group.add_tab(tab);
        group.select_tab(id);
        self.commit();
        Some(id)
    }

    pub fn create_tab_in_selected_group(&mut self) -> Option<TabId> {
        let group_id = self.selected_group_id?;
        self.create_tab(group_id, None)
    }

    /// Close the selected group's selected tab.
    ///
    /// Refuses to close the only tab of the only group. Closing the last
    /// tab of a group removes the group instead. Otherwise the tab's shell
    /// is terminated, the tab removed, and the group's selection re-derived.
    pub fn close_current_tab(&mut self) {
        let Some(group_id) = self.selected_group_id else {
            return;
        };
        let Some(index) = self.groups.iter().position(|g| g.id() == group_id) else {
            return;
        };
        let Some(tab_id) = self.groups[index].selected_tab_id() else {
            log::debug!("close_current_tab: group {group_id} has no selected tab");
            return;
        };

        if self.groups[index].tabs().len() == 1 {
            if self.groups.len() == 1 {
                log::info!("refusing to close the last tab of the last group");
                return;
            }
            self.remove_group(group_id);
            return;
        }

        let group = &mut self.groups[index];
        if let Some(tab) = group.tab_mut(tab_id) {
            tab.terminate();
        }
        group.remove_tab(tab_id);
        self.commit();
    }

    /// Cyclic step within the selected group's tabs.
    pub fn select_next_tab(&mut self) {
        if let Some(group) = self.selected_group_mut() {
            if group.select_next_tab() {
                self.commit();
            }
        }
    }

    /// See [`Hierarchy::select_next_tab`].
    pub fn select_previous_tab(&mut self) {
        if let Some(group) = self.selected_group_mut() {
            if group.select_previous_tab() {
                self.commit();
            }
        }
    }

    /// Select a specific tab in a group; mismatched ids are no-ops.
    pub fn select_tab(&mut self, group_id: GroupId, tab_id: TabId) {
        let Some(group) = self.group_mut(group_id) else {
            return;
        };
        if group.select_tab(tab_id) {
            self.commit();
        }
    }

    /// Move a tab within its group (drag-reorder).
    pub fn reorder_tab(&mut self, group_id: GroupId, from: usize, to: usize) {
        let Some(group) = self.group_mut(group_id) else {
            return;
        };
        if group.reorder_tab(from, to) {
            self.commit();
        }
    }

    /// Select a tab and spawn its shell if this is its first display.
    /// Folds the group selection in so the whole activation persists and
    /// notifies once.
    pub fn activate_tab(&mut self, group_id: GroupId, tab_id: TabId) {
        if self.group(group_id).is_none() {
            log::debug!("activate_tab: unknown group {group_id}");
            return;
        }
        for group in &mut self.groups {
            group.is_expanded = group.id() == group_id;
        }
        self.selected_group_id = Some(group_id);

        let Some(group) = self.group_mut(group_id) else {
            return;
        };
        group.select_tab(tab_id);
        if let Some(tab) = group.tab_mut(tab_id) {
            tab.ensure_shell_started();
        }
        self.commit();
    }

    /// Spawn the shell of the currently selected tab if it has never run.
    /// Used right after restore: only the foreground tab costs a process.
    pub fn activate_selected(&mut self) -> Option<TabId> {
        let group = self.selected_group_mut()?;
        let tab = group.selected_tab_mut()?;
        let tab_id = tab.id();
        tab.ensure_shell_started();
        self.notify();
        Some(tab_id)
    }

    /// Explicit user-driven restart of an exited shell.
    pub fn restart_tab(&mut self, tab_id: TabId) {
        let Some(tab) = self.tab_mut(tab_id) else {
            log::debug!("restart_tab: unknown tab {tab_id}");
            return;
        };
        tab.restart_shell();
        self.notify();
    }

    /// Store a captured preview image. Cosmetic: bumps the revision but is
    /// never persisted.
    pub fn set_tab_thumbnail(&mut self, tab_id: TabId, image: Vec<u8>) {
        if let Some(tab) = self.tab_mut(tab_id) {
            tab.thumbnail = Some(image);
            self.notify();
        }
    }

    /// Forward user keystrokes to a tab's shell. Unknown tabs and
    /// non-running shells swallow the input.
    pub fn write_session_input(&mut self, tab_id: TabId, data: &[u8]) {
        if let Some(tab) = self.tab_mut(tab_id) {
            if let Err(e) = tab.controller_mut().write_input(data) {
                log::warn!("session {tab_id}: input write failed: {e}");
            }
        }
    }

    /// Extract a tab's PTY reader for the renderer's I/O thread.
    pub fn take_session_reader(&mut self, tab_id: TabId) -> Option<Box<dyn Read + Send>> {
        self.tab_mut(tab_id)?.controller_mut().take_reader()
    }

    /// Callback handle the rendering collaborator uses for a tab.
    pub fn display_callbacks(&self, tab_id: TabId) -> Option<DisplayCallbacks> {
        self.tab(tab_id).map(Tab::display_callbacks)
    }

    /// Attach a tab's rendering collaborator (held weakly).
    pub fn attach_display(&mut self, tab_id: TabId, display: &Arc<dyn TerminalDisplay>) {
        if let Some(tab) = self.tab_mut(tab_id) {
            tab.attach_display(display);
        }
    }

    // ------------------------------------------------------------------
    // Preferences

    pub fn update_preferences(&mut self, preferences: Preferences) {
        self.preferences = preferences;
        self.preferences.font_size = self
            .preferences
            .font_size
            .clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.commit();
    }

    pub fn increase_font_size(&mut self) {
        self.bump_font_size(FONT_SIZE_STEP);
    }

    pub fn decrease_font_size(&mut self) {
        self.bump_font_size(-FONT_SIZE_STEP);
    }

    fn bump_font_size(&mut self, delta: f32) {
        let next = (self.preferences.font_size + delta).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        if next != self.preferences.font_size {
            self.preferences.font_size = next;
            self.commit();
        }
    }

    // ------------------------------------------------------------------
    // Event application

    /// Apply a marshaled PTY event on the coordinating thread. Events for
    /// sessions that no longer exist are dropped silently.
    pub fn apply_event(&mut self, event: PtyEvent) {
        match event {
            PtyEvent::TitleChanged { session, title } => {
                if let Some(tab) = self.tab_mut(session) {
                    tab.title = title;
                    self.notify();
                }
            }
            PtyEvent::WorkingDirectoryChanged { session, path } => {
                if let Some(tab) = self.tab_mut(session) {
                    tab.working_directory = path;
                    self.notify();
                }
            }
            PtyEvent::ViewResized { session, cols, rows } => {
                if let Some(tab) = self.tab_mut(session) {
                    tab.controller_mut().resize(cols, rows);
                }
            }
            PtyEvent::Exited { session, code } => {
                if let Some(tab) = self.tab_mut(session) {
                    tab.mark_exited(code);
                    self.notify();
                }
            }
        }
    }

    /// Terminate every shell and write a final snapshot. Called once on
    /// process shutdown.
    pub fn shutdown(&mut self) {
        for group in &mut self.groups {
            group.terminate_all();
        }
        self.store.save(&self.to_persisted());
    }

    // ------------------------------------------------------------------
    // Internals

    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id() == id)
    }

    fn selected_group_mut(&mut self) -> Option<&mut Group> {
        let id = self.selected_group_id?;
        self.group_mut(id)
    }

    fn tab(&self, id: TabId) -> Option<&Tab> {
        self.groups.iter().find_map(|g| g.tab(id))
    }

    fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.groups.iter_mut().find_map(|g| g.tab_mut(id))
    }

    /// Persist and emit the single hierarchy-changed notification.
    fn commit(&mut self) {
        self.store.save(&self.to_persisted());
        self.notify();
    }

    fn notify(&self) {
        self.changed.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    fn to_persisted(&self) -> PersistedState {
        PersistedState {
            groups: self
                .groups
                .iter()
                .map(|g| PersistedGroup {
                    id: g.id(),
                    name: g.name.clone(),
                    tabs: g
                        .tabs()
                        .iter()
                        .map(|t| PersistedTab {
                            id: t.id(),
                            title: t.title.clone(),
                            working_directory: t.working_directory.clone(),
                        })
                        .collect(),
                    is_expanded: g.is_expanded,
                    selected_tab_id: g.selected_tab_id(),
                    default_working_directory: g.default_working_directory.clone(),
                })
                .collect(),
            selected_group_id: self.selected_group_id,
            preferences: self.preferences.clone(),
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_directory().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
