//! The coordinating task: sole owner of the hierarchy.
//!
//! PTY events, thumbnail captures, and user input all arrive here over
//! channels and are applied to the hierarchy one at a time, so no state
//! mutation ever races another.

use groupterm_core::Hierarchy;
use groupterm_pty::PtyEvent;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::thumbnails::ThumbnailUpdate;

/// Run until the foreground shell exits, the event channel closes, or the
/// process receives Ctrl-C. Shuts the hierarchy down on the way out.
pub async fn run(
    mut hierarchy: Hierarchy,
    mut events: UnboundedReceiver<PtyEvent>,
    mut thumbnails: UnboundedReceiver<ThumbnailUpdate>,
    mut input: UnboundedReceiver<Vec<u8>>,
) {
    loop {
        tokio::select! {
            maybe = events.recv() => {
                let Some(event) = maybe else { break };
                let exited = match &event {
                    PtyEvent::Exited { session, .. } => Some(*session),
                    _ => None,
                };
                hierarchy.apply_event(event);
                if exited.is_some() && exited == foreground_tab(&hierarchy) {
                    break;
                }
            }
            Some(update) = thumbnails.recv() => {
                hierarchy.set_tab_thumbnail(update.session, update.image);
            }
            Some(data) = input.recv() => {
                if let Some(tab) = foreground_tab(&hierarchy) {
                    hierarchy.write_session_input(tab, &data);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    hierarchy.shutdown();
}

fn foreground_tab(hierarchy: &Hierarchy) -> Option<groupterm_core::TabId> {
    hierarchy.selected_group().and_then(|g| g.selected_tab_id())
}
