//! Periodic thumbnail capture for tab previews.
//!
//! Each displayed session gets its own pump running as a tokio task. Every
//! couple of seconds the pump asks the display for a snapshot image and
//! posts it to the coordinating task, which caches it on the tab. Displays
//! are held weakly so a closed tab tears its pump down.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use groupterm_pty::{SessionId, TerminalDisplay};

const CAPTURE_INTERVAL: Duration = Duration::from_secs(2);

/// A captured preview image, tagged with its session.
pub struct ThumbnailUpdate {
    pub session: SessionId,
    pub image: Vec<u8>,
}

/// Start the thumbnail pump for a session.
///
/// Stops when the stop channel fires or closes, when the display is
/// dropped, or when the update receiver goes away. Displays that return no
/// snapshot (hidden or not yet laid out) are skipped for that tick.
pub fn start_thumbnail_pump(
    session: SessionId,
    display: Weak<dyn TerminalDisplay>,
    updates: mpsc::UnboundedSender<ThumbnailUpdate>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CAPTURE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop_rx.recv() => return,
            }

            let Some(display) = display.upgrade() else {
                return;
            };
            if let Some(image) = display.snapshot() {
                if updates.send(ThumbnailUpdate { session, image }).is_err() {
                    return;
                }
            }
        }
    });
}
