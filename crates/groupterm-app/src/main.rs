mod event_loop;
mod io_thread;
mod thumbnails;

use std::io::{self, Read, Write};
use std::sync::Arc;

use tokio::sync::mpsc;

use groupterm_core::Hierarchy;
use groupterm_pty::TerminalDisplay;
use groupterm_store::StateStore;

/// Pass-through display that writes shell output to the controlling
/// terminal.
struct StdoutDisplay;

impl TerminalDisplay for StdoutDisplay {
    fn feed(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (thumb_tx, thumb_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let store = StateStore::at_default_location();
    let mut hierarchy = Hierarchy::restore_or_bootstrap(store, event_tx);

    // Bring the selected tab to the foreground: spawn its shell, wire its
    // output to this terminal, and forward our stdin to it. Background
    // tabs stay unstarted until selected.
    let mut display = None;
    let mut io_stop = None;
    let mut thumb_stop = None;
    if let Some(tab_id) = hierarchy.activate_selected() {
        let shown: Arc<dyn TerminalDisplay> = Arc::new(StdoutDisplay);
        hierarchy.attach_display(tab_id, &shown);

        if let Some(reader) = hierarchy.take_session_reader(tab_id) {
            let (stop_tx, stop_rx) = mpsc::channel(1);
            io_thread::start_io_thread(tab_id, Arc::downgrade(&shown), reader, stop_rx);
            io_stop = Some(stop_tx);
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        thumbnails::start_thumbnail_pump(tab_id, Arc::downgrade(&shown), thumb_tx, stop_rx);
        thumb_stop = Some(stop_tx);

        start_stdin_forwarder(input_tx);
        display = Some(shown);
    }

    event_loop::run(hierarchy, event_rx, thumb_rx, input_rx).await;

    drop(io_stop);
    drop(thumb_stop);
    drop(display);
}

/// Forward this process's stdin to the coordinating task on a dedicated
/// thread, since stdin reads are blocking.
fn start_stdin_forwarder(input: mpsc::UnboundedSender<Vec<u8>>) {
    std::thread::Builder::new()
        .name("stdin-forward".to_string())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 4096];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        if input.send(buf[..n].to_vec()).is_err() {
                            return;
                        }
                    }
                }
            }
        })
        .expect("failed to spawn stdin thread");
}
