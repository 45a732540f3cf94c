//! Per-session I/O thread that reads PTY output and feeds the display.
//!
//! Each session gets its own dedicated OS thread because PTY reads are
//! blocking. The reader is extracted from the session up front, so blocking
//! reads never contend with the coordinating task.

use std::io::Read;
use std::sync::Weak;

use tokio::sync::mpsc;

use groupterm_pty::{SessionId, TerminalDisplay};

/// Start the read loop for a session on a dedicated OS thread.
///
/// The display is held weakly; the loop ends when the display is dropped,
/// the stop channel fires, or the PTY reaches EOF.
pub fn start_io_thread(
    session: SessionId,
    display: Weak<dyn TerminalDisplay>,
    reader: Box<dyn Read + Send>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    std::thread::Builder::new()
        .name(format!("pty-io-{session}"))
        .spawn(move || io_loop(display, reader, &mut stop_rx))
        .expect("failed to spawn I/O thread");
}

fn io_loop(
    display: Weak<dyn TerminalDisplay>,
    mut reader: Box<dyn Read + Send>,
    stop_rx: &mut mpsc::Receiver<()>,
) {
    let mut buf = [0u8; 65536];

    loop {
        // Check for stop signal (non-blocking).
        match stop_rx.try_recv() {
            Ok(()) => return,
            Err(mpsc::error::TryRecvError::Disconnected) => return,
            Err(mpsc::error::TryRecvError::Empty) => {}
        }

        // Blocks until data is available or the PTY closes.
        let n = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };

        let Some(display) = display.upgrade() else {
            return;
        };
        display.feed(&String::from_utf8_lossy(&buf[..n]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    struct RecordingDisplay {
        fed: Mutex<String>,
    }

    impl TerminalDisplay for RecordingDisplay {
        fn feed(&self, text: &str) {
            self.fed.lock().unwrap().push_str(text);
        }
    }

    #[test]
    fn test_feeds_until_eof() {
        let display = Arc::new(RecordingDisplay {
            fed: Mutex::new(String::new()),
        });
        let shown: Arc<dyn TerminalDisplay> = display.clone();
        let reader = Box::new(Cursor::new(b"hello\r\nworld".to_vec()));
        let (_stop_tx, mut stop_rx) = mpsc::channel(1);

        io_loop(Arc::downgrade(&shown), reader, &mut stop_rx);

        assert_eq!(*display.fed.lock().unwrap(), "hello\r\nworld");
    }

    #[test]
    fn test_stop_signal_wins_over_pending_data() {
        let display = Arc::new(RecordingDisplay {
            fed: Mutex::new(String::new()),
        });
        let shown: Arc<dyn TerminalDisplay> = display.clone();
        let reader = Box::new(Cursor::new(b"never shown".to_vec()));
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        stop_tx.try_send(()).unwrap();

        io_loop(Arc::downgrade(&shown), reader, &mut stop_rx);

        assert!(display.fed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_display_ends_loop() {
        let display: Arc<dyn TerminalDisplay> = Arc::new(RecordingDisplay {
            fed: Mutex::new(String::new()),
        });
        let weak = Arc::downgrade(&display);
        drop(display);
        let reader = Box::new(Cursor::new(b"data".to_vec()));
        let (_stop_tx, mut stop_rx) = mpsc::channel(1);

        io_loop(weak, reader, &mut stop_rx);
    }
}
