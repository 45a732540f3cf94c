use std::io::{Read, Write};
use std::path::Path;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

/// Default terminal dimensions used until the display reports its real size.
pub const DEFAULT_COLS: u16 = 80;
/// See [`DEFAULT_COLS`].
pub const DEFAULT_ROWS: u16 = 24;

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    Io(std::io::Error),
    ResizeFailed(String),
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::Io(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::ResizeFailed(msg) => write!(f, "PTY resize failed: {msg}"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::Io(err)
    }
}

/// Owns one shell process attached to a pseudo-terminal.
///
/// The PTY device is exclusively owned: no two handles share a device.
/// Dropping the handle closes the master side; the child is reaped (or
/// killed) by whoever called [`PtyHandle::take_child`].
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    child: Option<Box<dyn Child + Send + Sync>>,
}

impl PtyHandle {
    /// Spawn a shell attached to a fresh pseudo-terminal.
    ///
    /// When `shell` is `None` the user's default shell is spawned as a
    /// login shell (argv\[0\] prefixed with `-`), resolved from `$SHELL`.
    /// An explicit `shell` is spawned as given, which tests use to get a
    /// predictable non-login `/bin/sh`.
    ///
    /// The child inherits the full parent environment with the terminal
    /// capability variables overridden to advertise full color support.
    pub fn spawn(
        shell: Option<&str>,
        working_directory: &Path,
        cols: u16,
        rows: u16,
    ) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = match shell {
            Some(s) => CommandBuilder::new(s),
            // Spawns $SHELL (or the system fallback) with the login-shell
            // argv[0] convention.
            None => CommandBuilder::new_default_prog(),
        };

        // portable-pty does not forward the parent environment on its own;
        // copy everything, then layer the terminal capability overrides.
        for (key, value) in std::env::vars_os() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("TERM_PROGRAM", "groupterm");
        cmd.cwd(working_directory);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn command: {e}")))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer,
            child: Some(child),
        })
    }

    /// Resize the PTY; the child receives a window-size-changed signal.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    /// Write bytes to the PTY master (user input -> shell).
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Extract the PTY reader (shell output -> renderer).
    ///
    /// Reads block, so the caller should pump the reader from a dedicated
    /// thread. Returns `None` if the reader was already taken.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Extract the child handle so a reaper thread can block on `wait()`.
    pub fn take_child(&mut self) -> Option<Box<dyn Child + Send + Sync>> {
        self.child.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    fn home() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
    }

    #[test]
    fn test_spawn_pty() {
        let handle = PtyHandle::spawn(Some("/bin/sh"), &home(), 80, 24);
        assert!(handle.is_ok(), "Failed to spawn PTY: {:?}", handle.err());
        let mut handle = handle.unwrap();
        assert!(handle.take_child().is_some());
        assert!(handle.take_reader().is_some());
        // Second take yields nothing.
        assert!(handle.take_reader().is_none());
    }

    #[test]
    fn test_spawn_in_working_directory() {
        let dir = std::env::temp_dir();
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), &dir, 80, 24).unwrap();

        handle.write(b"pwd\n").unwrap();
        thread::sleep(Duration::from_millis(500));

        let mut reader = handle.take_reader().unwrap();
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        let expected = dir.to_string_lossy().to_string();
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            if std::time::Instant::now() > deadline {
                break;
            }
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&output).contains(&expected) {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let text = String::from_utf8_lossy(&output);
        assert!(
            text.contains(expected.trim_end_matches('/')),
            "Expected pwd output to contain {expected}, got: {text}"
        );
    }

    #[test]
    fn test_env_overrides_reach_child() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), &home(), 80, 24).unwrap();

        handle.write(b"echo MARK_$TERM/$COLORTERM/$TERM_PROGRAM\n").unwrap();
        thread::sleep(Duration::from_millis(500));

        let mut reader = handle.take_reader().unwrap();
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            if std::time::Instant::now() > deadline {
                break;
            }
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&output);
                    if text.contains("MARK_xterm-256color/truecolor/groupterm") {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let text = String::from_utf8_lossy(&output);
        assert!(
            text.contains("MARK_xterm-256color/truecolor/groupterm"),
            "Expected terminal capability variables in child env, got: {text}"
        );
    }

    #[test]
    fn test_resize() {
        let handle = PtyHandle::spawn(Some("/bin/sh"), &home(), 80, 24).unwrap();
        let result = handle.resize(120, 40);
        assert!(result.is_ok(), "Resize failed: {:?}", result.err());
    }

    #[test]
    fn test_child_exit_code() {
        let mut handle = PtyHandle::spawn(Some("/bin/sh"), &home(), 80, 24).unwrap();
        let mut child = handle.take_child().unwrap();
        handle.write(b"exit 7\n").unwrap();

        // Drain the reader so the child isn't blocked writing its prompt.
        let mut reader = handle.take_reader().unwrap();
        let drain = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        });

        let status = child.wait().expect("wait failed");
        assert_eq!(status.exit_code(), 7);
        let _ = drain.join();
    }
}
