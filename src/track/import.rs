//! Track import: piping a subprocess decoder's stdout into a [`Track`]
//! (spec §6's importer subprocess contract). Grounded on `import.c`, with the
//! original's single-thread `poll(2)` multiplexing replaced by one thread
//! per in-flight import (see `SPEC_FULL.md`'s Open Question on rig
//! concurrency) that blocks on reads from its own subprocess and reports
//! back to the rig dispatcher over a channel.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::track::Track;

/// Outcome reported from an import thread back to the rig dispatcher.
pub enum ImportEvent {
    Completed { path: String },
    Failed { path: String, message: String },
}

/// Spawn `<importer> import <path> <rate>` and stream its stdout into
/// `track`, reporting completion on `events`.
///
/// Runs on its own OS thread; the thread exits once the subprocess closes
/// its stdout, at which point the thread reaps the child and reports
/// success or failure by its exit status (spec §6: a non-zero exit is a
/// failed import even if stdout closed cleanly), or once the process is
/// killed via [`ImportHandle::cancel`].
pub fn start(
    importer: &str,
    path: &str,
    rate: u32,
    track: Arc<Track>,
    events: Sender<ImportEvent>,
) -> Result<ImportHandle> {
    crate::spin::rt_not_allowed();
    eprintln!("Importing '{path}'...");

    let mut child = Command::new(importer)
        .arg("import")
        .arg(path)
        .arg(rate.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Import(format!("failed to start importer: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Import("importer produced no stdout pipe".into()))?;

    let child = Arc::new(Mutex::new(child));
    let path_owned = path.to_string();
    let handle = ImportHandle {
        child: child.clone(),
    };

    std::thread::spawn(move || {
        run_import(stdout, track, path_owned, child, events);
    });

    Ok(handle)
}

/// Reap `child` after its stdout pipe has closed and translate its exit
/// status into an `ImportEvent`. The only call site that ever calls
/// `wait()` on a still-running child — [`ImportHandle::cancel`] only
/// `kill()`s, leaving the reap to this function, so a child is never
/// `wait()`-ed twice.
fn reap(child: &Mutex<Child>, path: String) -> ImportEvent {
    match child.lock().unwrap().wait() {
        Ok(status) if status.success() => {
            eprintln!("Track import completed.");
            ImportEvent::Completed { path }
        }
        Ok(status) => {
            let message = exit_status_message(status);
            eprintln!("Track import did not complete successfully: {message}");
            ImportEvent::Failed { path, message }
        }
        Err(e) => {
            let message = format!("failed to reap importer: {e}");
            eprintln!("Track import did not complete successfully: {message}");
            ImportEvent::Failed { path, message }
        }
    }
}

fn exit_status_message(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("importer exited with status {code}"),
        None => "importer was terminated by a signal".into(),
    }
}

fn run_import(
    mut stdout: impl Read,
    track: Arc<Track>,
    path: String,
    child: Arc<Mutex<Child>>,
    events: Sender<ImportEvent>,
) {
    let mut buf = [0u8; 64 * 1024];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => {
                let _ = events.send(reap(&child, path));
                return;
            }
            Ok(n) => {
                track.append_bytes(&buf[..n]);
            }
            Err(e) => {
                let message = e.to_string();
                eprintln!("Track import did not complete successfully: {message}");
                let _ = events.send(ImportEvent::Failed { path, message });
                return;
            }
        }
    }
}

/// A handle to a running import's subprocess, used for cancellation (spec
/// §5: import termination is explicit, never a timeout).
pub struct ImportHandle {
    child: Arc<Mutex<Child>>,
}

impl ImportHandle {
    /// Terminate the importer subprocess. Mirrors `track_put`'s policy: a
    /// track whose only remaining reference is the rig's own, while still
    /// importing, is not worth finishing (spec's supplemented
    /// cancellation semantics).
    ///
    /// Only ever `kill()`s: the import thread's [`reap`] is the sole
    /// `wait()` caller, so killing here just unblocks its pending read and
    /// lets that thread report the (now-killed) exit status itself.
    pub fn cancel(&mut self) {
        let _ = self.child.lock().unwrap().kill();
    }
}

impl Drop for ImportHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TRACK_RATE;
    use std::sync::mpsc::channel;

    fn spawn_true() -> Arc<Mutex<Child>> {
        let child = Command::new("true")
            .stdout(Stdio::piped())
            .spawn()
            .expect("spawn `true`");
        Arc::new(Mutex::new(child))
    }

    #[test]
    fn run_import_drains_stdout_into_track() {
        let track = crate::track::TrackLibrary::new().new_track(TRACK_RATE, "a", "b");

        let data: Vec<u8> = (0..400i16).flat_map(|v| v.to_ne_bytes()).collect();
        let (tx, rx) = channel();
        let child = spawn_true();
        run_import(std::io::Cursor::new(data), track.clone(), "x".into(), child, tx);

        match rx.recv().unwrap() {
            ImportEvent::Completed { path } => assert_eq!(path, "x"),
            ImportEvent::Failed { .. } => panic!("expected completion"),
        }
        assert!(track.length() > 0);
    }

    #[test]
    fn run_import_reports_failure_on_nonzero_exit() {
        let track = crate::track::TrackLibrary::new().new_track(TRACK_RATE, "a", "b");

        let child = Command::new("false")
            .stdout(Stdio::piped())
            .spawn()
            .expect("spawn `false`");
        let child = Arc::new(Mutex::new(child));

        let (tx, rx) = channel();
        run_import(std::io::Cursor::new(Vec::new()), track, "y".into(), child, tx);

        match rx.recv().unwrap() {
            ImportEvent::Failed { path, .. } => assert_eq!(path, "y"),
            ImportEvent::Completed { .. } => panic!("expected failure on non-zero exit"),
        }
    }
}
