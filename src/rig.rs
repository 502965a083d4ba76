//! The rig: owns every in-flight track import and library scan (spec §4.6,
//! §5, §6). Grounded on `rig.c`, with the translation to thread-per-import
//! documented in `SPEC_FULL.md`'s Open Question on rig concurrency: rather
//! than one thread multiplexing every subprocess pipe with `poll(2)`, each
//! import gets its own blocking-read thread, and a single dispatcher thread
//! drains their results from an `mpsc` channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use crate::error::Result;
use crate::track::Track;
use crate::track::import::{self, ImportEvent, ImportHandle};

/// A line from a scanner subprocess, tab-separated per spec §6:
/// `pathname \t artist \t title [\t bpm]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub pathname: String,
    pub artist: String,
    pub title: String,
    pub bpm: Option<f64>,
}

/// Parse one scanner output line, skipping malformed lines (spec §6).
pub fn parse_scan_line(line: &str) -> Option<ScanEntry> {
    let mut fields = line.split('\t');
    let pathname = fields.next()?.to_string();
    let artist = fields.next()?.to_string();
    let title = fields.next()?.to_string();
    let bpm = fields.next().and_then(|s| s.parse::<f64>().ok());

    if pathname.is_empty() {
        return None;
    }

    Some(ScanEntry {
        pathname,
        artist,
        title,
        bpm,
    })
}

enum RigMessage {
    Import(ImportEvent),
}

/// Services track imports and (via `scan`) library scans, without ever
/// blocking the realtime thread (spec §5's concurrency tiers).
pub struct Rig {
    events_tx: Sender<RigMessage>,
    events_rx: Receiver<RigMessage>,
    /// Each in-flight import's handle alongside the `Arc<Track>` it's
    /// filling, so `reap_orphaned_imports` can tell when nothing but the
    /// rig itself still references the track (spec's supplemented
    /// `track_put` refcount-1 auto-termination).
    imports: HashMap<String, (ImportHandle, Arc<Track>)>,
}

impl Rig {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Rig {
            events_tx: tx,
            events_rx: rx,
            imports: HashMap::new(),
        }
    }

    /// Start importing `path` via `importer` into `track` (spec §6's
    /// importer subprocess contract).
    pub fn start_import(&mut self, importer: &str, path: &str, rate: u32, track: Arc<Track>) -> Result<()> {
        crate::spin::rt_not_allowed();
        let (event_tx, event_rx) = channel::<ImportEvent>();
        let handle = import::start(importer, path, rate, track.clone(), event_tx)?;
        self.imports.insert(path.to_string(), (handle, track));

        let forward_tx = self.events_tx.clone();
        std::thread::spawn(move || {
            if let Ok(event) = event_rx.recv() {
                let _ = forward_tx.send(RigMessage::Import(event));
            }
        });

        Ok(())
    }

    /// Cancel an in-flight import (spec §5's explicit-cancellation policy,
    /// and the supplemented `track_put` refcount-1 termination semantics).
    pub fn cancel_import(&mut self, path: &str) {
        if let Some((mut handle, _track)) = self.imports.remove(path) {
            handle.cancel();
        }
    }

    /// Drain any completed/failed import notifications without blocking.
    /// The main/UI thread calls this periodically; it never blocks because
    /// the rig's own dispatcher threads (spawned in `start_import`) are the
    /// ones doing the blocking reads. Also reaps any import whose track has
    /// been dropped by every other holder.
    pub fn poll_events(&mut self) -> Vec<ImportEvent> {
        let mut out = Vec::new();
        while let Ok(msg) = self.events_rx.try_recv() {
            match msg {
                RigMessage::Import(event) => {
                    let path = match &event {
                        ImportEvent::Completed { path } => path,
                        ImportEvent::Failed { path, .. } => path,
                    };
                    self.imports.remove(path);
                    out.push(event);
                }
            }
        }
        self.reap_orphaned_imports();
        out
    }

    /// Cancel any import whose track is no longer referenced by anything
    /// but this rig (spec's supplemented `track_put` refcount-1
    /// auto-termination: nobody is waiting on this import to finish
    /// anymore, so don't waste the importer subprocess's work).
    fn reap_orphaned_imports(&mut self) {
        let orphaned: Vec<String> = self
            .imports
            .iter()
            .filter(|(_, (_, track))| Arc::strong_count(track) == 1)
            .map(|(path, _)| path.clone())
            .collect();

        for path in orphaned {
            eprintln!("Abandoning import of '{path}': track has no remaining listeners.");
            self.cancel_import(&path);
        }
    }

    /// Spawn a library scan (`<scanner> scan <directory>`, spec §6),
    /// returning parsed entries as they arrive and a handle for early
    /// cancellation.
    pub fn start_scan(&self, scanner: &str, directory: &str) -> Result<ScanHandle> {
        crate::spin::rt_not_allowed();
        use crate::error::Error;
        use std::io::{BufRead, BufReader};
        use std::process::{Command, Stdio};

        let mut child = Command::new(scanner)
            .arg("scan")
            .arg(directory)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Import(format!("failed to start scanner: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Import("scanner produced no stdout pipe".into()))?;

        let (tx, rx) = channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if let Some(entry) = parse_scan_line(&line) {
                    if tx.send(entry).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(ScanHandle { child, entries: rx })
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScanHandle {
    child: std::process::Child,
    entries: Receiver<ScanEntry>,
}

impl ScanHandle {
    /// Drain any scan entries parsed so far, without blocking.
    pub fn poll_entries(&self) -> Vec<ScanEntry> {
        self.entries.try_iter().collect()
    }

    pub fn cancel(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scan_line_reads_three_field_lines() {
        let entry = parse_scan_line("a/b.wav\tArtist\tTitle").unwrap();
        assert_eq!(entry.pathname, "a/b.wav");
        assert_eq!(entry.artist, "Artist");
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.bpm, None);
    }

    #[test]
    fn parse_scan_line_reads_optional_bpm() {
        let entry = parse_scan_line("a/b.wav\tArtist\tTitle\t128.0").unwrap();
        assert_eq!(entry.bpm, Some(128.0));
    }

    #[test]
    fn parse_scan_line_skips_malformed_lines() {
        assert!(parse_scan_line("").is_none());
        assert!(parse_scan_line("only-one-field").is_none());
    }

    #[test]
    fn rig_starts_empty() {
        let mut rig = Rig::new();
        assert!(rig.poll_events().is_empty());
    }
}
