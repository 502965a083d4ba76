//! Append-only track PCM buffer with precomputed meters (spec §4.4).
//! Grounded on `track.c`/`track.h`: block size, PPM/overview fixed-point
//! filters, refcounting and the empty-track singleton all reproduce that
//! source directly. The block storage itself follows `track.h`'s
//! `struct track_block_t *block[TRACK_MAX_BLOCKS]` pointer array: blocks are
//! published through atomic pointers so the realtime reader in
//! `get_sample`/`get_ppm`/`get_overview` never takes a lock, matching
//! `track_get_sample`'s lock-free pointer chase (spec §5: the RT thread must
//! not acquire mutexes).

pub mod import;

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

pub const TRACK_CHANNELS: usize = 2;
pub const TRACK_RATE: u32 = 44100;

pub const TRACK_MAX_BLOCKS: usize = 64;
pub const TRACK_BLOCK_SAMPLES: usize = 2048 * 1024;
pub const TRACK_PPM_RES: usize = 64;
pub const TRACK_OVERVIEW_RES: usize = 2048;

/// One allocated chunk of a track's PCM data plus its precomputed meters.
///
/// Boxed at allocation (spec §9: the realtime path must not page-fault on
/// first touch of a freshly allocated block) and never resized or moved
/// after that — its address is published once into `Track::blocks` and
/// read from for the rest of the track's life.
struct TrackBlock {
    pcm: Box<[i16]>,
    ppm: Box<[u8]>,
    overview: Box<[u8]>,
}

impl TrackBlock {
    fn new() -> Box<Self> {
        Box::new(TrackBlock {
            pcm: vec![0i16; TRACK_BLOCK_SAMPLES * TRACK_CHANNELS].into_boxed_slice(),
            ppm: vec![0u8; TRACK_BLOCK_SAMPLES / TRACK_PPM_RES].into_boxed_slice(),
            overview: vec![0u8; TRACK_BLOCK_SAMPLES / TRACK_OVERVIEW_RES].into_boxed_slice(),
        })
    }
}

/// Import-side cursor: byte offset and running meter accumulators. Guarded
/// by a plain `Mutex` — only the importer thread ever touches this, never
/// the realtime thread (spec §5). The blocks it allocates are published
/// separately (see `Track::blocks`) so readers never need this lock.
struct ImportCursor {
    bytes: usize,
    blocks_allocated: usize,
    ppm: u32,
    overview: u64,
}

impl ImportCursor {
    fn new() -> Self {
        ImportCursor {
            bytes: 0,
            blocks_allocated: 0,
            ppm: 0,
            overview: 0,
        }
    }

    const fn block_pcm_bytes() -> usize {
        TRACK_BLOCK_SAMPLES * TRACK_CHANNELS * std::mem::size_of::<i16>()
    }
}

/// A track's decoded PCM audio, growing as an importer fills it in (spec
/// §4.4). Shared by `Arc` between the rig (writer) and any number of
/// players (readers); `length()` is the single published cursor readers
/// trust, and `blocks` is the published, lock-free storage behind it.
pub struct Track {
    blocks: [AtomicPtr<TrackBlock>; TRACK_MAX_BLOCKS],
    cursor: Mutex<ImportCursor>,
    /// Published length in samples. Only ever grows. Readers on the
    /// realtime thread load this without blocking; the importer stores it
    /// after each commit, after the block data and pointer it depends on
    /// are already visible (an `Acquire` load here happens-after every
    /// write the importer made before the matching `Release` store).
    length: AtomicU64,
    rate: u32,
    pub artist: String,
    pub title: String,
}

fn no_blocks() -> [AtomicPtr<TrackBlock>; TRACK_MAX_BLOCKS] {
    std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut()))
}

impl Track {
    fn new_importing(rate: u32, artist: String, title: String) -> Arc<Self> {
        Arc::new(Track {
            blocks: no_blocks(),
            cursor: Mutex::new(ImportCursor::new()),
            length: AtomicU64::new(0),
            rate,
            artist,
            title,
        })
    }

    /// The shared, zero-length track used before anything is loaded (spec
    /// §4.4's "empty track" singleton) — avoids `Option<Track>` checks on
    /// every player/deck that hasn't loaded a track yet.
    pub fn empty() -> Arc<Track> {
        static EMPTY: OnceLock<Arc<Track>> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                Arc::new(Track {
                    blocks: no_blocks(),
                    cursor: Mutex::new(ImportCursor::new()),
                    length: AtomicU64::new(0),
                    rate: TRACK_RATE,
                    artist: String::new(),
                    title: String::new(),
                })
            })
            .clone()
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Published length in samples, safe to read from the realtime thread.
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    /// Load the published block holding sample `s`. Lock-free: callers only
    /// ever request `s < length()`, and that `Acquire` load already
    /// happens-after the `Release` store that published this block and its
    /// contents (see `Track::length`'s doc), so the pointer here is never
    /// null for a well-behaved caller.
    fn block(&self, s: u64) -> &TrackBlock {
        let idx = (s as usize) / TRACK_BLOCK_SAMPLES;
        let ptr = self.blocks[idx].load(Ordering::Acquire);
        debug_assert!(!ptr.is_null(), "sample {s} requested before its block was published");
        unsafe { &*ptr }
    }

    /// Pointer-free read of one stereo frame.
    pub fn get_sample(&self, s: u64) -> [i16; TRACK_CHANNELS] {
        let within = (s as usize) % TRACK_BLOCK_SAMPLES;
        let block = self.block(s);
        let base = within * TRACK_CHANNELS;
        [block.pcm[base], block.pcm[base + 1]]
    }

    pub fn get_ppm(&self, s: u64) -> u8 {
        let within = (s as usize) % TRACK_BLOCK_SAMPLES;
        self.block(s).ppm[within / TRACK_PPM_RES]
    }

    pub fn get_overview(&self, s: u64) -> u8 {
        let within = (s as usize) % TRACK_BLOCK_SAMPLES;
        self.block(s).overview[within / TRACK_OVERVIEW_RES]
    }

    /// Ensure the block at `block_idx` exists, allocating and publishing one
    /// if this is the first write to reach it. Writer-only (importer
    /// thread, `cursor` already locked by the caller).
    ///
    /// Returns `false` if the track has reached `TRACK_MAX_BLOCKS`, in which
    /// case the caller stops writing (mirrors `more_space`'s "Maximum track
    /// length reached" cap in `track.c`).
    fn ensure_block(&self, cursor: &mut ImportCursor, block_idx: usize) -> bool {
        if block_idx < cursor.blocks_allocated {
            return true;
        }
        if block_idx >= TRACK_MAX_BLOCKS {
            eprintln!("Maximum track length reached.");
            return false;
        }

        let block = Box::into_raw(TrackBlock::new());
        self.blocks[block_idx].store(block, Ordering::Release);
        cursor.blocks_allocated += 1;
        true
    }

    /// Writer-only: the block at `block_idx` is already allocated by this
    /// same (importer) thread, so a relaxed load is enough to recover it.
    fn write_samples(&self, block_idx: usize, byte_offset: usize, data: &[u8]) {
        let ptr = self.blocks[block_idx].load(Ordering::Relaxed);
        let block = unsafe { &mut *ptr };
        let pcm_bytes = unsafe {
            std::slice::from_raw_parts_mut(block.pcm.as_mut_ptr() as *mut u8, block.pcm.len() * 2)
        };
        pcm_bytes[byte_offset..byte_offset + data.len()].copy_from_slice(data);
    }

    /// Meter and publish whole samples newly available after a commit.
    /// Writer-only.
    fn commit_samples(&self, cursor: &mut ImportCursor, length_before: u64, new_samples: u64) {
        let mut fill = (length_before as usize) % TRACK_BLOCK_SAMPLES;
        let block_idx = (length_before as usize) / TRACK_BLOCK_SAMPLES;
        let ptr = self.blocks[block_idx].load(Ordering::Relaxed);
        let block = unsafe { &mut *ptr };

        for _ in 0..new_samples {
            let base = fill * TRACK_CHANNELS;
            let l = block.pcm[base] as i32;
            let r = block.pcm[base + 1] as i32;
            let v = (l.unsigned_abs() + r.unsigned_abs()) as u32;

            if v > cursor.ppm {
                cursor.ppm += (v - cursor.ppm) >> 3;
            } else {
                cursor.ppm -= (cursor.ppm - v) >> 9;
            }
            block.ppm[fill / TRACK_PPM_RES] = (cursor.ppm >> 8) as u8;

            let w = (v as u64) << 16;
            if w > cursor.overview {
                cursor.overview += (w - cursor.overview) >> 8;
            } else {
                cursor.overview -= (cursor.overview - w) >> 17;
            }
            block.overview[fill / TRACK_OVERVIEW_RES] = (cursor.overview >> 24) as u8;

            fill += 1;
        }
    }

    /// Append raw little-endian PCM bytes from the importer, meter the
    /// newly completed samples, and publish the new length.
    ///
    /// Called only from the import thread (spec §6's importer contract).
    pub(crate) fn append_bytes(&self, data: &[u8]) {
        crate::spin::rt_not_allowed();

        let mut offset = 0;
        while offset < data.len() {
            let mut cursor = self.cursor.lock().unwrap();

            let block_idx = cursor.bytes / ImportCursor::block_pcm_bytes();
            if !self.ensure_block(&mut cursor, block_idx) {
                break;
            }

            let fill = cursor.bytes % ImportCursor::block_pcm_bytes();
            let avail = ImportCursor::block_pcm_bytes() - fill;
            let take = avail.min(data.len() - offset);

            self.write_samples(block_idx, fill, &data[offset..offset + take]);
            cursor.bytes += take;
            offset += take;

            let sample_bytes = TRACK_CHANNELS * std::mem::size_of::<i16>();
            let whole_samples = (cursor.bytes / sample_bytes) as u64;
            let length_before = self.length.load(Ordering::Relaxed);
            if whole_samples > length_before {
                self.commit_samples(&mut cursor, length_before, whole_samples - length_before);
                self.length.store(whole_samples, Ordering::Release);
            }
        }
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        for slot in self.blocks.iter_mut() {
            let ptr = *slot.get_mut();
            if !ptr.is_null() {
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}

/// Shared catalog of in-flight/loaded tracks, keyed by (importer, path), so
/// the same track is never imported twice concurrently (spec §4.4,
/// `track_get_by_import`/`track_get_again`). Used only from the rig/control
/// thread, never the realtime thread.
#[derive(Default)]
pub struct TrackLibrary {
    loaded: Mutex<Vec<((String, String), Arc<Track>)>>,
}

impl TrackLibrary {
    pub fn new() -> Self {
        TrackLibrary::default()
    }

    /// Look up an already-acquired track for (importer, path).
    pub fn find(&self, importer: &str, path: &str) -> Option<Arc<Track>> {
        crate::spin::rt_not_allowed();
        let loaded = self.loaded.lock().unwrap();
        loaded
            .iter()
            .find(|((imp, p), _)| imp == importer && p == path)
            .map(|(_, t)| t.clone())
    }

    /// Record a newly created track under (importer, path).
    pub fn register(&self, importer: &str, path: &str, track: Arc<Track>) {
        crate::spin::rt_not_allowed();
        let mut loaded = self.loaded.lock().unwrap();
        loaded.push(((importer.to_string(), path.to_string()), track));
    }

    /// Construct a fresh, empty (pre-import) track ready to be handed to an
    /// importer.
    pub fn new_track(&self, rate: u32, artist: &str, title: &str) -> Arc<Track> {
        crate::spin::rt_not_allowed();
        Track::new_importing(rate, artist.to_string(), title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[(i16, i16)]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * 4);
        for (l, r) in samples {
            out.extend_from_slice(&l.to_ne_bytes());
            out.extend_from_slice(&r.to_ne_bytes());
        }
        out
    }

    #[test]
    fn empty_track_has_zero_length() {
        let t = Track::empty();
        assert_eq!(t.length(), 0);
        assert_eq!(t.rate(), TRACK_RATE);
    }

    #[test]
    fn append_bytes_publishes_length_and_samples() {
        let t = Track::new_importing(44100, "a".into(), "b".into());
        let data = pcm_bytes(&[(100, -100), (200, -200), (300, -300)]);
        t.append_bytes(&data);

        assert_eq!(t.length(), 3);
        assert_eq!(t.get_sample(0), [100, -100]);
        assert_eq!(t.get_sample(2), [300, -300]);
    }

    #[test]
    fn append_bytes_across_multiple_calls_accumulates() {
        let t = Track::new_importing(44100, "a".into(), "b".into());
        let part1 = pcm_bytes(&[(10, -10)]);
        let part2 = pcm_bytes(&[(20, -20), (30, -30)]);
        t.append_bytes(&part1);
        t.append_bytes(&part2);

        assert_eq!(t.length(), 3);
        assert_eq!(t.get_sample(1), [20, -20]);
    }

    #[test]
    fn meter_values_are_nonzero_after_loud_samples() {
        let t = Track::new_importing(44100, "a".into(), "b".into());
        let loud: Vec<(i16, i16)> = (0..200).map(|_| (20000, -20000)).collect();
        t.append_bytes(&pcm_bytes(&loud));
        assert!(t.get_ppm(150) > 0);
    }

    #[test]
    fn library_finds_registered_track_by_key() {
        let lib = TrackLibrary::new();
        let t = lib.new_track(44100, "artist", "title");
        lib.register("importer-x", "/path/a", t.clone());
        assert!(lib.find("importer-x", "/path/a").is_some());
        assert!(lib.find("importer-x", "/path/b").is_none());
    }

    #[test]
    fn reader_thread_sees_only_published_samples_while_writer_appends() {
        let t = Track::new_importing(44100, "a".into(), "b".into());
        let writer = t.clone();
        let reader = t.clone();

        let handle = std::thread::spawn(move || {
            let samples: Vec<(i16, i16)> = (0..5000).map(|i| (i as i16, -(i as i16))).collect();
            writer.append_bytes(&pcm_bytes(&samples));
        });

        // Concurrently, without ever locking anything, read whatever prefix
        // of the track is currently published and check it's consistent.
        for _ in 0..200 {
            let len = reader.length();
            if len > 0 {
                let s = reader.get_sample(len - 1);
                assert_eq!(s[0], -s[1]);
            }
        }

        handle.join().unwrap();
        assert_eq!(t.length(), 5000);
        assert_eq!(t.get_sample(4999), [4999, -4999]);
    }
}
