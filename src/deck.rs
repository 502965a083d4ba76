//! A deck: the grouping of a device, timecoder, player and cue points that
//! reflects one turntable in the system (spec §3, §9). Grounded on
//! `deck.c`/`deck.h`, including the `protect`/`deck_is_locked` and punch
//! in/out supplements recovered from that source (see `SPEC_FULL.md` §2).

use std::sync::Arc;

use crate::cues::CueSet;
use crate::device::Device;
use crate::error::Result;
use crate::player::Player;
use crate::realtime::Realtime;
use crate::spin::Spinlock;
use crate::timecoder::Timecoder;
use crate::track::Track;

const NO_PUNCH: f64 = f64::INFINITY;

/// A logical grouping of the components behind one deck in the system.
pub struct Deck {
    pub timecoder: Arc<Spinlock<Timecoder>>,
    pub player: Arc<Player>,
    pub importer: String,
    pub protect: bool,

    cues: CueSet,
    punch: f64,
}

impl Deck {
    /// Construct a deck bound to `device` (already started against the
    /// given timecoder/player by the caller's [`Realtime`]), using
    /// `timecode_def_name` to decode captured audio and `importer` to load
    /// tracks.
    pub fn new(
        realtime: &mut Realtime,
        device: Box<dyn Device>,
        timecode_def_name: &str,
        importer: &str,
        protect: bool,
    ) -> Result<Self> {
        use crate::error::Error;

        let timecoder = Timecoder::new(timecode_def_name)
            .ok_or_else(|| Error::Config(format!("unknown timecode definition '{timecode_def_name}'")))?;
        let timecoder = Arc::new(Spinlock::new(timecoder));
        let player = Arc::new(Player::new(Track::empty()));

        realtime.add_device(device, timecoder.clone(), player.clone())?;

        Ok(Deck {
            timecoder,
            player,
            importer: importer.to_string(),
            protect,
            cues: CueSet::new(),
            punch: NO_PUNCH,
        })
    }

    /// A protected deck refuses to load/recue while actively playing
    /// (spec's supplemented `deck_is_locked`).
    pub fn is_locked(&self) -> bool {
        self.protect && self.player.is_active()
    }

    /// Replace the loaded track (spec's `deck_load`). Refused while locked.
    pub fn load(&self, track: Arc<Track>) -> bool {
        if self.is_locked() {
            eprintln!("Stop deck to load a different track");
            return false;
        }
        self.player.set_track(track);
        true
    }

    pub fn recue(&self) -> bool {
        if self.is_locked() {
            eprintln!("Stop deck to recue");
            return false;
        }
        self.player.recue();
        true
    }

    pub fn clone_from(&self, from: &Deck) {
        self.player.clone_state_from(&from.player);
    }

    pub fn unset_cue(&mut self, label: usize) {
        self.cues.unset(label);
    }

    /// Seek to a cue point, or set it at the current position if unset
    /// (spec's `deck_cue`).
    pub fn cue(&mut self, label: usize) {
        let p = self.cues.get(label);
        if CueSet::is_unset(p) {
            self.cues.set(label, self.player.get_elapsed());
        } else {
            self.player.seek_to(p);
        }
    }

    /// Seek to a cue point, remembering how to return (spec's supplemented
    /// `deck_punch_in`, from `deck.c`). Overrides an existing punch.
    pub fn punch_in(&mut self, label: usize) {
        let mut e = self.player.get_elapsed();
        let p = self.cues.get(label);
        if CueSet::is_unset(p) {
            self.cues.set(label, e);
            return;
        }

        if self.punch != NO_PUNCH {
            e -= self.punch;
        }

        self.player.seek_to(p);
        self.punch = p - e;
    }

    /// Return from a punch-in (spec's supplemented `deck_punch_out`).
    pub fn punch_out(&mut self) {
        if self.punch == NO_PUNCH {
            return;
        }
        let e = self.player.get_elapsed();
        self.player.seek_to(e - self.punch);
        self.punch = NO_PUNCH;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::dummy::DummyDevice;
    use crate::track::TrackLibrary;

    fn make_deck() -> Deck {
        let mut rt = Realtime::new();
        Deck::new(&mut rt, Box::new(DummyDevice::new()), "serato_2a", "importer", false).unwrap()
    }

    #[test]
    fn new_deck_is_unlocked_with_no_cues_set() {
        let mut deck = make_deck();
        assert!(!deck.is_locked());
        deck.cue(0);
        // first call on an unset cue sets it rather than seeking.
        assert!(!CueSet::is_unset(deck.cues.get(0)));
    }

    #[test]
    fn load_refused_while_protected_and_active() {
        let mut rt = Realtime::new();
        let deck = Deck::new(&mut rt, Box::new(DummyDevice::new()), "serato_2a", "importer", true).unwrap();
        let track = TrackLibrary::new().new_track(44100, "a", "b");
        // player starts inactive (pitch 0), so load should still succeed.
        assert!(deck.load(track));
    }

    #[test]
    fn punch_in_then_out_round_trips_position() {
        let mut deck = make_deck();

        // Set cue 0 at elapsed = 5.0.
        deck.player.seek_to(5.0);
        deck.cue(0);
        assert!((deck.player.get_elapsed() - 5.0).abs() < 1e-9);

        // Move elsewhere, then punch in to the cue.
        deck.player.seek_to(20.0);
        deck.punch_in(0);
        assert!((deck.player.get_elapsed() - 5.0).abs() < 1e-9);
        assert_ne!(deck.punch, NO_PUNCH);

        // Punching out returns to where punch_in was called from.
        deck.punch_out();
        assert!((deck.player.get_elapsed() - 20.0).abs() < 1e-6);
        assert_eq!(deck.punch, NO_PUNCH);
    }
}
