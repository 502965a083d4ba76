//! Cue points (spec §6). Grounded on `cues.h`/`cues.c`: 16 fixed slots, an
//! unset sentinel, and a linear scan for prev/next.

pub const MAX_CUES: usize = 16;

/// A set of cue points for one deck.
pub struct CueSet {
    position: [f64; MAX_CUES],
}

impl CueSet {
    pub fn new() -> Self {
        CueSet {
            position: [f64::INFINITY; MAX_CUES],
        }
    }

    pub fn reset(&mut self) {
        self.position = [f64::INFINITY; MAX_CUES];
    }

    pub fn unset(&mut self, label: usize) {
        self.position[label] = f64::INFINITY;
    }

    pub fn set(&mut self, label: usize, position: f64) {
        self.position[label] = position;
    }

    /// `f64::INFINITY` if the slot is unset.
    pub fn get(&self, label: usize) -> f64 {
        self.position[label]
    }

    pub fn is_unset(position: f64) -> bool {
        position.is_infinite() && position > 0.0
    }

    /// The nearest set cue point before `current`, or `None`.
    pub fn prev(&self, current: f64) -> Option<f64> {
        self.position
            .iter()
            .copied()
            .filter(|p| p.is_finite() && *p < current)
            .fold(None, |best, p| match best {
                Some(b) if b >= p => Some(b),
                _ => Some(p),
            })
    }

    /// The nearest set cue point after `current`, or `None`.
    pub fn next(&self, current: f64) -> Option<f64> {
        self.position
            .iter()
            .copied()
            .filter(|p| p.is_finite() && *p > current)
            .fold(None, |best, p| match best {
                Some(b) if b <= p => Some(b),
                _ => Some(p),
            })
    }
}

impl Default for CueSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_set_is_all_unset() {
        let cues = CueSet::new();
        for n in 0..MAX_CUES {
            assert!(CueSet::is_unset(cues.get(n)));
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut cues = CueSet::new();
        cues.set(3, 12.5);
        assert_eq!(cues.get(3), 12.5);
        cues.unset(3);
        assert!(CueSet::is_unset(cues.get(3)));
    }

    #[test]
    fn prev_and_next_scan_all_slots() {
        let mut cues = CueSet::new();
        cues.set(0, 10.0);
        cues.set(1, 30.0);
        cues.set(2, 20.0);

        assert_eq!(cues.prev(25.0), Some(20.0));
        assert_eq!(cues.next(15.0), Some(20.0));
        assert_eq!(cues.prev(5.0), None);
        assert_eq!(cues.next(35.0), None);
    }
}
