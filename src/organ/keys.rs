//! Per-manual key state and the aggregate view across manuals
//!
//! Every manual keeps its own key-down map. The aggregate is the logical OR
//! over all manuals, so a note keeps sounding while any manual still holds it.

use tracing::debug;

/// Size of a key map (full MIDI note range)
pub const NUM_KEYS: usize = 128;

/// First key that takes part in diffing
pub const FIRST_KEY: u8 = 35;

/// One past the last key that takes part in diffing
pub const LAST_KEY: u8 = 97;

/// Held/not-held flag for every key number
pub type KeyMap = [bool; NUM_KEYS];

/// Whether `key` lies inside the playable range
pub fn is_active_key(key: u8) -> bool {
    (FIRST_KEY..LAST_KEY).contains(&key)
}

/// Iterator over the playable key range
pub fn active_keys() -> std::ops::Range<u8> {
    FIRST_KEY..LAST_KEY
}

/// Owned copy of every manual's key state, taken with [`KeyStateAggregator::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySnapshot {
    manuals: Vec<KeyMap>,
}

impl KeySnapshot {
    /// Number of keys held across all manuals (counting each manual separately)
    pub fn held_count(&self) -> usize {
        self.manuals
            .iter()
            .map(|m| m.iter().filter(|held| **held).count())
            .sum()
    }
}

/// Key-down state for each configured manual
#[derive(Debug, Clone)]
pub struct KeyStateAggregator {
    manuals: Vec<KeyMap>,
}

impl KeyStateAggregator {
    pub fn new(num_manuals: usize) -> Self {
        Self {
            manuals: vec![[false; NUM_KEYS]; num_manuals],
        }
    }

    pub fn num_manuals(&self) -> usize {
        self.manuals.len()
    }

    /// Mark `key` as held on `manual`. Out-of-range keys or manuals are ignored.
    pub fn key_down(&mut self, manual: usize, key: u8) {
        self.set(manual, key, true);
    }

    /// Mark `key` as released on `manual`. Out-of-range keys or manuals are ignored.
    pub fn key_up(&mut self, manual: usize, key: u8) {
        self.set(manual, key, false);
    }

    fn set(&mut self, manual: usize, key: u8, held: bool) {
        if !is_active_key(key) {
            debug!(manual, key, "Ignoring key outside playable range");
            return;
        }
        match self.manuals.get_mut(manual) {
            Some(keys) => keys[key as usize] = held,
            None => debug!(
                manual,
                key,
                manuals = self.manuals.len(),
                "Ignoring key on unknown manual"
            ),
        }
    }

    /// Whether `key` is held on one specific manual
    pub fn is_held_on(&self, manual: usize, key: u8) -> bool {
        self.manuals
            .get(manual)
            .map(|keys| keys[key as usize & 0x7F])
            .unwrap_or(false)
    }

    /// Logical OR over all manuals, restricted to the playable range
    pub fn aggregate(&self) -> KeyMap {
        let mut keys = [false; NUM_KEYS];
        for key in active_keys() {
            let k = key as usize;
            keys[k] = self.manuals.iter().any(|manual| manual[k]);
        }
        keys
    }

    /// Release every key on every manual
    pub fn clear(&mut self) {
        for manual in &mut self.manuals {
            *manual = [false; NUM_KEYS];
        }
    }

    /// Copy the current per-manual state out
    pub fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            manuals: self.manuals.clone(),
        }
    }

    /// Replace the per-manual state with a previously taken snapshot
    pub fn restore(&mut self, snapshot: KeySnapshot) {
        debug_assert_eq!(snapshot.manuals.len(), self.manuals.len());
        self.manuals = snapshot.manuals;
    }
}
