//! On/off state of the stops of the active instrument

use tracing::debug;

/// Stop states, sized to the active instrument profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopRegister {
    states: Vec<bool>,
}

impl StopRegister {
    pub fn new(num_stops: usize) -> Self {
        Self {
            states: vec![false; num_stops],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_on(&self, stop: usize) -> bool {
        self.states.get(stop).copied().unwrap_or(false)
    }

    pub fn stop_on(&mut self, stop: usize) {
        self.set(stop, true);
    }

    pub fn stop_off(&mut self, stop: usize) {
        self.set(stop, false);
    }

    /// Flip a stop. Out-of-range indices are ignored like in `stop_on`/`stop_off`.
    pub fn toggle_stop(&mut self, stop: usize) {
        let on = self.is_on(stop);
        self.set(stop, !on);
    }

    fn set(&mut self, stop: usize, on: bool) {
        match self.states.get_mut(stop) {
            Some(state) => *state = on,
            None => debug!(stop, stops = self.states.len(), "Ignoring unknown stop"),
        }
    }

    /// Switch every stop off
    pub fn clear(&mut self) {
        self.states.iter_mut().for_each(|s| *s = false);
    }

    /// Resize for a new instrument; all stops start off
    pub fn reset(&mut self, num_stops: usize) {
        self.states = vec![false; num_stops];
    }

    pub fn states(&self) -> &[bool] {
        &self.states
    }
}
