//! Open-position counter shared by every per-symbol pipeline.
//!
//! An opening admission reserves a slot before the order is sent. The slot
//! becomes an open position when the fill is applied ([`SlotGuard::commit`])
//! and is returned automatically if the guard is dropped uncommitted (veto
//! later in the pipeline, gateway error). In-flight reservations count against
//! the limit, so two symbols can never both take the last slot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct GaugeState {
    open: usize,
    reserved: usize,
}

#[derive(Debug, Clone)]
pub struct PositionGauge {
    inner: Arc<Mutex<GaugeState>>,
    max_open: usize,
}

impl PositionGauge {
    pub fn new(max_open: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GaugeState::default())),
            max_open,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GaugeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    /// Open positions plus in-flight reservations.
    pub fn count(&self) -> usize {
        let state = self.lock();
        state.open + state.reserved
    }

    pub fn open(&self) -> usize {
        self.lock().open
    }

    /// Reserves a slot, or `None` when the limit is reached.
    pub fn try_reserve(&self) -> Option<SlotGuard> {
        let mut state = self.lock();
        if state.open + state.reserved >= self.max_open {
            return None;
        }
        state.reserved += 1;
        Some(SlotGuard {
            gauge: self.clone(),
            committed: false,
        })
    }

    /// Records that an open position was closed.
    pub fn release_open(&self) {
        let mut state = self.lock();
        state.open = state.open.saturating_sub(1);
    }
}

/// A reserved slot. Dropping it without committing gives the slot back.
#[derive(Debug)]
pub struct SlotGuard {
    gauge: PositionGauge,
    committed: bool,
}

impl SlotGuard {
    /// Turns the reservation into an open position.
    pub fn commit(mut self) {
        let mut state = self.gauge.lock();
        state.reserved = state.reserved.saturating_sub(1);
        state.open += 1;
        drop(state);
        self.committed = true;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.gauge.lock();
            state.reserved = state.reserved.saturating_sub(1);
        }
    }
}
