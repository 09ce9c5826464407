//! Ordering state shared by a resequencing processor and its scheduled job.
//!
//! The job and administrative calls run on different tasks, so every field
//! is atomic and only whole operations are exposed.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Value of the next sequence number before a start number is selected.
pub const UNINITIALIZED: i64 = i64::MAX;

/// Processor lifecycle.
///
/// State machine: Destroyed -> Initialized -> (Active <-> SelectingStartSeq) -> Destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not initialized, or torn down.
    Destroyed,
    /// Initialized but not processing (never activated, or deactivated).
    Initialized,
    /// Scheduled runs release messages.
    Active,
    /// A run is blocked selecting the starting sequence number.
    SelectingStartSeq,
}

/// Atomic ordering state and tuning knobs.
#[derive(Debug)]
pub struct ResequencerState {
    next_sequence: AtomicI64,
    initialized: AtomicBool,
    tried: AtomicU32,
    required_initial_messages: AtomicUsize,
    required_initial_delay_cycles: AtomicU32,
    delete_duplicates: AtomicBool,
    lifecycle: ArcSwap<Lifecycle>,
}

impl ResequencerState {
    #[must_use]
    pub fn new(
        required_initial_messages: usize,
        required_initial_delay_cycles: u32,
        delete_duplicates: bool,
    ) -> Self {
        Self {
            next_sequence: AtomicI64::new(UNINITIALIZED),
            initialized: AtomicBool::new(false),
            tried: AtomicU32::new(0),
            required_initial_messages: AtomicUsize::new(required_initial_messages),
            required_initial_delay_cycles: AtomicU32::new(required_initial_delay_cycles),
            delete_duplicates: AtomicBool::new(delete_duplicates),
            lifecycle: ArcSwap::from_pointee(Lifecycle::Destroyed),
        }
    }

    // -- sequence number ----------------------------------------------------

    /// Smallest sequence number not yet released, `None` before a start number is known.
    #[must_use]
    pub fn next_sequence_number(&self) -> Option<i64> {
        if self.is_initialized() {
            Some(self.next_sequence.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    /// Raw next sequence number, [`UNINITIALIZED`] before selection.
    #[must_use]
    pub fn next_sequence_raw(&self) -> i64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Overrides the next sequence number and marks the state initialized.
    pub fn set_next_sequence_number(&self, next: i64) {
        self.next_sequence.store(next, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Adopts `candidate` as the next sequence number if it is smaller than
    /// the current one. Returns whether it was adopted.
    pub fn offer_start_candidate(&self, candidate: i64) -> bool {
        let previous = self.next_sequence.fetch_min(candidate, Ordering::SeqCst);
        if candidate < previous {
            self.initialized.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Moves the next sequence number from `released` to `released + 1`.
    ///
    /// Leaves it untouched if it changed since `released` was read.
    pub fn advance_from(&self, released: i64) -> bool {
        self.next_sequence
            .compare_exchange(
                released,
                released.saturating_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // -- initialization retries ---------------------------------------------

    pub fn reset_tried(&self) {
        self.tried.store(0, Ordering::SeqCst);
    }

    /// Increments the retry counter, returning the new count.
    pub fn increment_tried(&self) -> u32 {
        self.tried.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    #[must_use]
    pub fn tried(&self) -> u32 {
        self.tried.load(Ordering::SeqCst)
    }

    // -- tuning -------------------------------------------------------------

    #[must_use]
    pub fn required_initial_messages(&self) -> usize {
        self.required_initial_messages.load(Ordering::SeqCst)
    }

    pub fn set_required_initial_messages(&self, count: usize) {
        self.required_initial_messages.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn required_initial_delay_cycles(&self) -> u32 {
        self.required_initial_delay_cycles.load(Ordering::SeqCst)
    }

    pub fn set_required_initial_delay_cycles(&self, cycles: u32) {
        self.required_initial_delay_cycles.store(cycles, Ordering::SeqCst);
    }

    #[must_use]
    pub fn delete_duplicates(&self) -> bool {
        self.delete_duplicates.load(Ordering::SeqCst)
    }

    pub fn set_delete_duplicates(&self, enabled: bool) {
        self.delete_duplicates.store(enabled, Ordering::SeqCst);
    }

    // -- lifecycle ----------------------------------------------------------

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        **self.lifecycle.load()
    }

    /// Moves to `to` if the current state is one of `from`. Returns whether it moved.
    fn transition(&self, from: &[Lifecycle], to: Lifecycle) -> bool {
        let previous = self.lifecycle.rcu(|current| {
            if from.contains(current) {
                Arc::new(to)
            } else {
                Arc::clone(current)
            }
        });
        from.contains(&previous)
    }

    pub fn mark_initialized(&self) -> bool {
        self.transition(&[Lifecycle::Destroyed], Lifecycle::Initialized)
    }

    pub fn activate(&self) -> bool {
        self.transition(
            &[Lifecycle::Initialized, Lifecycle::SelectingStartSeq],
            Lifecycle::Active,
        )
    }

    pub fn deactivate(&self) -> bool {
        self.transition(
            &[Lifecycle::Active, Lifecycle::SelectingStartSeq],
            Lifecycle::Initialized,
        )
    }

    /// Active -> `SelectingStartSeq`, so no other run interleaves with selection.
    pub fn begin_selection(&self) -> bool {
        self.transition(&[Lifecycle::Active], Lifecycle::SelectingStartSeq)
    }

    /// `SelectingStartSeq` -> Active. A deactivation or destroy during selection wins.
    pub fn end_selection(&self) -> bool {
        self.transition(&[Lifecycle::SelectingStartSeq], Lifecycle::Active)
    }

    pub fn mark_destroyed(&self) {
        self.lifecycle.store(Arc::new(Lifecycle::Destroyed));
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }
}
