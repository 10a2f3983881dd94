// Progress reporting.
//
// The sort calls an `Observer` after each change to its bookkeeping. The
// observer only gets a shared reference to the `SortState`, so it can look
// but cannot steer.

use log::debug;

use crate::state::{Snapshot, SortState};

/// What just happened to the sort state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A run from the source was written to the tape playing `role`.
    RunDistributed { role: usize },
    /// Distribution computed the run counts for a new level.
    LevelPlanned { level: usize },
    /// One run from each contributing role was merged onto `role`.
    RunMerged { role: usize },
    /// `role` held nothing but dummy runs and was skipped.
    DummyRoleSkipped { role: usize },
    /// A cascade finished; `level` levels remain.
    CascadeEnded { level: usize },
    Finished,
}

/// Receives every step of a sort, after the step is applied.
///
/// Steps are whole runs: one event per run distributed or merged, plus the
/// level boundaries. Individual tokens moving between tapes are not reported.
pub trait Observer {
    fn observe(&mut self, event: Event, state: &SortState);
}

impl<F: FnMut(Event, &SortState)> Observer for F {
    #[inline]
    fn observe(&mut self, event: Event, state: &SortState) {
        self(event, state)
    }
}

/// Ignores everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    #[inline]
    fn observe(&mut self, _event: Event, _state: &SortState) {}
}

/// Writes every event and the per-role counters to the debug log.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn observe(&mut self, event: Event, state: &SortState) {
        debug!(
            "{:?} ({:?}, level {}): real runs {:?}, dummy runs {:?}",
            event,
            state.phase(),
            state.level(),
            state.runs_by_role(),
            state.fake(),
        );
    }
}

/// Keeps a snapshot of the state at every event.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    snapshots: Vec<Snapshot>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Hands over everything recorded so far.
    pub fn take(&mut self) -> Vec<Snapshot> {
        core::mem::take(&mut self.snapshots)
    }
}

impl Observer for Recorder {
    fn observe(&mut self, event: Event, state: &SortState) {
        self.snapshots.push(state.snapshot(event));
    }
}
