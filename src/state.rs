use std::path::PathBuf;

use log::debug;

use crate::error::{CascadeError, Result};
use crate::tape::Tape;
use crate::tracking::Event;
use crate::util::Order;

/// Where the sort is in its schedule.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Splitting the source into runs across the working tapes.
    Distributing,
    /// The first merge level, which also retires the dummy runs.
    FirstCascade,
    /// A merge level over fully real runs.
    Cascade,
    /// The single merge that writes the sorted output.
    LastCascade,
    Done,
}

/// Maps logical tape roles to physical tape slots.
///
/// Role `tape_count - 1` is always the tape a cascade starts writing to; the
/// other roles hold runs. Rotating the schedule only ever permutes this table,
/// tapes never move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleMap(Vec<usize>);

impl RoleMap {
    /// Role `i` on slot `i`.
    pub fn identity(tapes: usize) -> Self {
        Self((0..tapes).collect())
    }

    #[inline]
    pub fn slot(&self, role: usize) -> usize {
        self.0[role]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub(crate) fn swap(&mut self, a: usize, b: usize) {
        self.0.swap(a, b);
    }

    /// Reverses the run-holding roles, leaving the output role in place.
    pub(crate) fn reverse_working(&mut self) {
        let working = self.0.len() - 1;
        self.0[..working].reverse();
    }

    pub(crate) fn reverse_all(&mut self) {
        self.0.reverse();
    }
}

/// An owned copy of the counters at one point of the sort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub event: Event,
    pub phase: Phase,
    pub level: usize,
    /// Real runs per role.
    pub runs: Vec<usize>,
    pub target: Vec<usize>,
    pub fake: Vec<usize>,
}

/// The tapes and run counters of one sort.
///
/// Counters indexed by role follow the role, counters indexed by slot follow
/// the physical tape.
pub struct SortState {
    pub(crate) tapes: Vec<Tape>,
    pub(crate) roles: RoleMap,
    /// Real runs on each physical slot.
    pub(crate) runs: Vec<usize>,
    /// Planned run count per role for the current level.
    pub(crate) target: Vec<usize>,
    /// Runs per role that the plan counted on but the source never supplied.
    pub(crate) fake: Vec<usize>,
    pub(crate) level: usize,
    pub(crate) phase: Phase,
    pub(crate) order: Order,
}

impl SortState {
    /// Creates one empty tape per path.
    pub(crate) fn create(paths: Vec<PathBuf>, order: Order) -> Result<Self> {
        let tapes = paths.into_iter().map(Tape::create).collect::<Result<Vec<_>>>()?;
        for tape in &tapes {
            debug!("Created tape '{}'", tape.path().display());
        }
        let n = tapes.len();
        Ok(Self {
            tapes,
            roles: RoleMap::identity(n),
            runs: vec![0; n],
            target: vec![0; n],
            fake: vec![0; n],
            level: 0,
            phase: Phase::Distributing,
            order,
        })
    }

    pub fn tape_count(&self) -> usize {
        self.tapes.len()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Merge levels still ahead, counting the terminal one.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn roles(&self) -> &RoleMap {
        &self.roles
    }

    /// Real runs currently on the tape playing `role`.
    pub fn runs(&self, role: usize) -> usize {
        self.runs[self.roles.slot(role)]
    }

    pub fn runs_by_role(&self) -> Vec<usize> {
        (0..self.tape_count()).map(|role| self.runs(role)).collect()
    }

    pub fn target(&self) -> &[usize] {
        &self.target
    }

    pub fn fake(&self) -> &[usize] {
        &self.fake
    }

    pub fn snapshot(&self, event: Event) -> Snapshot {
        Snapshot {
            event,
            phase: self.phase,
            level: self.level,
            runs: self.runs_by_role(),
            target: self.target.clone(),
            fake: self.fake.clone(),
        }
    }

    pub(crate) fn tape(&self, role: usize) -> &Tape {
        &self.tapes[self.roles.slot(role)]
    }

    pub(crate) fn tape_mut(&mut self, role: usize) -> &mut Tape {
        let slot = self.roles.slot(role);
        &mut self.tapes[slot]
    }

    /// Borrows the tapes of `sources` (in the given role order) together with
    /// the tape of `dest`.
    pub(crate) fn split_for_merge(
        &mut self,
        sources: &[usize],
        dest: usize,
    ) -> Result<(Vec<&mut Tape>, &mut Tape)> {
        let mut slots: Vec<Option<&mut Tape>> = self.tapes.iter_mut().map(Some).collect();
        let to = take_role(&mut slots, &self.roles, dest)?;
        let from = sources
            .iter()
            .map(|&role| take_role(&mut slots, &self.roles, role))
            .collect::<Result<Vec<_>>>()?;
        Ok((from, to))
    }

    /// Borrows the tapes of `sources`, in the given role order.
    pub(crate) fn tapes_for(&mut self, sources: &[usize]) -> Result<Vec<&mut Tape>> {
        let mut slots: Vec<Option<&mut Tape>> = self.tapes.iter_mut().map(Some).collect();
        sources.iter().map(|&role| take_role(&mut slots, &self.roles, role)).collect()
    }

    /// Empties the tape playing `role`.
    pub(crate) fn clear_role(&mut self, role: usize) -> Result<()> {
        let slot = self.roles.slot(role);
        self.runs[slot] = 0;
        self.tapes[slot].clear()
    }

    /// Counts one run leaving the tape in `slot`.
    pub(crate) fn take_run(&mut self, slot: usize) {
        // Runs written back to back can fuse on disk, so after distribution
        // the counters describe the schedule rather than the tape.
        self.runs[slot] = self.runs[slot].saturating_sub(1);
    }

    /// Checks that every working role's real and dummy runs add up to its
    /// planned count.
    pub(crate) fn check_distribution(&self) -> Result<()> {
        for role in 0..self.tape_count() - 1 {
            let (real, fake, target) = (self.runs(role), self.fake[role], self.target[role]);
            if real + fake != target {
                return Err(CascadeError::invariant(format!(
                    "role {role} holds {real} real and {fake} dummy runs, planned {target}"
                )));
            }
        }
        Ok(())
    }
}

fn take_role<'t>(
    slots: &mut [Option<&'t mut Tape>],
    roles: &RoleMap,
    role: usize,
) -> Result<&'t mut Tape> {
    slots[roles.slot(role)]
        .take()
        .ok_or_else(|| CascadeError::invariant(format!("role {role} used twice in a merge")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(tapes: usize) -> (tempfile::TempDir, SortState) {
        let dir = tempdir().unwrap();
        let paths = (0..tapes).map(|i| dir.path().join(format!("tape{i}"))).collect();
        let state = SortState::create(paths, Order::Descending).unwrap();
        (dir, state)
    }

    #[test]
    fn test_role_map_rotations() {
        let mut roles = RoleMap::identity(5);
        roles.reverse_working();
        assert_eq!(roles.as_slice(), &[3, 2, 1, 0, 4]);
        roles.swap(0, 1);
        assert_eq!(roles.as_slice(), &[2, 3, 1, 0, 4]);
        roles.reverse_all();
        assert_eq!(roles.as_slice(), &[4, 0, 1, 3, 2]);
        assert_eq!(roles.slot(1), 0);
        assert_eq!(roles.len(), 5);
    }

    #[test]
    fn test_runs_follow_roles() {
        let (_dir, mut state) = state(4);
        state.runs = vec![1, 2, 3, 0];
        state.roles.reverse_working();
        assert_eq!(state.runs_by_role(), vec![3, 2, 1, 0]);
        assert_eq!(state.runs(0), 3);
    }

    #[test]
    fn test_split_for_merge_orders_sources_by_role() {
        let (_dir, mut state) = state(4);
        state.roles.reverse_working();
        let (from, to) = state.split_for_merge(&[0, 1], 3).unwrap();
        assert!(from[0].path().ends_with("tape2"));
        assert!(from[1].path().ends_with("tape1"));
        assert!(to.path().ends_with("tape3"));
    }

    #[test]
    fn test_split_for_merge_rejects_overlap() {
        let (_dir, mut state) = state(3);
        let result = state.split_for_merge(&[0, 2], 2);
        assert!(matches!(result, Err(CascadeError::InvariantViolation(_))));
    }

    #[test]
    fn test_tapes_for_follows_roles() {
        let (_dir, mut state) = state(4);
        state.roles.reverse_all();
        let tapes = state.tapes_for(&[0, 1, 2]).unwrap();
        let names: Vec<String> =
            tapes.iter().map(|t| t.path().file_name().unwrap().to_string_lossy().into()).collect();
        assert_eq!(names, ["tape3", "tape2", "tape1"]);

        assert!(matches!(state.tapes_for(&[1, 1]), Err(CascadeError::InvariantViolation(_))));
    }

    #[test]
    fn test_check_distribution() {
        let (_dir, mut state) = state(4);
        state.runs = vec![2, 2, 3, 0];
        state.target = vec![6, 5, 3, 0];
        state.fake = vec![4, 3, 0, 0];
        assert!(state.check_distribution().is_ok());

        state.fake[1] = 2;
        assert!(state.check_distribution().is_err());
    }

    #[test]
    fn test_take_run_saturates() {
        let (_dir, mut state) = state(3);
        state.runs[1] = 1;
        state.take_run(1);
        state.take_run(1);
        assert_eq!(state.runs[1], 0);
    }
}
