// The cascade merge schedule.
//
// After distribution the working roles `0..n-1` hold runs and role `n - 1` is
// empty. One cascade merges, for `i = n - 2` down to `1`, one run from every
// role `0..=i` onto role `i + 1` until role `i` runs dry, then clears role `i`
// and rewinds role `i + 1` for reading. What is left on role 0 is carried
// over by `Cascade::end_level`, which rotates the roles so the emptied
// tape becomes the next output. Each cascade lowers the level by one; at
// level 1 every working role holds at most one run and a single merge onto
// the destination finishes the sort.

use log::info;

use crate::distribute::Distributor;
use crate::error::{CascadeError, Result};
use crate::merge::merge_run;
use crate::state::{Phase, SortState};
use crate::tape::Tape;
use crate::tracking::{Event, Observer};

/// What a finished schedule did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub tokens: u64,
    pub runs: usize,
    pub levels: usize,
    pub merges: usize,
}

pub(crate) struct Cascade<'a, O> {
    state: &'a mut SortState,
    observer: &'a mut O,
    merges: usize,
}

impl<'a, O: Observer> Cascade<'a, O> {
    pub fn new(state: &'a mut SortState, observer: &'a mut O) -> Self {
        Self { state, observer, merges: 0 }
    }

    /// Sorts `source` in place, stepping through the phases until done.
    pub fn run(mut self, source: &mut Tape) -> Result<Outcome> {
        let mut outcome = Outcome::default();
        loop {
            let next = match self.state.phase {
                Phase::Distributing => {
                    outcome.runs = Distributor::new(self.state, self.observer).distribute(source)?;
                    outcome.levels = self.state.level;
                    if outcome.runs == 0 {
                        Phase::Done
                    } else if self.state.level > 1 {
                        Phase::FirstCascade
                    } else {
                        Phase::LastCascade
                    }
                }
                Phase::FirstCascade => {
                    self.first_cascade()?;
                    self.after_cascade()
                }
                Phase::Cascade => {
                    self.cascade()?;
                    self.after_cascade()
                }
                Phase::LastCascade => {
                    outcome.tokens = self.last_cascade(source)?;
                    Phase::Done
                }
                Phase::Done => break,
            };
            self.state.phase = next;
        }

        self.observer.observe(Event::Finished, self.state);
        outcome.merges = self.merges;
        Ok(outcome)
    }

    fn after_cascade(&self) -> Phase {
        if self.state.level > 1 {
            Phase::Cascade
        } else {
            Phase::LastCascade
        }
    }

    /// The first cascade, which also retires the dummy runs distribution left
    /// behind.
    ///
    /// `quota[j]` is how many runs role `j` was due in the last distribution
    /// level. A role whose dummy count exceeds its quota for the remaining
    /// merges sits a merge out and pays one dummy run instead; a role whose
    /// whole quota from the next-outer boundary is dummy is skipped outright.
    fn first_cascade(&mut self) -> Result<()> {
        let n = self.state.tape_count();
        info!("First cascade at level {}", self.state.level);

        let mut quota: Vec<usize> =
            (0..n).map(|role| self.state.target.get(role + 1).copied().unwrap_or(0)).collect();

        for i in (1..n - 1).rev() {
            let owed = quota[i - 1];

            if self.state.fake[i - 1] == owed {
                // Nothing real reached role i - 1 at the last level, so role i
                // keeps its runs for the next cascade and the output moves in.
                self.state.roles.swap(i, i + 1);
                self.state.clear_role(i)?;
                for j in 0..i {
                    self.state.fake[j] = self.state.fake[j].checked_sub(owed).ok_or_else(|| {
                        CascadeError::invariant(format!("role {j} has fewer dummy runs than owed"))
                    })?;
                    quota[j] -= owed;
                }
                self.observer.observe(Event::DummyRoleSkipped { role: i }, self.state);
                continue;
            }

            for q in &mut quota[..i] {
                *q = q.checked_sub(owed).ok_or_else(|| {
                    CascadeError::invariant(format!("quotas inside role {i} fell below zero"))
                })?;
            }

            while !self.state.tape(i).is_exhausted() {
                let sources: Vec<usize> =
                    (0..=i).filter(|&j| self.state.fake[j] <= quota[j]).collect();
                self.merge_onto(&sources, i + 1)?;

                for j in 0..=i {
                    if self.state.fake[j] > quota[j] {
                        self.state.fake[j] -= 1;
                    }
                }
            }
            self.finish_role(i)?;
        }
        self.end_level()
    }

    /// A cascade over roles that hold only real runs.
    fn cascade(&mut self) -> Result<()> {
        let n = self.state.tape_count();
        info!("Cascade at level {}", self.state.level);

        for i in (1..n - 1).rev() {
            let sources: Vec<usize> = (0..=i).collect();
            while !self.state.tape(i).is_exhausted() {
                self.merge_onto(&sources, i + 1)?;
            }
            self.finish_role(i)?;
        }
        self.end_level()
    }

    /// Merges the final run of every working role onto `dest`.
    fn last_cascade(&mut self, dest: &mut Tape) -> Result<u64> {
        let n = self.state.tape_count();
        info!("Final merge over {} tapes", n - 1);

        dest.clear()?;
        let order = self.state.order;

        let working: Vec<usize> = (0..n - 1).collect();
        let mut from = self.state.tapes_for(&working)?;
        let written = merge_run(&mut from, dest, order)?;
        dest.flush()?;
        self.merges += 1;

        if let Some(role) = (0..n - 1).find(|&role| !self.state.tape(role).is_exhausted()) {
            return Err(CascadeError::invariant(format!(
                "role {role} still holds data after the final merge"
            )));
        }
        self.state.runs.fill(0);
        Ok(written as u64)
    }

    /// Merges one run from each of `sources` onto `dest`.
    fn merge_onto(&mut self, sources: &[usize], dest: usize) -> Result<()> {
        for &role in sources {
            if !self.state.tape(role).is_exhausted() {
                let slot = self.state.roles.slot(role);
                self.state.take_run(slot);
            }
        }

        let order = self.state.order;
        let (mut from, to) = self.state.split_for_merge(sources, dest)?;
        merge_run(&mut from, to, order)?;

        let slot = self.state.roles.slot(dest);
        self.state.runs[slot] += 1;
        self.merges += 1;
        self.observer.observe(Event::RunMerged { role: dest }, self.state);
        Ok(())
    }

    /// Role `i` has been read to the end: empty it and open what was merged
    /// onto role `i + 1` for reading.
    fn finish_role(&mut self, i: usize) -> Result<()> {
        self.state.clear_role(i)?;
        self.state.tape_mut(i + 1).rewind()
    }

    /// Closes a cascade: role 0's leftover runs move to role 1's emptied slot
    /// and the whole role table is reversed for the next level.
    fn end_level(&mut self) -> Result<()> {
        self.state.clear_role(1)?;
        self.state.roles.swap(0, 1);
        self.state.level -= 1;
        self.state.roles.reverse_all();
        self.observer.observe(Event::CascadeEnded { level: self.state.level }, self.state);
        Ok(())
    }
}
