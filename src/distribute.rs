// Initial run distribution.
//
// Runs from the source are dealt onto the working tapes (every role but the
// last) so that each level's run counts follow a generalized Fibonacci
// sequence of order `tapes - 2`. With `n` tapes, moving from one level to the
// next replaces the planned counts `t` with
//
//     t'[n - 1] = 0
//     t'[k]     = t'[k + 1] + t[n - 2 - k]        for k = n - 2 down to 0
//
// so that for four tapes the plans run (1, 0, 0), (1, 1, 1), (3, 2, 1),
// (6, 5, 3), (14, 11, 6), ... Between levels the working roles are reversed,
// which puts the tape that held `t[n - 2 - k]` runs at role `k`; role `k`
// then only has to receive `t'[k + 1]` new runs to reach `t'[k]`.
//
// When the source runs dry in the middle of a level the shortfall stays
// behind in `fake` and is settled by the first cascade.

use log::{debug, info};

use crate::error::{CascadeError, Result};
use crate::merge::copy_run;
use crate::state::SortState;
use crate::tape::Tape;
use crate::tracking::{Event, Observer};
use crate::util::Token;

pub(crate) struct Distributor<'a, O> {
    state: &'a mut SortState,
    observer: &'a mut O,
    /// Last token written to each physical slot.
    last: Vec<Option<Token>>,
    /// Runs counted so far.
    runs: usize,
}

impl<'a, O: Observer> Distributor<'a, O> {
    pub fn new(state: &'a mut SortState, observer: &'a mut O) -> Self {
        let last = vec![None; state.tape_count()];
        Self { state, observer, last, runs: 0 }
    }

    /// Deals every run of `source` onto the working tapes and rewinds them.
    /// Returns the number of runs counted, zero for an empty source.
    pub fn distribute(mut self, source: &mut Tape) -> Result<usize> {
        if source.is_exhausted() {
            return Ok(0);
        }

        let n = self.state.tape_count();
        info!("Distributing runs over {} working tapes", n - 1);

        self.state.level = 0;
        self.state.target[0] = 1;
        let slot = self.state.roles.slot(0);
        self.copy(source, slot)?;
        self.state.runs[slot] = 1;
        self.runs = 1;
        self.observer.observe(Event::RunDistributed { role: 0 }, self.state);

        while !source.is_exhausted() {
            self.state.level += 1;
            let previous = self.plan_next_level();
            self.state.roles.reverse_working();
            for role in 0..n - 1 {
                self.state.fake[role] = self.state.target[role + 1];
            }
            debug!(
                "Level {}: planned {:?}, new runs per role {:?}",
                self.state.level,
                self.state.target,
                &self.state.fake[..n - 1]
            );
            self.observer.observe(Event::LevelPlanned { level: self.state.level }, self.state);

            self.fill_level(source, &previous)?;
        }

        self.state.check_distribution()?;
        for role in 0..n - 1 {
            self.state.tape_mut(role).rewind()?;
        }

        info!("Distributed {} runs, {} levels to merge", self.runs, self.state.level);
        Ok(self.runs)
    }

    /// Advances `target` to the next level, returning the previous plan.
    fn plan_next_level(&mut self) -> Vec<usize> {
        let n = self.state.tape_count();
        let previous = self.state.target.clone();
        let target = &mut self.state.target;
        for i in 0..n - 1 {
            target[n - i - 2] = target[n - i - 1] + previous[i];
        }
        previous
    }

    /// Walks the roles from the outside in, topping each up towards its plan.
    /// Stops as soon as the source is exhausted.
    fn fill_level(&mut self, source: &mut Tape, previous: &[usize]) -> Result<()> {
        let n = self.state.tape_count();
        for outer in 0..n - 2 {
            for inner in (0..=outer).rev() {
                let head = previous[n - 3 - inner];
                if !self.place(source, inner, head)? {
                    return Ok(());
                }

                let rest = head - previous[n - 2 - inner];
                for role in (0..inner).rev() {
                    if !self.place(source, role, rest)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes up to `count` runs to `role`. Returns false once the source is
    /// exhausted.
    fn place(&mut self, source: &mut Tape, role: usize, count: usize) -> Result<bool> {
        for _ in 0..count {
            let slot = self.state.roles.slot(role);

            // A run that would continue the tape's last run fuses with it on
            // disk, so it goes along uncounted and the next run is the new one.
            if let (Some(last), Some(next)) = (self.last[slot], source.peek()) {
                if self.state.order.continues_run(last, next) {
                    self.copy(source, slot)?;
                }
            }
            if source.is_exhausted() {
                return Ok(false);
            }

            self.copy(source, slot)?;
            self.state.runs[slot] += 1;
            self.runs += 1;
            self.state.fake[role] = self.state.fake[role].checked_sub(1).ok_or_else(|| {
                CascadeError::invariant(format!("role {role} received more runs than planned"))
            })?;
            self.observer.observe(Event::RunDistributed { role }, self.state);
        }
        Ok(true)
    }

    fn copy(&mut self, source: &mut Tape, slot: usize) -> Result<()> {
        let order = self.state.order;
        let last = copy_run(source, &mut self.state.tapes[slot], order)?;
        self.last[slot] = Some(last);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{NoopObserver, Recorder};
    use crate::util::Order;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn setup(tapes: usize, input: &[Token]) -> (TempDir, SortState, Tape) {
        let dir = tempdir().unwrap();
        let paths = (0..tapes).map(|i| dir.path().join(format!("tape{i}"))).collect();
        let state = SortState::create(paths, Order::Descending).unwrap();
        let text: Vec<String> = input.iter().map(|t| t.to_string()).collect();
        let source_path = dir.path().join("input.txt");
        fs::write(&source_path, text.join(" ")).unwrap();
        let source = Tape::open(&source_path).unwrap();
        (dir, state, source)
    }

    #[test]
    fn test_seven_runs_on_four_tapes() {
        // Ascending input: every token is its own run and no run can fuse
        // with the one before it.
        let (_dir, mut state, mut source) = setup(4, &[1, 2, 3, 4, 5, 6, 7]);
        let runs = Distributor::new(&mut state, &mut NoopObserver).distribute(&mut source).unwrap();

        assert_eq!(runs, 7);
        // Plans for four tapes go 1, 3, 6, 14 runs; 7 runs fall into level 3.
        assert_eq!(state.level, 3);
        assert_eq!(state.target, vec![6, 5, 3, 0]);
        assert_eq!(state.runs_by_role(), vec![2, 2, 3, 0]);
        assert_eq!(state.fake, vec![4, 3, 0, 0]);
    }

    #[test]
    fn test_complete_levels_leave_no_dummies() {
        let input: Vec<Token> = (1..=6).collect();
        let (_dir, mut state, mut source) = setup(4, &input);
        Distributor::new(&mut state, &mut NoopObserver).distribute(&mut source).unwrap();

        assert_eq!(state.level, 2);
        assert_eq!(state.target, vec![3, 2, 1, 0]);
        assert_eq!(state.runs_by_role(), vec![3, 2, 1, 0]);
        assert_eq!(state.fake, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_single_run_stays_on_role_zero() {
        let (_dir, mut state, mut source) = setup(3, &[9, 4, 4, 1]);
        let runs = Distributor::new(&mut state, &mut NoopObserver).distribute(&mut source).unwrap();

        assert_eq!(runs, 1);
        assert_eq!(state.level, 0);
        assert_eq!(state.runs_by_role(), vec![1, 0, 0]);
        assert_eq!(state.tape(0).peek(), Some(9));
    }

    #[test]
    fn test_empty_source_touches_nothing() {
        let (_dir, mut state, mut source) = setup(3, &[]);
        let mut recorder = Recorder::new();
        let runs = Distributor::new(&mut state, &mut recorder).distribute(&mut source).unwrap();

        assert_eq!(runs, 0);
        assert!(recorder.snapshots().is_empty());
        assert_eq!(state.runs_by_role(), vec![0, 0, 0]);
    }

    #[test]
    fn test_fusing_runs_are_absorbed() {
        // Runs: [5 3] [8 1] [2] [9 4]. On three tapes the third run lands on
        // the tape ending in 3 and fuses with it, so [9 4] is the one counted.
        let (_dir, mut state, mut source) = setup(3, &[5, 3, 8, 1, 2, 9, 4]);
        let runs = Distributor::new(&mut state, &mut NoopObserver).distribute(&mut source).unwrap();

        assert!(source.is_exhausted());
        assert_eq!(runs, 3);
        assert_eq!(state.level, 2);
        assert_eq!(state.runs_by_role(), vec![2, 1, 0]);
        assert_eq!(state.fake, vec![0, 0, 0]);

        let role0 = state.tape_mut(0);
        let mut tokens = Vec::new();
        while let Some(token) = role0.next().unwrap() {
            tokens.push(token);
        }
        assert_eq!(tokens, vec![5, 3, 2, 9, 4]);
    }

    #[test]
    fn test_events_follow_each_run() {
        let (_dir, mut state, mut source) = setup(3, &[1, 2, 3]);
        let mut recorder = Recorder::new();
        Distributor::new(&mut state, &mut recorder).distribute(&mut source).unwrap();

        let events: Vec<Event> = recorder.take().into_iter().map(|s| s.event).collect();
        assert_eq!(
            events,
            vec![
                Event::RunDistributed { role: 0 },
                Event::LevelPlanned { level: 1 },
                Event::RunDistributed { role: 0 },
                Event::LevelPlanned { level: 2 },
                Event::RunDistributed { role: 0 },
            ]
        );
    }
}
