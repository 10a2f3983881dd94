use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use tempfile::TempDir;

use crate::cascade::Cascade;
use crate::error::{CascadeError, Result};
use crate::state::SortState;
use crate::tape::Tape;
use crate::tracking::{NoopObserver, Observer};
use crate::util::Order;
use crate::{DEFAULT_TAPES, DEFAULT_TAPE_PREFIX, MIN_TAPES};

/// Cascade sort of a file of integers.
#[derive(Clone, Debug)]
pub struct CascadeSorter {
    /// Number of tapes, one of which is always being written.
    tapes: usize,
    /// Directory for the tapes; a private temporary directory if unset.
    temp_dir: Option<PathBuf>,
    /// File name prefix of each tape, followed by its index.
    tape_prefix: String,
    order: Order,
}

impl Default for CascadeSorter {
    fn default() -> Self {
        Self::new(DEFAULT_TAPES)
    }
}

impl CascadeSorter {
    /// Create a sorter that uses `tapes` tapes. At least [`MIN_TAPES`] are
    /// needed, which is checked when a sort starts.
    #[must_use]
    pub fn new(tapes: usize) -> Self {
        Self {
            tapes,
            temp_dir: None,
            tape_prefix: DEFAULT_TAPE_PREFIX.to_string(),
            order: Order::default(),
        }
    }

    /// Keep the tapes in `path` instead of a private temporary directory.
    /// Tapes placed there are left behind once the sort completes.
    #[must_use]
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Set the file name prefix of the tapes.
    #[must_use]
    pub fn tape_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tape_prefix = prefix.into();
        self
    }

    /// Set the order of the sorted output.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Sort the file at `path` in place.
    pub fn sort(&self, path: impl AsRef<Path>) -> Result<SortStats> {
        self.sort_with_observer(path, &mut NoopObserver)
    }

    /// Sort the file at `path` in place, reporting progress to `observer`.
    pub fn sort_with_observer<O: Observer>(
        &self,
        path: impl AsRef<Path>,
        observer: &mut O,
    ) -> Result<SortStats> {
        let path = path.as_ref();
        if self.tapes < MIN_TAPES {
            return Err(CascadeError::Configuration { tapes: self.tapes });
        }

        let mut source = Tape::open(path)?;
        info!("Cascade sorting '{}' with {} tapes ({:?})", path.display(), self.tapes, self.order);

        // Dropped on every way out of this function, taking a scratch
        // directory and its tapes with it.
        let dir = self.tape_dir()?;
        let paths: Vec<PathBuf> =
            (0..self.tapes).map(|i| dir.path().join(format!("{}{i}", self.tape_prefix))).collect();
        check_apart(path, &paths)?;

        let mut state = SortState::create(paths, self.order)?;
        let outcome = Cascade::new(&mut state, observer).run(&mut source)?;

        let stats = SortStats {
            tokens: outcome.tokens,
            initial_runs: outcome.runs,
            levels: outcome.levels,
            merges: outcome.merges,
        };
        info!(
            "Sorted {} tokens from {} runs over {} levels in {} merges",
            stats.tokens, stats.initial_runs, stats.levels, stats.merges
        );
        Ok(stats)
    }

    fn tape_dir(&self) -> Result<TapeDir> {
        match &self.temp_dir {
            Some(base) => {
                fs::create_dir_all(base).map_err(|e| CascadeError::io(base, e))?;
                Ok(TapeDir::Kept(base.clone()))
            }
            None => TempDir::new()
                .map(TapeDir::Scratch)
                .map_err(|e| CascadeError::io(&std::env::temp_dir(), e)),
        }
    }
}

/// Fails if any tape in `tapes` resolves to the same file as `source`.
///
/// Tapes are truncated on creation, so this has to run before the first one
/// is created.
fn check_apart(source: &Path, tapes: &[PathBuf]) -> Result<()> {
    let source = fs::canonicalize(source).map_err(|e| CascadeError::io(source, e))?;
    for tape in tapes {
        let resolved = match tape.parent().map(fs::canonicalize) {
            Some(Ok(dir)) => tape.file_name().map_or_else(|| dir.clone(), |name| dir.join(name)),
            _ => tape.clone(),
        };
        // An existing tape may itself be a link to the source.
        let resolved = fs::canonicalize(&resolved).unwrap_or(resolved);
        if resolved == source {
            return Err(CascadeError::TapeCollision { path: tape.clone() });
        }
    }
    Ok(())
}

/// Where the tapes of one sort live.
enum TapeDir {
    /// A caller-chosen directory, left in place afterwards.
    Kept(PathBuf),
    /// A private directory removed on drop.
    Scratch(TempDir),
}

impl TapeDir {
    fn path(&self) -> &Path {
        match self {
            TapeDir::Kept(path) => path,
            TapeDir::Scratch(dir) => dir.path(),
        }
    }
}

/// Statistics from a sort.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Tokens written to the sorted output.
    pub tokens: u64,
    /// Runs the source was split into.
    pub initial_runs: usize,
    /// Merge levels planned by distribution.
    pub levels: usize,
    /// Run merges performed, the final one included.
    pub merges: usize,
}
