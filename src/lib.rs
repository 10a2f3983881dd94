//! Cascadesort sorts a file of integers that does not fit in memory using a
//! polyphase cascade merge over a handful of on-disk tapes. Tapes are only
//! ever read and written sequentially, and the number of full passes over the
//! data is kept to the minimum a fixed tape budget allows.
//!
//! The source is split into runs (maximal stretches already in order) and
//! those runs are spread over all tapes but one following a generalized
//! Fibonacci distribution. Each cascade then merges runs level by level,
//! rotating which tape is written, until one merge writes the whole sorted
//! sequence back over the source.
//!
//! Output is non-increasing (largest first) unless [`Order::Ascending`] is
//! requested.
//!
//! ```no_run
//! let stats = cascadesort::sort("numbers.txt", 6)?;
//! println!("sorted {} tokens", stats.tokens);
//! # Ok::<(), cascadesort::CascadeError>(())
//! ```

// Two tapes to merge from and one to merge onto.
pub const MIN_TAPES: usize = 3;

// Tape count used when the caller does not pick one.
pub const DEFAULT_TAPES: usize = 6;

// Tapes are named by this prefix followed by their index.
const DEFAULT_TAPE_PREFIX: &str = "tape";

mod cascade;
mod distribute;
mod error;
mod merge;
mod sorter;
mod state;
mod tape;
mod tracking;
mod util;

use std::path::Path;

pub use error::{CascadeError, Result};
pub use sorter::{CascadeSorter, SortStats};
pub use state::{Phase, RoleMap, Snapshot, SortState};
pub use tracking::{Event, LogObserver, NoopObserver, Observer, Recorder};
pub use util::{Order, Token};

/// Sorts the integers in the file at `path` in place, largest first, using
/// `tapes` temporary tapes.
///
/// Fails with [`CascadeError::Configuration`] before touching any file if
/// `tapes` is below [`MIN_TAPES`], and with [`CascadeError::Open`] if the file
/// cannot be opened for reading and writing. An empty file is left as is.
pub fn sort(path: impl AsRef<Path>, tapes: usize) -> Result<SortStats> {
    CascadeSorter::new(tapes).sort(path)
}

/// Like [`sort`], reporting every step to `observer`.
pub fn sort_with_observer<O: Observer>(
    path: impl AsRef<Path>,
    tapes: usize,
    observer: &mut O,
) -> Result<SortStats> {
    CascadeSorter::new(tapes).sort_with_observer(path, observer)
}
