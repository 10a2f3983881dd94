// A run is a maximal stretch of tokens in which each token continues the
// previous one under the sort order. Both copying and merging end a run at the
// first token that breaks that rule, leaving it unread as the start of the
// next run.

use crate::error::{CascadeError, Result};
use crate::tape::Tape;
use crate::util::{Order, Token};

/// Copies one run from `from` to `to`, returning the last token written.
pub(crate) fn copy_run(from: &mut Tape, to: &mut Tape, order: Order) -> Result<Token> {
    let mut prev = from
        .next()?
        .ok_or_else(|| CascadeError::invariant("copying a run from an exhausted tape"))?;
    to.put(prev)?;

    while let Some(next) = from.peek() {
        if !order.continues_run(prev, next) {
            break;
        }
        from.next()?;
        to.put(next)?;
        prev = next;
    }
    Ok(prev)
}

/// The input whose head goes out next, with that head. Ties go to the input
/// listed first.
#[inline]
fn select(heads: &[Option<Token>], order: Order) -> Option<(usize, Token)> {
    let mut best: Option<(usize, Token)> = None;
    for (i, head) in heads.iter().enumerate() {
        if let Some(token) = *head {
            if best.map_or(true, |(_, b)| order.precedes(token, b)) {
                best = Some((i, token));
            }
        }
    }
    best
}

/// Merges one run from each tape in `from` into a single run on `to`.
///
/// Inputs that are already exhausted take no part. Every other input is left
/// positioned at the first token of its next run. Returns the number of
/// tokens written.
pub(crate) fn merge_run(from: &mut [&mut Tape], to: &mut Tape, order: Order) -> Result<usize> {
    let mut heads = Vec::with_capacity(from.len());
    for tape in from.iter_mut() {
        heads.push(tape.next()?);
    }

    let mut written = 0;
    while let Some((i, token)) = select(&heads, order) {
        to.put(token)?;
        written += 1;

        let tape = &mut *from[i];
        heads[i] = match tape.peek() {
            Some(next) if order.continues_run(token, next) => tape.next()?,
            _ => None,
        };
    }
    Ok(written)
}
