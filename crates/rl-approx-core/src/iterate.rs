//! Lazy fixed-point iteration and convergence detection
//!
//! Every sequence in this module is pull-based. Nothing is computed until the
//! consumer asks for the next element, and the unbounded ones (`iterate`,
//! `accumulate` over an endless source) never stop on their own: bounding them
//! is the consumer's job, either with `take` or with a `done` predicate through
//! [`converge`].

use crate::{ApproxError, Result};

/// Infinite sequence `start, step(start), step(step(start)), ...`
///
/// Cloning an unconsumed `Iterate` restarts the sequence from `start`.
#[derive(Debug, Clone)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iterate<T, F> {
    state: T,
    step: F,
    started: bool,
}

/// Build the sequence of successive applications of `step` to `start`.
///
/// `step` runs only when the next element is pulled, so the element after the
/// last one consumed is never computed.
pub fn iterate<T, F>(step: F, start: T) -> Iterate<T, F>
where
    T: Clone,
    F: FnMut(&T) -> T,
{
    Iterate {
        state: start,
        step,
        started: false,
    }
}

impl<T, F> Iterator for Iterate<T, F>
where
    T: Clone,
    F: FnMut(&T) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.started {
            self.state = (self.step)(&self.state);
        } else {
            self.started = true;
        }
        Some(self.state.clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

/// Sequence adapter returned by [`converge`]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Converge<I: Iterator, D> {
    iter: I,
    done: D,
    previous: Option<I::Item>,
    finished: bool,
}

/// Re-emit `values` until two consecutive elements satisfy `done`.
///
/// The element that completes the converged pair is emitted, then the
/// sequence ends without pulling anything further from the source. An empty
/// source yields an empty sequence. If the source is infinite and never
/// converges, neither does this.
pub fn converge<I, D>(values: I, done: D) -> Converge<I::IntoIter, D>
where
    I: IntoIterator,
    I::Item: Clone,
    D: FnMut(&I::Item, &I::Item) -> bool,
{
    Converge {
        iter: values.into_iter(),
        done,
        previous: None,
        finished: false,
    }
}

impl<I, D> Iterator for Converge<I, D>
where
    I: Iterator,
    I::Item: Clone,
    D: FnMut(&I::Item, &I::Item) -> bool,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        if self.finished {
            return None;
        }
        let Some(current) = self.iter.next() else {
            self.finished = true;
            return None;
        };
        if let Some(previous) = self.previous.take() {
            if (self.done)(&previous, &current) {
                self.finished = true;
                return Some(current);
            }
        }
        self.previous = Some(current.clone());
        Some(current)
    }
}

/// Final element of a finite sequence, `None` if it is empty
pub fn last<I: IntoIterator>(values: I) -> Option<I::Item> {
    values.into_iter().last()
}

/// Final element emitted by [`converge`].
///
/// # Errors
///
/// [`ApproxError::EmptyInput`] if `values` is empty.
pub fn converged<I, D>(values: I, done: D) -> Result<I::Item>
where
    I: IntoIterator,
    I::Item: Clone,
    D: FnMut(&I::Item, &I::Item) -> bool,
{
    last(converge(values, done))
        .ok_or_else(|| ApproxError::empty("convergence called on an empty sequence"))
}

/// Running-fold sequence returned by [`accumulate`]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Accumulate<I, F, S> {
    iter: I,
    func: F,
    state: Option<S>,
    started: bool,
}

/// Running fold `initial, f(initial, x1), f(f(initial, x1), x2), ...`
///
/// The sequence has one more element than `items` and is as unbounded as
/// `items` is.
pub fn accumulate<I, F, S>(items: I, func: F, initial: S) -> Accumulate<I::IntoIter, F, S>
where
    I: IntoIterator,
    F: FnMut(S, I::Item) -> S,
    S: Clone,
{
    Accumulate {
        iter: items.into_iter(),
        func,
        state: Some(initial),
        started: false,
    }
}

impl<I, F, S> Iterator for Accumulate<I, F, S>
where
    I: Iterator,
    F: FnMut(S, I::Item) -> S,
    S: Clone,
{
    type Item = S;

    fn next(&mut self) -> Option<S> {
        if !self.started {
            self.started = true;
            return self.state.clone();
        }
        let item = self.iter.next()?;
        let state = self.state.take()?;
        let next = (self.func)(state, item);
        self.state = Some(next.clone());
        Some(next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = usize::from(!self.started);
        let (lower, upper) = self.iter.size_hint();
        (
            lower.saturating_add(pending),
            upper.and_then(|u| u.checked_add(pending)),
        )
    }
}

/// Method-call form of [`converge`] and [`converged`]
pub trait ConvergeExt: Iterator + Sized
where
    Self::Item: Clone,
{
    /// See [`converge`]
    fn converge<D>(self, done: D) -> Converge<Self, D>
    where
        D: FnMut(&Self::Item, &Self::Item) -> bool,
    {
        converge(self, done)
    }

    /// See [`converged`]
    ///
    /// # Errors
    ///
    /// [`ApproxError::EmptyInput`] if the sequence is empty.
    fn converged<D>(self, done: D) -> Result<Self::Item>
    where
        D: FnMut(&Self::Item, &Self::Item) -> bool,
    {
        converged(self, done)
    }
}

impl<I> ConvergeExt for I
where
    I: Iterator,
    I::Item: Clone,
{
}
