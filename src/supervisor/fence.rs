//! Output fencing by run generation
//!
//! The generation counter and the output writer sit behind one mutex. A
//! writer holding an older generation id finds the comparison false for as
//! long as a newer generation exists, so its bytes are dropped instead of
//! landing after the newer run's output.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifies one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct FenceState<W> {
    current: Generation,
    out: W,
}

pub struct Fence<W> {
    state: Mutex<FenceState<W>>,
}

impl<W: Write> Fence<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(FenceState {
                current: Generation::default(),
                out,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FenceState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new generation. Every id handed out before this one stops
    /// being current.
    pub fn advance(&self) -> Generation {
        let mut state = self.lock();
        state.current = Generation(state.current.0 + 1);
        state.current
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Generation {
        self.lock().current
    }

    /// Runs `f` on the output if `id` is still the live generation.
    ///
    /// The check and `f` happen under the same lock, so no newer generation can
    /// start in between.
    pub fn if_current<R>(&self, id: Generation, f: impl FnOnce(&mut W) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.current != id {
            return None;
        }
        Some(f(&mut state.out))
    }

    /// Runs `f` on the output regardless of generation.
    pub fn with_output<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.lock().out)
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }
}
