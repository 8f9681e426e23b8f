//! Single-owner handoff for non-thread-safe driver objects

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Confines a value to one thread at a time, with handoff by move.
///
/// The wrapper is `Send` but not `Sync`: it can be handed to another
/// thread, but two threads can never hold a reference to the inner
/// value at the same time, and the sender loses access the moment it
/// gives the wrapper away. Misuse is a compile error rather than a
/// runtime check.
pub struct Confined<T> {
    value: T,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Confined<T> {
    /// Confine `value` to the current owner.
    pub fn new(value: T) -> Self {
        Self {
            value,
            _not_sync: PhantomData,
        }
    }

    /// Borrow the confined value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutably borrow the confined value.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Release the value from confinement.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Confined<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Confined<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Confined<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Confined").field(&self.value).finish()
    }
}
