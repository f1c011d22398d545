//! Low-level utilities.

mod atomic_take;

pub use self::atomic_take::AtomicTake;

use std::sync::{Mutex, MutexGuard, PoisonError};


// lock a mutex, ignoring poisoning.
//
// every critical section in this crate leaves its state consistent before doing anything that
// could panic, so a poisoned lock still guards valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
