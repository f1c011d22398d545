//! Take-once cell.

use std::{
    cell::UnsafeCell,
    fmt::{self, Debug, Formatter},
    mem::MaybeUninit,
    sync::atomic::{
        Ordering::{Acquire, AcqRel},
        AtomicBool,
    },
};

/// Like an atomic `Option<T>` that can be `take`n once.
///
/// Used to hold an element offered to a channel by a parked sender: whichever party wins the
/// right to complete the send takes the element out, and the sender can later check whether that
/// happened.
pub struct AtomicTake<T> {
    // val is initialized if is_some is true. the thread that transitions it from true to false
    // claims the right to read it and take ownership of it.
    is_some: AtomicBool,
    val: UnsafeCell<MaybeUninit<T>>,
}

impl<T> AtomicTake<T> {
    /// Construct with a value.
    pub const fn some(val: T) -> Self {
        AtomicTake {
            is_some: AtomicBool::new(true),
            val: UnsafeCell::new(MaybeUninit::new(val)),
        }
    }

    /// Construct without a value.
    pub const fn none() -> Self {
        AtomicTake {
            is_some: AtomicBool::new(false),
            val: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Whether the value has not yet been taken.
    pub fn is_some(&self) -> bool {
        self.is_some.load(Acquire)
    }

    /// Try to atomically take the value.
    pub fn take(&self) -> Option<T> {
        if self.is_some.swap(false, AcqRel) {
            // safety: we won the swap, so nobody else will ever read val.
            Some(unsafe { (*self.val.get()).assume_init_read() })
        } else {
            None
        }
    }

    /// Take the value through exclusive access.
    pub fn into_inner(self) -> Option<T> {
        self.take()
    }
}

impl<T> Drop for AtomicTake<T> {
    fn drop(&mut self) {
        // make sure the value gets dropped if not yet taken
        drop(self.take());
    }
}

impl<T> Debug for AtomicTake<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("AtomicTake").field("is_some", &self.is_some()).finish()
    }
}

// safety: the value is only ever moved out, by exactly one thread, so sharing only requires that
// it can be sent.
unsafe impl<T: Send> Send for AtomicTake<T> {}
unsafe impl<T: Send> Sync for AtomicTake<T> {}
