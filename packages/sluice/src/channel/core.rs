// the contracts every channel variant implements, and state they share.

use super::{
    select::{Selection, SelectId},
    semaphore::ChannelSemaphore,
};
use crate::util::AtomicTake;
use std::sync::{
    atomic::{
        AtomicBool,
        AtomicU64,
        Ordering::{Acquire, Release, AcqRel},
    },
    Arc,
};


/// The receiving half of a channel
///
/// Implemented by every channel variant able to produce elements, and by
/// [`Receiver`](crate::Receiver), which forwards to the channel it wraps.
pub trait RecvChan<T>: Send + Sync {
    /// Whether the channel is closed
    fn is_closed(&self) -> bool;

    /// Whether no element is currently available
    fn is_empty(&self) -> bool;

    /// Close the channel, waking every parked party
    ///
    /// Elements already buffered remain receivable. Closing twice is a no-op.
    fn close(&self);

    /// Block until an element is available and return it, or return `None` once the channel is
    /// closed and drained
    fn take(&self) -> Option<T>;

    /// Take an element for a select without blocking, if one is available
    fn select_take_now(&self, id: SelectId) -> Option<Selection>;

    /// Take an element for a parked select now if one is available, or else register to do so
    fn select_take(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId);

    /// Deregister a select round
    fn cancel_take(&self, semaphore: &Arc<ChannelSemaphore>);
}

/// The sending half of a channel
///
/// Implemented by every channel variant able to accept elements, and by
/// [`Sender`](crate::Sender), which forwards to the channel it wraps.
pub trait SendChan<T>: Send + Sync {
    /// Whether the channel is closed
    fn is_closed(&self) -> bool;

    /// Whether a put would currently block
    fn is_full(&self) -> bool;

    /// Close the channel, waking every parked party
    fn close(&self);

    /// Block until the element is accepted and return true, or return false if the channel is or
    /// becomes closed first, in which case the element is dropped
    fn put(&self, elem: T) -> bool;

    /// Take the element out of `elem` for a select without blocking, if the channel can accept it
    fn select_put_now(&self, elem: &Arc<AtomicTake<T>>, id: SelectId) -> Option<Selection>;

    /// Take the element out of `elem` for a parked select now if the channel can accept it, or
    /// else register to do so
    fn select_put(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>);

    /// Deregister a select round
    fn cancel_put(&self, semaphore: &Arc<ChannelSemaphore>);
}


// counters and closed flag which let the is_* observers avoid locking.
//
// counters are only incremented under the channel's lock, but may be read without it.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    written: AtomicU64,
    read: AtomicU64,
    closed: AtomicBool,
}

impl Counters {
    pub(crate) fn wrote(&self) {
        self.written.fetch_add(1, Release);
    }

    pub(crate) fn read(&self) {
        self.read.fetch_add(1, Release);
    }

    // elements written and not yet read.
    pub(crate) fn occupancy(&self) -> u64 {
        // written first, so that concurrent transfers can only make this an underestimate
        let written = self.written.load(Acquire);
        let read = self.read.load(Acquire);
        written.saturating_sub(read)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Acquire)
    }

    // mark closed, returning whether this was the first close.
    pub(crate) fn set_closed(&self) -> bool {
        !self.closed.swap(true, AcqRel)
    }

    #[cfg(test)]
    pub(crate) fn totals(&self) -> (u64, u64) {
        (self.written.load(Acquire), self.read.load(Acquire))
    }
}
