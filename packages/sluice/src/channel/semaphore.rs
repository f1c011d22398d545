// the blocking primitive of channels and select.

use super::select::Selection;
use crate::util::lock;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{
            Ordering::{Acquire, AcqRel},
            AtomicU8,
        },
        Condvar,
        Mutex,
        PoisonError,
    },
};


/// Arbitration state of a [`ChannelSemaphore`]
///
/// A semaphore starts out `Idle`, is parked exactly once (either by a direct blocking operation or
/// by a `select` round), and is claimed at most once. Whoever wins the transition into `Claimed`
/// is the only party allowed to resolve and signal it.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SemaphoreState {
    /// Not yet parked
    Idle,
    /// Parked by a direct `put` or `take`, which only its own channel can complete
    ParkedDirect,
    /// Parked by a `select`, which any of its candidates may complete
    ParkedSelect,
    /// Claimed by the party which completes the operation
    Claimed,
}

impl SemaphoreState {
    fn from_byte(b: u8) -> Self {
        if b == SemaphoreState::Idle as u8 {
            SemaphoreState::Idle
        } else if b == SemaphoreState::ParkedDirect as u8 {
            SemaphoreState::ParkedDirect
        } else if b == SemaphoreState::ParkedSelect as u8 {
            SemaphoreState::ParkedSelect
        } else if b == SemaphoreState::Claimed as u8 {
            SemaphoreState::Claimed
        } else {
            unreachable!("invalid semaphore state byte: {}", b)
        }
    }
}

// how the party which claimed a select semaphore resolved it.
pub(crate) enum Resolution {
    // a candidate completed.
    Selected(Selection),
    // a timeout elapsed.
    Expired,
    // a rendezvous with this select was abandoned halfway. the select must start a new round.
    Retry,
}

/// Counting semaphore augmented with an atomic arbitration state
///
/// One is allocated for each blocking channel operation and for each round of a
/// [`select`](crate::select), and is discarded once that call resolves.
pub struct ChannelSemaphore {
    permits: Mutex<Permits>,
    cond: Condvar,
    state: AtomicU8,
    // written by the claimant before it signals.
    resolution: Mutex<Option<Resolution>>,
}

struct Permits {
    // negative values count blocked waiters.
    value: isize,
    // signals issued to blocked waiters which they have not yet consumed.
    wakeups: usize,
}

impl ChannelSemaphore {
    /// Construct with the given number of permits, in the `Idle` state
    pub fn new(value: isize) -> Self {
        ChannelSemaphore {
            permits: Mutex::new(Permits { value, wakeups: 0 }),
            cond: Condvar::new(),
            state: AtomicU8::new(SemaphoreState::Idle as u8),
            resolution: Mutex::new(None),
        }
    }

    /// Block until a permit is available, and consume it
    pub fn wait(&self) {
        let mut permits = lock(&self.permits);
        permits.value -= 1;
        if permits.value < 0 {
            while permits.wakeups == 0 {
                permits = self.cond.wait(permits).unwrap_or_else(PoisonError::into_inner);
            }
            permits.wakeups -= 1;
        }
    }

    /// Release a permit
    ///
    /// Returns whether this woke a blocked waiter. A signal which finds nobody waiting just
    /// banks the permit and returns false.
    pub fn signal(&self) -> bool {
        let mut permits = lock(&self.permits);
        permits.value += 1;
        if permits.value <= 0 {
            permits.wakeups += 1;
            self.cond.notify_one();
            true
        } else {
            false
        }
    }

    /// Current arbitration state
    pub fn state(&self) -> SemaphoreState {
        SemaphoreState::from_byte(self.state.load(Acquire))
    }

    /// Atomically transition from `from` to `to`
    ///
    /// Returns false, changing nothing, if the state was not `from`. A channel which wants to
    /// complete a parked select must win `ParkedSelect -> Claimed` before touching its own storage
    /// on that select's behalf.
    pub fn set_state(&self, from: SemaphoreState, to: SemaphoreState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, AcqRel, Acquire)
            .is_ok()
    }

    /// Resolve a claimed select semaphore with the winning selection, and signal it
    pub fn complete(&self, selection: Selection) {
        self.resolve(Resolution::Selected(selection));
    }

    /// Resolve a claimed select semaphore as expired, and signal it
    ///
    /// The select returns `None`.
    pub fn expire(&self) {
        self.resolve(Resolution::Expired);
    }

    // resolve a claimed select semaphore as needing another round, and signal it.
    pub(crate) fn retry(&self) {
        self.resolve(Resolution::Retry);
    }

    fn resolve(&self, resolution: Resolution) {
        debug_assert_eq!(self.state(), SemaphoreState::Claimed, "resolved without claiming");
        *lock(&self.resolution) = Some(resolution);
        self.signal();
    }

    // take the resolution written by the claimant.
    pub(crate) fn take_resolution(&self) -> Option<Resolution> {
        lock(&self.resolution).take()
    }
}

impl Debug for ChannelSemaphore {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ChannelSemaphore")
            .field("value", &lock(&self.permits).value)
            .field("state", &self.state())
            .finish()
    }
}
