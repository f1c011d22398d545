// the select protocol.

use super::semaphore::{ChannelSemaphore, SemaphoreState, Resolution};
use smallvec::SmallVec;
use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};


// candidate lists up to this long don't allocate.
const INLINE_CANDIDATES: usize = 8;


/// Identity of a [`Selectable`] for the duration of a [`select`] call
///
/// Derived from the address of the candidate, so a candidate must not move while it is borrowed
/// by `select`, which the borrow checker ensures.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SelectId(usize);

impl SelectId {
    /// Identity of the given candidate
    pub fn of<S: ?Sized>(candidate: &S) -> Self {
        SelectId(candidate as *const S as *const () as usize)
    }
}

/// Record of which candidate completed a [`select`]
///
/// A selection produced by a receive carries the received element, which is retrieved with
/// [`Receiver::extract`](crate::Receiver::extract). A selection for a candidate whose channel
/// closed during the select carries nothing.
pub struct Selection {
    id: SelectId,
    semaphore: Option<Arc<ChannelSemaphore>>,
    payload: Option<Box<dyn Any + Send>>,
}

impl Selection {
    /// Construct a selection identifying the given candidate, carrying nothing
    pub fn new(id: SelectId) -> Self {
        Selection { id, semaphore: None, payload: None }
    }

    /// Ownership-chaining way to attach a transferred element
    pub fn with_payload<T: Send + 'static>(mut self, payload: T) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    // attach the semaphore of the select round which produced this.
    pub(crate) fn with_semaphore(mut self, semaphore: Arc<ChannelSemaphore>) -> Self {
        self.semaphore = Some(semaphore);
        self
    }

    /// Identity of the winning candidate
    pub fn id(&self) -> SelectId {
        self.id
    }

    /// Whether the given candidate is the one which won
    pub fn is<S: ?Sized>(&self, candidate: &S) -> bool {
        self.id == SelectId::of(candidate)
    }

    /// The semaphore the select blocked on, if it had to block
    pub fn semaphore(&self) -> Option<&Arc<ChannelSemaphore>> {
        self.semaphore.as_ref()
    }

    /// Whether an element was transferred into this selection
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    // take the transferred element, if it is a T.
    pub(crate) fn into_payload<T: 'static>(self) -> Option<T> {
        self.payload?.downcast::<T>().ok().map(|payload| *payload)
    }
}

impl Debug for Selection {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Selection")
            .field("id", &self.id)
            .field("blocked", &self.semaphore.is_some())
            .field("has_payload", &self.has_payload())
            .finish()
    }
}

/// An endpoint able to participate in a [`select`]
///
/// To complete a parked select, an implementation must first win the semaphore's
/// `ParkedSelect -> Claimed` transition with [`ChannelSemaphore::set_state`], and only then do
/// its transfer and call [`ChannelSemaphore::complete`]. If the transition fails, another
/// candidate already won, and the implementation must return without side effects.
pub trait Selectable {
    /// Whether it makes sense to select on this at all right now
    ///
    /// If every candidate returns false, `select` returns `None` without blocking.
    fn selectable(&self) -> bool;

    /// Complete immediately if ready, without blocking
    fn select_now(&self, id: SelectId) -> Option<Selection>;

    /// Complete the select through `semaphore` now if ready, or else register `semaphore` to be
    /// completed once ready
    fn select_notify(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId);

    /// Deregister `semaphore` after the select round ended
    fn select_cancel(&self, semaphore: &Arc<ChannelSemaphore>);
}

/// Block until exactly one of the candidates completes, and return which one
///
/// Candidates which are not [`selectable`](Selectable::selectable) are ignored, and if none are
/// left this returns `None` immediately. Otherwise, candidates are first tried in list order, and
/// the first one which is ready wins. If none is ready, the calling thread parks on every
/// candidate at once, and the first one to become ready wins. Exactly one transfer happens.
///
/// Returns `None` if a [`Timeout`](crate::Timeout) candidate elapses first.
pub fn select(candidates: &[&dyn Selectable]) -> Option<Selection> {
    loop {
        let live = candidates.iter()
            .copied()
            .filter(|candidate| candidate.selectable())
            .map(|candidate| (candidate, SelectId::of(candidate)))
            .collect::<SmallVec<[_; INLINE_CANDIDATES]>>();
        if live.is_empty() {
            trace!("select over no selectable candidates");
            return None;
        }

        // fast path
        for &(candidate, id) in &live {
            if let Some(selection) = candidate.select_now(id) {
                trace!("select completed without blocking");
                return Some(selection);
            }
        }

        // slow path
        let semaphore = Arc::new(ChannelSemaphore::new(0));
        let parked = semaphore.set_state(SemaphoreState::Idle, SemaphoreState::ParkedSelect);
        debug_assert!(parked);
        let mut registered = 0;
        for &(candidate, id) in &live {
            if semaphore.state() == SemaphoreState::Claimed {
                // completed by a candidate we already registered with
                break;
            }
            candidate.select_notify(&semaphore, id);
            registered += 1;
        }
        trace!(candidates = registered, "select parking");
        semaphore.wait();
        for &(candidate, _) in &live[..registered] {
            candidate.select_cancel(&semaphore);
        }

        match semaphore.take_resolution() {
            Some(Resolution::Selected(selection)) => {
                return Some(selection.with_semaphore(semaphore));
            }
            Some(Resolution::Expired) => {
                trace!("select timed out");
                return None;
            }
            Some(Resolution::Retry) => {
                trace!("select lost a rendezvous race, retrying");
            }
            None => {
                debug_assert!(false, "select semaphore signalled without a resolution");
            }
        }
    }
}
