// write-only channel which discards.

use super::{
    api::Sender,
    core::{Counters, SendChan},
    select::{Selection, SelectId},
    semaphore::{ChannelSemaphore, SemaphoreState},
};
use crate::util::AtomicTake;
use std::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::Arc,
};


/// Channel which accepts every element without blocking, and drops it
///
/// There is no receiving end.
pub struct Sink<T> {
    counters: Counters,
    _p: PhantomData<fn(T)>,
}

impl<T: Send + 'static> Sink<T> {
    /// Construct open
    pub fn new() -> Self {
        Sink { counters: Counters::default(), _p: PhantomData }
    }

    /// Construct, and bind a sender to it
    pub fn make() -> Sender<T> {
        Sender::wrap(Sink::new())
    }

    /// Number of elements accepted so far
    pub fn accepted(&self) -> u64 {
        self.counters.occupancy()
    }
}

impl<T: Send + 'static> Default for Sink<T> {
    fn default() -> Self {
        Sink::new()
    }
}

impl<T: Send + 'static> SendChan<T> for Sink<T> {
    fn is_closed(&self) -> bool {
        self.counters.is_closed()
    }

    fn is_full(&self) -> bool {
        false
    }

    fn close(&self) {
        if self.counters.set_closed() {
            trace!("closing sink");
        }
    }

    fn put(&self, elem: T) -> bool {
        if self.counters.is_closed() {
            return false;
        }
        self.counters.wrote();
        drop(elem);
        true
    }

    fn select_put_now(&self, elem: &Arc<AtomicTake<T>>, id: SelectId) -> Option<Selection> {
        if !self.counters.is_closed() {
            self.put(elem.take()?);
        }
        Some(Selection::new(id))
    }

    fn select_put(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>) {
        if !semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
            return;
        }
        if let Some(elem) = elem.take() {
            self.put(elem);
        }
        semaphore.complete(Selection::new(id));
    }

    fn cancel_put(&self, _: &Arc<ChannelSemaphore>) {}
}

impl<T> Debug for Sink<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Sink")
            .field("closed", &self.counters.is_closed())
            .finish()
    }
}
