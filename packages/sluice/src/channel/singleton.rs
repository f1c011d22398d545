// one-shot channel.

use super::{
    api::{bind, Receiver, Sender},
    core::{Counters, RecvChan, SendChan},
    select::{Selection, SelectId},
    semaphore::{ChannelSemaphore, SemaphoreState},
    waiter::{RecvWaiter, WaitQueue, Waiter},
};
use crate::util::{lock, AtomicTake};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicUsize, Ordering::AcqRel},
        Arc,
        Mutex,
    },
};


/// Channel which transfers at most one element, then closes itself
///
/// The first `put` stores its element and closes the channel. Every later `put` transfers nothing
/// and returns false. `put` never blocks.
pub struct Singleton<T> {
    // number of puts ever attempted. only the put which bumps it from 0 may transfer.
    writers: AtomicUsize,
    lockable: Mutex<Lockable<T>>,
    counters: Counters,
}

struct Lockable<T> {
    elem: Option<T>,
    receivers: WaitQueue<RecvWaiter<T>>,
}

impl<T: Send + 'static> Singleton<T> {
    /// Construct open and empty
    pub fn new() -> Self {
        Singleton {
            writers: AtomicUsize::new(0),
            lockable: Mutex::new(Lockable { elem: None, receivers: WaitQueue::new() }),
            counters: Counters::default(),
        }
    }

    /// Construct, and bind a sender and receiver to it
    pub fn make() -> (Sender<T>, Receiver<T>) {
        bind(Singleton::new())
    }

    // the put path. returns whether the element was transferred.
    fn write(&self, elem: impl FnOnce() -> Option<T>) -> bool {
        if self.writers.fetch_add(1, AcqRel) != 0 {
            return false;
        }
        let mut lockable = lock(&self.lockable);
        if self.counters.is_closed() {
            return false;
        }
        let transferred = match elem() {
            Some(elem) => {
                self.counters.wrote();
                match lockable.receivers.claim_next() {
                    Some(receiver) => {
                        self.counters.read();
                        receiver.deliver(elem);
                    }
                    None => lockable.elem = Some(elem),
                }
                true
            }
            None => false,
        };
        self.close_locked(&mut lockable);
        transferred
    }

    fn close_locked(&self, lockable: &mut Lockable<T>) {
        if !self.counters.set_closed() {
            return;
        }
        let receivers = lockable.receivers.claim_all();
        trace!(receivers = receivers.len(), "closing singleton channel");
        for receiver in receivers {
            receiver.parked().abandon();
        }
    }

    fn take_stored(&self, lockable: &mut Lockable<T>) -> Option<T> {
        let elem = lockable.elem.take()?;
        self.counters.read();
        Some(elem)
    }
}

impl<T: Send + 'static> Default for Singleton<T> {
    fn default() -> Self {
        Singleton::new()
    }
}

impl<T: Send + 'static> SendChan<T> for Singleton<T> {
    fn is_closed(&self) -> bool {
        self.counters.is_closed()
    }

    fn is_full(&self) -> bool {
        self.counters.occupancy() >= 1
    }

    fn close(&self) {
        self.close_locked(&mut lock(&self.lockable));
    }

    fn put(&self, elem: T) -> bool {
        self.write(move || Some(elem))
    }

    fn select_put_now(&self, elem: &Arc<AtomicTake<T>>, id: SelectId) -> Option<Selection> {
        if !elem.is_some() {
            return None;
        }
        self.write(|| elem.take());
        Some(Selection::new(id))
    }

    fn select_put(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>) {
        // a put never blocks, so this is ready whenever the select still is
        if !semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
            return;
        }
        self.write(|| elem.take());
        semaphore.complete(Selection::new(id));
    }

    fn cancel_put(&self, _: &Arc<ChannelSemaphore>) {}
}

impl<T: Send + 'static> RecvChan<T> for Singleton<T> {
    fn is_closed(&self) -> bool {
        self.counters.is_closed()
    }

    fn is_empty(&self) -> bool {
        self.counters.occupancy() == 0
    }

    fn close(&self) {
        SendChan::close(self)
    }

    fn take(&self) -> Option<T> {
        let mut lockable = lock(&self.lockable);
        if let Some(elem) = self.take_stored(&mut lockable) {
            return Some(elem);
        }
        if self.counters.is_closed() {
            return None;
        }
        let (waiter, handle) = RecvWaiter::direct();
        lockable.receivers.push(waiter);
        drop(lockable);
        handle.wait()
    }

    fn select_take_now(&self, id: SelectId) -> Option<Selection> {
        let mut lockable = lock(&self.lockable);
        if let Some(elem) = self.take_stored(&mut lockable) {
            return Some(Selection::new(id).with_payload(elem));
        }
        if self.counters.is_closed() {
            return Some(Selection::new(id));
        }
        None
    }

    fn select_take(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        let mut lockable = lock(&self.lockable);
        if lockable.elem.is_none() && !self.counters.is_closed() {
            lockable.receivers.push(RecvWaiter::select(semaphore, id));
            return;
        }
        if !semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
            return;
        }
        let selection = match self.take_stored(&mut lockable) {
            Some(elem) => Selection::new(id).with_payload(elem),
            None => Selection::new(id),
        };
        semaphore.complete(selection);
    }

    fn cancel_take(&self, semaphore: &Arc<ChannelSemaphore>) {
        lock(&self.lockable).receivers.cancel(semaphore);
    }
}

impl<T> Debug for Singleton<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("closed", &self.counters.is_closed())
            .field("occupancy", &self.counters.occupancy())
            .finish()
    }
}
