// parked parties of a channel.

use super::{
    semaphore::{ChannelSemaphore, SemaphoreState},
    select::{Selection, SelectId},
};
use crate::util::{lock, AtomicTake};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};


// a party parked on a channel: a semaphore to signal, and if the party is a select candidate, its
// identity within the select.
pub(crate) struct Parked {
    sem: Arc<ChannelSemaphore>,
    id: Option<SelectId>,
}

impl Parked {
    // park a new direct operation.
    pub(crate) fn direct() -> Self {
        let sem = Arc::new(ChannelSemaphore::new(0));
        let parked = sem.set_state(SemaphoreState::Idle, SemaphoreState::ParkedDirect);
        debug_assert!(parked);
        Parked { sem, id: None }
    }

    // park a candidate of a select round.
    pub(crate) fn select(sem: &Arc<ChannelSemaphore>, id: SelectId) -> Self {
        Parked { sem: Arc::clone(sem), id: Some(id) }
    }

    pub(crate) fn semaphore(&self) -> &Arc<ChannelSemaphore> {
        &self.sem
    }

    fn is_direct(&self) -> bool {
        self.id.is_none()
    }

    // try to win the right to resolve this party. false means it is stale.
    fn claim(&self) -> bool {
        let from =
            if self.is_direct() { SemaphoreState::ParkedDirect } else { SemaphoreState::ParkedSelect };
        self.sem.set_state(from, SemaphoreState::Claimed)
    }

    // resolve a claimed party without a transfer, because the channel closed.
    pub(crate) fn abandon(&self) {
        match self.id {
            None => { self.sem.signal(); }
            Some(id) => self.sem.complete(Selection::new(id)),
        }
    }

    // resolve a claimed party without a transfer, because a timeout elapsed.
    pub(crate) fn expire(&self) {
        match self.id {
            None => { self.sem.signal(); }
            Some(_) => self.sem.expire(),
        }
    }
}

// access to the parked part of a waiter.
pub(crate) trait Waiter {
    fn parked(&self) -> &Parked;
}

impl Waiter for Parked {
    fn parked(&self) -> &Parked {
        self
    }
}


// a parked sender, holding the element it offers.
pub(crate) struct SendWaiter<T> {
    parked: Parked,
    elem: Arc<AtomicTake<T>>,
}

// the direct sender's side of a parked send.
pub(crate) struct DirectSend<T> {
    sem: Arc<ChannelSemaphore>,
    elem: Arc<AtomicTake<T>>,
}

impl<T> SendWaiter<T> {
    pub(crate) fn direct(elem: T) -> (Self, DirectSend<T>) {
        let parked = Parked::direct();
        let elem = Arc::new(AtomicTake::some(elem));
        let handle = DirectSend { sem: Arc::clone(&parked.sem), elem: Arc::clone(&elem) };
        (SendWaiter { parked, elem }, handle)
    }

    pub(crate) fn select(sem: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>) -> Self {
        SendWaiter { parked: Parked::select(sem, id), elem: Arc::clone(elem) }
    }

    // complete a claimed sender by taking its element.
    pub(crate) fn accept(&self) -> Option<T> {
        let elem = self.elem.take();
        debug_assert!(elem.is_some(), "claimed sender had no element");
        match self.parked.id {
            None => { self.parked.sem.signal(); }
            Some(id) => self.parked.sem.complete(Selection::new(id)),
        }
        elem
    }
}

impl<T> Waiter for SendWaiter<T> {
    fn parked(&self) -> &Parked {
        &self.parked
    }
}

impl<T> DirectSend<T> {
    // block until resolved, and return whether the element was taken. if it was not, the channel
    // closed, and the element is dropped.
    pub(crate) fn wait(self) -> bool {
        self.sem.wait();
        self.elem.take().is_none()
    }
}


// a parked receiver.
pub(crate) struct RecvWaiter<T> {
    parked: Parked,
    // where to deliver to a direct receiver. select receivers get their element through the
    // selection instead.
    slot: Option<Arc<Mutex<Option<T>>>>,
}

// the direct receiver's side of a parked take.
pub(crate) struct DirectRecv<T> {
    sem: Arc<ChannelSemaphore>,
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> RecvWaiter<T> {
    pub(crate) fn direct() -> (Self, DirectRecv<T>) {
        let parked = Parked::direct();
        let slot = Arc::new(Mutex::new(None));
        let handle = DirectRecv { sem: Arc::clone(&parked.sem), slot: Arc::clone(&slot) };
        (RecvWaiter { parked, slot: Some(slot) }, handle)
    }

    pub(crate) fn select(sem: &Arc<ChannelSemaphore>, id: SelectId) -> Self {
        RecvWaiter { parked: Parked::select(sem, id), slot: None }
    }

    // complete a claimed receiver by handing it an element.
    pub(crate) fn deliver(&self, elem: T)
    where
        T: Send + 'static,
    {
        match (self.parked.id, &self.slot) {
            (Some(id), _) => self.parked.sem.complete(Selection::new(id).with_payload(elem)),
            (None, Some(slot)) => {
                *lock(slot) = Some(elem);
                self.parked.sem.signal();
            }
            (None, None) => unreachable!("direct receiver without a slot"),
        }
    }
}

impl<T> Waiter for RecvWaiter<T> {
    fn parked(&self) -> &Parked {
        &self.parked
    }
}

impl<T> DirectRecv<T> {
    // block until resolved, and return the delivered element. none means the channel closed.
    pub(crate) fn wait(self) -> Option<T> {
        self.sem.wait();
        lock(&self.slot).take()
    }
}


// outcome of trying to pair a registering select candidate with a parked counterpart.
pub(crate) enum Pairing<W> {
    // both the counterpart and the registering select were claimed.
    Paired(W),
    // the registering select was already claimed by someone else.
    Lost,
    // no live counterpart is parked.
    Unpaired,
}

// FIFO queue of parked parties.
//
// parties are only removed under the lock of the channel which owns the queue: when they are
// claimed, when they are found to be stale, or when their select round cancels them.
pub(crate) struct WaitQueue<W>(VecDeque<W>);

impl<W: Waiter> WaitQueue<W> {
    pub(crate) fn new() -> Self {
        WaitQueue(VecDeque::new())
    }

    pub(crate) fn push(&mut self, waiter: W) {
        self.0.push_back(waiter);
    }

    // whether any parked party could still be claimed.
    #[cfg(test)]
    pub(crate) fn has_live(&self) -> bool {
        self.0.iter().any(|waiter| {
            let state = waiter.parked().sem.state();
            state == SemaphoreState::ParkedDirect || state == SemaphoreState::ParkedSelect
        })
    }

    // pop parties from the front until one is claimed, discarding stale ones.
    pub(crate) fn claim_next(&mut self) -> Option<W> {
        while let Some(waiter) = self.0.pop_front() {
            if waiter.parked().claim() {
                return Some(waiter);
            }
        }
        None
    }

    // claim both the first live counterpart and the registering select's own semaphore.
    //
    // parties of the same select round are skipped, so that a select never pairs with itself. if
    // the counterpart is itself a select and we then lose our own semaphore, the counterpart has
    // already been claimed and can't be un-claimed, so it is told to retry its round.
    pub(crate) fn pair(&mut self, own: &Arc<ChannelSemaphore>) -> Pairing<W> {
        let mut i = 0;
        while i < self.0.len() {
            if Arc::ptr_eq(&self.0[i].parked().sem, own) {
                i += 1;
                continue;
            }
            let Some(waiter) = self.0.remove(i) else { break };
            if waiter.parked().is_direct() {
                // direct parties are only claimed under the lock of their channel, which the
                // caller holds, so this one can't go stale while we claim our own.
                if !own.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
                    self.0.insert(i, waiter);
                    return Pairing::Lost;
                }
                let claimed = waiter.parked().claim();
                debug_assert!(claimed);
                return Pairing::Paired(waiter);
            }
            if !waiter.parked().claim() {
                continue;
            }
            if !own.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
                waiter.parked().sem.retry();
                return Pairing::Lost;
            }
            return Pairing::Paired(waiter);
        }
        Pairing::Unpaired
    }

    // hand back a claimed party which turned out to have nothing to transfer with.
    //
    // a direct party goes back to the front of the queue, parked again. a select party may already
    // have been dropped as stale by its other candidates, so its round is retried instead.
    pub(crate) fn restore(&mut self, waiter: W) {
        let parked = waiter.parked();
        if parked.is_direct() {
            let reparked = parked.sem.set_state(SemaphoreState::Claimed, SemaphoreState::ParkedDirect);
            debug_assert!(reparked);
            self.0.push_front(waiter);
        } else {
            parked.sem.retry();
        }
    }

    // remove every party of the given select round.
    pub(crate) fn cancel(&mut self, sem: &Arc<ChannelSemaphore>) {
        self.0.retain(|waiter| !Arc::ptr_eq(&waiter.parked().sem, sem));
    }

    // remove every party, returning those which were successfully claimed.
    pub(crate) fn claim_all(&mut self) -> Vec<W> {
        self.0.drain(..).filter(|waiter| waiter.parked().claim()).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::semaphore::Resolution;

    fn select_sem() -> Arc<ChannelSemaphore> {
        let sem = Arc::new(ChannelSemaphore::new(0));
        assert!(sem.set_state(SemaphoreState::Idle, SemaphoreState::ParkedSelect));
        sem
    }

    #[test]
    fn claim_next_skips_stale() {
        let stale = select_sem();
        assert!(stale.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed));
        let live = select_sem();

        let mut queue = WaitQueue::new();
        queue.push(Parked::select(&stale, SelectId::of(&1u8)));
        queue.push(Parked::select(&live, SelectId::of(&2u8)));
        assert!(queue.has_live());

        let claimed = queue.claim_next().unwrap();
        assert!(Arc::ptr_eq(claimed.semaphore(), &live));
        assert_eq!(live.state(), SemaphoreState::Claimed);
        assert!(queue.claim_next().is_none());
        assert!(!queue.has_live());
    }

    #[test]
    fn pair_skips_own_round() {
        let own = select_sem();
        let other = select_sem();

        let mut queue = WaitQueue::new();
        queue.push(Parked::select(&own, SelectId::of(&1u8)));
        queue.push(Parked::select(&other, SelectId::of(&2u8)));

        match queue.pair(&own) {
            Pairing::Paired(waiter) => assert!(Arc::ptr_eq(waiter.semaphore(), &other)),
            _ => panic!("expected pairing"),
        }
        assert_eq!(own.state(), SemaphoreState::Claimed);
        assert_eq!(other.state(), SemaphoreState::Claimed);
    }

    #[test]
    fn pair_alone_is_unpaired() {
        let own = select_sem();
        let mut queue = WaitQueue::new();
        queue.push(Parked::select(&own, SelectId::of(&1u8)));
        assert!(matches!(queue.pair(&own), Pairing::Unpaired));
        assert_eq!(own.state(), SemaphoreState::ParkedSelect);
    }

    #[test]
    fn pair_lost_keeps_direct_counterpart() {
        let own = select_sem();
        assert!(own.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed));

        let mut queue = WaitQueue::new();
        queue.push(Parked::direct());
        assert!(matches!(queue.pair(&own), Pairing::Lost));
        assert!(queue.has_live());
    }

    #[test]
    fn pair_lost_retries_select_counterpart() {
        let own = select_sem();
        assert!(own.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed));
        let other = select_sem();

        let mut queue = WaitQueue::new();
        queue.push(Parked::select(&other, SelectId::of(&2u8)));
        assert!(matches!(queue.pair(&own), Pairing::Lost));
        other.wait();
        assert!(matches!(other.take_resolution(), Some(Resolution::Retry)));
    }

    #[test]
    fn cancel_removes_round() {
        let sem = select_sem();
        let mut queue = WaitQueue::new();
        queue.push(Parked::select(&sem, SelectId::of(&1u8)));
        queue.push(Parked::select(&sem, SelectId::of(&2u8)));
        queue.push(Parked::direct());
        queue.cancel(&sem);
        assert_eq!(queue.claim_all().len(), 1);
    }

    #[test]
    fn direct_send_handoff() {
        let (waiter, handle) = SendWaiter::direct(9u8);
        assert!(waiter.parked().claim());
        assert_eq!(waiter.accept(), Some(9));
        assert!(handle.wait());
    }

    #[test]
    fn direct_recv_abandoned() {
        let (waiter, handle) = RecvWaiter::<u8>::direct();
        assert!(waiter.parked().claim());
        waiter.parked().abandon();
        assert_eq!(handle.wait(), None);
    }

    #[test]
    fn restore_reparks_direct() {
        let (waiter, handle) = RecvWaiter::<u8>::direct();
        let mut queue = WaitQueue::new();
        queue.push(waiter);

        let claimed = queue.claim_next().unwrap();
        assert!(!queue.has_live());
        queue.restore(claimed);
        assert!(queue.has_live());

        let claimed = queue.claim_next().unwrap();
        claimed.deliver(4);
        assert_eq!(handle.wait(), Some(4));
    }

    #[test]
    fn restore_retries_select() {
        let sem = select_sem();
        let mut queue = WaitQueue::new();
        queue.push(Parked::select(&sem, SelectId::of(&1u8)));

        let claimed = queue.claim_next().unwrap();
        queue.restore(claimed);
        assert!(!queue.has_live());
        sem.wait();
        assert!(matches!(sem.take_resolution(), Some(Resolution::Retry)));
    }
}
