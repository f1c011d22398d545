// bounded FIFO channel.

use super::{
    api::{bind, Receiver, Sender},
    core::{Counters, RecvChan, SendChan},
    error::ZeroCapacityError,
    queue::Queue,
    select::{Selection, SelectId},
    semaphore::{ChannelSemaphore, SemaphoreState},
    waiter::{Pairing, RecvWaiter, SendWaiter, WaitQueue, Waiter},
};
use crate::util::{lock, AtomicTake};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex},
};


/// Channel which buffers up to a fixed number of elements
///
/// `put` blocks while the buffer is full and `take` blocks while it is empty. Elements are taken
/// in the order they were put. Once closed, elements already buffered can still be taken.
pub struct Buffered<T> {
    lockable: Mutex<Lockable<T>>,
    // only touched while holding the lockable
    elems: Queue<T>,
    cap: usize,
    counters: Counters,
}

// invariant: live receivers are only parked while the buffer is empty, and live senders only
// while it is full.
struct Lockable<T> {
    senders: WaitQueue<SendWaiter<T>>,
    receivers: WaitQueue<RecvWaiter<T>>,
}

impl<T: Send + 'static> Buffered<T> {
    /// Construct with the given capacity, which must be nonzero
    pub fn new(cap: usize) -> Result<Self, ZeroCapacityError> {
        if cap == 0 {
            return Err(ZeroCapacityError);
        }
        Ok(Buffered {
            lockable: Mutex::new(Lockable {
                senders: WaitQueue::new(),
                receivers: WaitQueue::new(),
            }),
            elems: Queue::new(),
            cap,
            counters: Counters::default(),
        })
    }

    /// Construct with the given capacity, and bind a sender and receiver to it
    pub fn make(cap: usize) -> Result<(Sender<T>, Receiver<T>), ZeroCapacityError> {
        Buffered::new(cap).map(bind)
    }

    /// Maximum number of buffered elements
    pub fn capacity(&self) -> usize {
        self.cap
    }

    fn has_room(&self) -> bool {
        self.elems.count() < self.cap
    }

    // hand an element to a parked receiver, or else buffer it. the caller checked that there is
    // room.
    fn accept(&self, lockable: &mut Lockable<T>, elem: T) {
        debug_assert!(self.has_room());
        self.counters.wrote();
        if let Some(receiver) = lockable.receivers.claim_next() {
            self.counters.read();
            receiver.deliver(elem);
        } else {
            self.elems.enqueue(elem);
        }
    }

    // take a buffered element, then let parked senders fill the freed room.
    fn dequeue(&self, lockable: &mut Lockable<T>) -> Option<T> {
        let elem = self.elems.dequeue()?;
        self.counters.read();
        while self.has_room() {
            let Some(sender) = lockable.senders.claim_next() else { break };
            if let Some(admitted) = sender.accept() {
                self.counters.wrote();
                self.elems.enqueue(admitted);
            }
        }
        debug_assert!(self.elems.is_consistent());
        Some(elem)
    }
}

impl<T: Send + 'static> SendChan<T> for Buffered<T> {
    fn is_closed(&self) -> bool {
        self.counters.is_closed()
    }

    fn is_full(&self) -> bool {
        self.counters.occupancy() >= self.cap as u64
    }

    fn close(&self) {
        let mut lockable = lock(&self.lockable);
        if !self.counters.set_closed() {
            return;
        }
        let receivers = lockable.receivers.claim_all();
        let senders = lockable.senders.claim_all();
        trace!(receivers = receivers.len(), senders = senders.len(), "closing buffered channel");
        for receiver in receivers {
            receiver.parked().abandon();
        }
        for sender in senders {
            sender.parked().abandon();
        }
    }

    fn put(&self, elem: T) -> bool {
        let mut lockable = lock(&self.lockable);
        if self.counters.is_closed() {
            return false;
        }
        if self.has_room() {
            self.accept(&mut lockable, elem);
            return true;
        }
        let (waiter, handle) = SendWaiter::direct(elem);
        lockable.senders.push(waiter);
        drop(lockable);
        handle.wait()
    }

    fn select_put_now(&self, elem: &Arc<AtomicTake<T>>, id: SelectId) -> Option<Selection> {
        let mut lockable = lock(&self.lockable);
        if self.counters.is_closed() {
            return Some(Selection::new(id));
        }
        if !self.has_room() {
            return None;
        }
        let elem = elem.take()?;
        self.accept(&mut lockable, elem);
        Some(Selection::new(id))
    }

    fn select_put(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>) {
        let mut lockable = lock(&self.lockable);
        if self.counters.is_closed() {
            if semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
                semaphore.complete(Selection::new(id));
            }
            return;
        }
        if !self.has_room() {
            lockable.senders.push(SendWaiter::select(semaphore, id, elem));
            return;
        }
        let pairing = if elem.is_some() {
            lockable.receivers.pair(semaphore)
        } else {
            // the offer was already sent through another select
            Pairing::Unpaired
        };
        match pairing {
            Pairing::Paired(receiver) => {
                match elem.take() {
                    Some(elem) => {
                        self.counters.wrote();
                        self.counters.read();
                        receiver.deliver(elem);
                    }
                    None => lockable.receivers.restore(receiver),
                }
            }
            Pairing::Lost => return,
            Pairing::Unpaired => {
                if !semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
                    return;
                }
                if let Some(elem) = elem.take() {
                    self.counters.wrote();
                    self.elems.enqueue(elem);
                }
            }
        }
        semaphore.complete(Selection::new(id));
    }

    fn cancel_put(&self, semaphore: &Arc<ChannelSemaphore>) {
        lock(&self.lockable).senders.cancel(semaphore);
    }
}

impl<T: Send + 'static> RecvChan<T> for Buffered<T> {
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
        if let Some(elem) = self.dequeue(&mut lockable) {
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
        if let Some(elem) = self.dequeue(&mut lockable) {
            return Some(Selection::new(id).with_payload(elem));
        }
        if self.counters.is_closed() {
            return Some(Selection::new(id));
        }
        None
    }

    fn select_take(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        let mut lockable = lock(&self.lockable);
        if self.elems.is_empty() && !self.counters.is_closed() {
            lockable.receivers.push(RecvWaiter::select(semaphore, id));
            return;
        }
        if !semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
            return;
        }
        let selection = match self.dequeue(&mut lockable) {
            Some(elem) => Selection::new(id).with_payload(elem),
            None => Selection::new(id),
        };
        semaphore.complete(selection);
    }

    fn cancel_take(&self, semaphore: &Arc<ChannelSemaphore>) {
        lock(&self.lockable).receivers.cancel(semaphore);
    }
}

impl<T> Debug for Buffered<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Buffered")
            .field("cap", &self.cap)
            .field("count", &self.elems.count())
            .field("closed", &self.counters.is_closed())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{select, Selectable};
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
        time::Duration,
    };

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(Buffered::<u8>::make(0).err(), Some(ZeroCapacityError));
    }

    #[test]
    fn put_blocks_while_full() {
        let (tx, rx) = Buffered::make(2).unwrap();
        assert!(tx.send(1));
        assert!(tx.send(2));
        assert!(tx.is_full());

        let unblocked = Arc::new(AtomicBool::new(false));
        let join = {
            let tx = tx.clone();
            let unblocked = Arc::clone(&unblocked);
            thread::spawn(move || {
                let sent = tx.send(3);
                unblocked.store(true, Ordering::SeqCst);
                sent
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!unblocked.load(Ordering::SeqCst));

        assert_eq!(rx.receive(), Some(1));
        assert!(join.join().unwrap());
        assert_eq!(rx.receive(), Some(2));
        assert_eq!(rx.receive(), Some(3));
        assert!(rx.is_empty());
    }

    #[test]
    fn close_keeps_buffered_elements() {
        let (tx, rx) = Buffered::make(4).unwrap();
        assert!(tx.send('a'));
        assert!(tx.send('b'));
        tx.close();
        tx.close();
        assert!(!tx.send('c'));
        assert!(rx.is_closed());
        assert_eq!(rx.receive(), Some('a'));
        assert_eq!(rx.receive(), Some('b'));
        assert_eq!(rx.receive(), None);
    }

    #[test]
    fn close_wakes_parked_parties() {
        let (tx, rx) = Buffered::<u32>::make(1).unwrap();
        let receiver = {
            let rx = rx.clone();
            thread::spawn(move || rx.receive())
        };
        thread::sleep(Duration::from_millis(20));
        rx.close();
        assert_eq!(receiver.join().unwrap(), None);

        let (tx_2, _rx_2) = Buffered::<u32>::make(1).unwrap();
        assert!(tx_2.send(0));
        let sender = {
            let tx_2 = tx_2.clone();
            thread::spawn(move || tx_2.send(1))
        };
        thread::sleep(Duration::from_millis(20));
        tx_2.close();
        assert!(!sender.join().unwrap());
        drop(tx);
    }

    #[test]
    fn stochastic_fifo_and_bound() {
        const CAP: usize = 3;
        const N: u32 = 2_000;

        let (tx, rx) = Buffered::make(CAP).unwrap();
        let producer = {
            let tx = tx.clone();
            thread::spawn(move || {
                let mut rng = Pcg32::from_seed(0xdeadbeefdeadbeefdeadbeefdeadbeefu128.to_le_bytes());
                for i in 0..N {
                    if rng.gen_ratio(1, 50) {
                        thread::yield_now();
                    }
                    assert!(tx.send(i));
                }
                tx.close();
            })
        };
        let mut rng = Pcg32::from_seed(0xfeedfacefeedfacefeedfacefeedfaceu128.to_le_bytes());
        let mut expect = 0;
        for elem in rx.iter() {
            assert_eq!(elem, expect);
            expect += 1;
            if rng.gen_ratio(1, 50) {
                thread::yield_now();
            }
        }
        assert_eq!(expect, N);
        producer.join().unwrap();
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let chan = Arc::new(Buffered::new(2).unwrap());
        let producers = (0..3)
            .map(|_| {
                let chan = Arc::clone(&chan);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        assert!(chan.put(i));
                        assert!(chan.counters.occupancy() <= 2);
                    }
                })
            })
            .collect::<Vec<_>>();
        for _ in 0..1500 {
            assert!(chan.take().is_some());
            assert!(chan.elems.count() <= 2);
        }
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(chan.counters.totals(), (1500, 1500));
    }

    #[test]
    fn select_receives_buffered() {
        let (tx, rx) = Buffered::make(1).unwrap();
        assert!(tx.send(7u64));
        let selection = select(&[&rx as &dyn Selectable]).unwrap();
        assert!(selection.is(&rx));
        assert!(selection.semaphore().is_none());
        assert_eq!(rx.extract(selection), Some(7));
    }

    #[test]
    fn select_offer_admitted_by_take() {
        let (tx, rx) = Buffered::make(1).unwrap();
        assert!(tx.send(1u8));
        let receiver = {
            let rx = rx.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                (rx.receive(), rx.receive())
            })
        };
        let offer = tx.offer(2);
        let selection = select(&[&offer as &dyn Selectable]).unwrap();
        assert!(selection.is(&offer));
        assert_eq!(offer.into_inner(), None);
        assert_eq!(receiver.join().unwrap(), (Some(1), Some(2)));
    }

    #[test]
    fn spent_offer_leaves_parked_taker() {
        let chan = Arc::new(Buffered::<u8>::new(1).unwrap());
        let taker = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || chan.take())
        };
        thread::sleep(Duration::from_millis(20));

        // an offer whose element was already sent through another select
        let spent = Arc::new(AtomicTake::<u8>::none());
        let semaphore = Arc::new(ChannelSemaphore::new(0));
        assert!(semaphore.set_state(SemaphoreState::Idle, SemaphoreState::ParkedSelect));
        chan.select_put(&semaphore, SelectId::of(&*spent), &spent);
        assert_eq!(semaphore.state(), SemaphoreState::Claimed);
        assert!(RecvChan::is_empty(&*chan));

        thread::sleep(Duration::from_millis(20));
        assert!(!taker.is_finished());
        assert!(chan.put(6));
        assert_eq!(taker.join().unwrap(), Some(6));
    }
}
