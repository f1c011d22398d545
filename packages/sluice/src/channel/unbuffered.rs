// rendezvous channel.

use super::{
    api::{bind, Receiver, Sender},
    core::{Counters, RecvChan, SendChan},
    select::{Selection, SelectId},
    semaphore::{ChannelSemaphore, SemaphoreState},
    waiter::{Pairing, RecvWaiter, SendWaiter, WaitQueue, Waiter},
};
use crate::util::{lock, AtomicTake};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex},
};


/// Channel with no buffer, which hands each element directly from a sender to a receiver
///
/// `put` blocks until a receiver takes the element, and `take` blocks until a sender provides
/// one. Since the channel never holds an element, it always reports itself empty and full.
pub struct Unbuffered<T> {
    lockable: Mutex<Lockable<T>>,
    counters: Counters,
}

struct Lockable<T> {
    senders: WaitQueue<SendWaiter<T>>,
    receivers: WaitQueue<RecvWaiter<T>>,
}

impl<T: Send + 'static> Unbuffered<T> {
    /// Construct open
    pub fn new() -> Self {
        Unbuffered {
            lockable: Mutex::new(Lockable {
                senders: WaitQueue::new(),
                receivers: WaitQueue::new(),
            }),
            counters: Counters::default(),
        }
    }

    /// Construct, and bind a sender and receiver to it
    pub fn make() -> (Sender<T>, Receiver<T>) {
        bind(Unbuffered::new())
    }

    fn transferred(&self) {
        self.counters.wrote();
        self.counters.read();
    }

    // take an element from the first live parked sender.
    fn accept_next(&self, lockable: &mut Lockable<T>) -> Option<T> {
        while let Some(sender) = lockable.senders.claim_next() {
            if let Some(elem) = sender.accept() {
                self.transferred();
                return Some(elem);
            }
        }
        None
    }

    // complete a select round without a transfer.
    fn resolve_closed(semaphore: &ChannelSemaphore, id: SelectId) {
        if semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
            semaphore.complete(Selection::new(id));
        }
    }
}

impl<T: Send + 'static> Default for Unbuffered<T> {
    fn default() -> Self {
        Unbuffered::new()
    }
}

impl<T: Send + 'static> SendChan<T> for Unbuffered<T> {
    fn is_closed(&self) -> bool {
        self.counters.is_closed()
    }

    fn is_full(&self) -> bool {
        // there is no room to hold an element, so a put always waits for a taker
        true
    }

    fn close(&self) {
        let mut lockable = lock(&self.lockable);
        if !self.counters.set_closed() {
            return;
        }
        let receivers = lockable.receivers.claim_all();
        let senders = lockable.senders.claim_all();
        trace!(receivers = receivers.len(), senders = senders.len(), "closing unbuffered channel");
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
        if let Some(receiver) = lockable.receivers.claim_next() {
            self.transferred();
            receiver.deliver(elem);
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
        if !elem.is_some() {
            return None;
        }
        let receiver = lockable.receivers.claim_next()?;
        match elem.take() {
            Some(elem) => {
                self.transferred();
                receiver.deliver(elem);
                Some(Selection::new(id))
            }
            None => {
                lockable.receivers.restore(receiver);
                None
            }
        }
    }

    fn select_put(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>) {
        let mut lockable = lock(&self.lockable);
        if self.counters.is_closed() {
            Self::resolve_closed(semaphore, id);
            return;
        }
        if !elem.is_some() {
            // the offer was already sent through another select
            Self::resolve_closed(semaphore, id);
            return;
        }
        match lockable.receivers.pair(semaphore) {
            Pairing::Paired(receiver) => {
                match elem.take() {
                    Some(elem) => {
                        self.transferred();
                        receiver.deliver(elem);
                    }
                    None => lockable.receivers.restore(receiver),
                }
                semaphore.complete(Selection::new(id));
            }
            Pairing::Lost => (),
            Pairing::Unpaired => lockable.senders.push(SendWaiter::select(semaphore, id, elem)),
        }
    }

    fn cancel_put(&self, semaphore: &Arc<ChannelSemaphore>) {
        lock(&self.lockable).senders.cancel(semaphore);
    }
}

impl<T: Send + 'static> RecvChan<T> for Unbuffered<T> {
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
        if let Some(elem) = self.accept_next(&mut lockable) {
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
        if let Some(elem) = self.accept_next(&mut lockable) {
            return Some(Selection::new(id).with_payload(elem));
        }
        if self.counters.is_closed() {
            return Some(Selection::new(id));
        }
        None
    }

    fn select_take(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        let mut lockable = lock(&self.lockable);
        if self.counters.is_closed() {
            Self::resolve_closed(semaphore, id);
            return;
        }
        match lockable.senders.pair(semaphore) {
            Pairing::Paired(sender) => {
                let selection = match sender.accept() {
                    Some(elem) => {
                        self.transferred();
                        Selection::new(id).with_payload(elem)
                    }
                    None => Selection::new(id),
                };
                semaphore.complete(selection);
            }
            Pairing::Lost => (),
            Pairing::Unpaired => lockable.receivers.push(RecvWaiter::select(semaphore, id)),
        }
    }

    fn cancel_take(&self, semaphore: &Arc<ChannelSemaphore>) {
        lock(&self.lockable).receivers.cancel(semaphore);
    }
}

impl<T> Debug for Unbuffered<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Unbuffered")
            .field("closed", &self.counters.is_closed())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{select, Selectable, Timeout};
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        collections::HashSet,
        thread,
        time::Duration,
    };

    #[test]
    fn handoff_to_blocked_reader() {
        let (tx, rx) = Unbuffered::make();
        let reader = {
            let rx = rx.clone();
            thread::spawn(move || rx.receive())
        };
        let bystander = {
            let rx = rx.clone();
            thread::spawn(move || rx.receive())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(tx.send(42));
        tx.close();
        let mut observed = vec![reader.join().unwrap(), bystander.join().unwrap()];
        observed.sort();
        assert_eq!(observed, vec![None, Some(42)]);
    }

    #[test]
    fn put_waits_for_taker() {
        let (tx, rx) = Unbuffered::make();
        assert!(tx.is_full());
        let sender = {
            let tx = tx.clone();
            thread::spawn(move || tx.send("hi"))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!sender.is_finished());

        // a parked sender holds its element outside the channel
        assert!(rx.is_empty());
        assert!(tx.is_full());
        assert_eq!(rx.receive(), Some("hi"));
        assert!(sender.join().unwrap());
        assert!(rx.is_empty());
    }

    #[test]
    fn spent_offer_leaves_parked_taker() {
        let chan = Arc::new(Unbuffered::<u8>::new());
        let taker = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || chan.take())
        };
        thread::sleep(Duration::from_millis(20));

        // an offer whose element was already sent through another select
        let spent = Arc::new(AtomicTake::<u8>::none());
        let id = SelectId::of(&*spent);
        assert!(chan.select_put_now(&spent, id).is_none());

        let semaphore = Arc::new(ChannelSemaphore::new(0));
        assert!(semaphore.set_state(SemaphoreState::Idle, SemaphoreState::ParkedSelect));
        chan.select_put(&semaphore, id, &spent);
        assert_eq!(semaphore.state(), SemaphoreState::Claimed);

        thread::sleep(Duration::from_millis(20));
        assert!(!taker.is_finished());
        assert!(chan.put(5));
        assert_eq!(taker.join().unwrap(), Some(5));
    }

    #[test]
    fn closed_is_sticky() {
        let (tx, rx) = Unbuffered::<u8>::make();
        rx.close();
        assert!(tx.is_closed());
        assert!(!tx.send(1));
        assert!(!tx.send(2));
        assert_eq!(rx.receive(), None);
    }

    #[test]
    fn select_never_matches_itself() {
        let (tx, rx) = Unbuffered::<u8>::make();
        let timeout = Timeout::new(Duration::from_millis(50)).unwrap();
        let offer = tx.offer(1);
        let selection = select(&[&offer as &dyn Selectable, &rx, &timeout]);
        assert!(selection.is_none());
        assert_eq!(offer.into_inner(), Some(1));
    }

    #[test]
    fn select_closed_while_parked() {
        let (tx, rx) = Unbuffered::<u8>::make();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.close();
        });
        let selection = select(&[&rx as &dyn Selectable]).unwrap();
        assert!(selection.is(&rx));
        assert!(!selection.has_payload());
        assert_eq!(rx.extract(selection), None);
        closer.join().unwrap();

        // nothing left to select on
        assert!(select(&[&rx as &dyn Selectable]).is_none());
    }

    #[test]
    fn concurrent_selects_deliver_exactly_once() {
        const SENDERS: u32 = 3;
        const RECEIVERS: u32 = 3;
        const PER_SENDER: u32 = 300;

        let (tx_a, rx_a) = Unbuffered::make();
        let (tx_b, rx_b) = Unbuffered::make();

        let senders = (0..SENDERS)
            .map(|s| {
                let tx_a = tx_a.clone();
                let tx_b = tx_b.clone();
                thread::spawn(move || {
                    let mut rng = Pcg32::seed_from_u64(s as u64);
                    for i in 0..PER_SENDER {
                        let elem = s * PER_SENDER + i;
                        // direct operations only use b, so that any mix of direct and select
                        // parties on both sides can always pair up
                        if rng.gen_ratio(1, 4) {
                            assert!(tx_b.send(elem));
                            continue;
                        }
                        let offer_a = tx_a.offer(elem);
                        let offer_b = tx_b.offer(elem);
                        let selection = select(&[&offer_a as &dyn Selectable, &offer_b]).unwrap();
                        let (won, lost) = if selection.is(&offer_a) {
                            (offer_a, offer_b)
                        } else {
                            (offer_b, offer_a)
                        };
                        assert_eq!(won.into_inner(), None);
                        assert_eq!(lost.into_inner(), Some(elem));
                    }
                })
            })
            .collect::<Vec<_>>();

        let receivers = (0..RECEIVERS)
            .map(|r| {
                let rx_a = rx_a.clone();
                let rx_b = rx_b.clone();
                thread::spawn(move || {
                    let mut rng = Pcg32::seed_from_u64(100 + r as u64);
                    let mut received = Vec::new();
                    loop {
                        if rng.gen_ratio(1, 4) && !rx_b.is_closed() {
                            if let Some(elem) = rx_b.receive() {
                                received.push(elem);
                            }
                            continue;
                        }
                        let Some(selection) = select(&[&rx_a as &dyn Selectable, &rx_b]) else {
                            break;
                        };
                        let elem = if selection.is(&rx_a) {
                            rx_a.extract(selection)
                        } else {
                            rx_b.extract(selection)
                        };
                        received.extend(elem);
                    }
                    received
                })
            })
            .collect::<Vec<_>>();

        for sender in senders {
            sender.join().unwrap();
        }
        tx_a.close();
        tx_b.close();

        let mut seen = HashSet::new();
        for receiver in receivers {
            for elem in receiver.join().unwrap() {
                assert!(seen.insert(elem), "{} received twice", elem);
            }
        }
        assert_eq!(seen.len() as u32, SENDERS * PER_SENDER);
    }
}
