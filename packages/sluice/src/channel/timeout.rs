// channel which closes itself once a deadline passes.

use super::{
    api::Receiver,
    core::RecvChan,
    error::TimeoutError,
    select::{Selectable, Selection, SelectId},
    semaphore::{ChannelSemaphore, SemaphoreState},
    waiter::{Parked, WaitQueue},
};
use crate::util::lock;
use std::{
    fmt::{self, Debug, Formatter},
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering::{Acquire, AcqRel}},
        Arc,
        Condvar,
        Mutex,
        PoisonError,
    },
    thread,
    time::{Duration, Instant},
};


/// Receive-only channel which never yields an element, and closes itself once its deadline
/// passes
///
/// Blocking on it blocks until the deadline. As a [`select`](crate::select) candidate it never
/// wins; instead its expiry makes the select return `None`, which makes it the way to bound how
/// long a select may block.
///
/// A background thread waits out the deadline. Closing early, or dropping every handle, wakes
/// that thread and lets it exit.
#[derive(Clone)]
pub struct Timeout(Arc<Handle>);

// user side of the shared state. the timer thread holds the shared state but not this, so the last
// handle dropping can close it.
struct Handle(Arc<Shared>);

struct Shared {
    parked: Mutex<WaitQueue<Parked>>,
    // notified on early close
    cond: Condvar,
    closed: AtomicBool,
    deadline: Instant,
}

impl Timeout {
    /// Construct, closing after the given delay, which must be nonzero
    pub fn new(delay: Duration) -> Result<Self, TimeoutError> {
        if delay.is_zero() {
            return Err(TimeoutError::ZeroDelay);
        }
        Timeout::at(Instant::now() + delay)
    }

    /// Construct, closing at the given deadline
    ///
    /// If the deadline already passed, it is constructed closed.
    pub fn at(deadline: Instant) -> Result<Self, TimeoutError> {
        let shared = Arc::new(Shared {
            parked: Mutex::new(WaitQueue::new()),
            cond: Condvar::new(),
            closed: AtomicBool::new(false),
            deadline,
        });
        if deadline <= Instant::now() {
            shared.close(&mut lock(&shared.parked));
        } else {
            let timer = Arc::clone(&shared);
            thread::Builder::new()
                .name("sluice-timeout".into())
                .spawn(move || timer.run())?;
        }
        Ok(Timeout(Arc::new(Handle(shared))))
    }

    /// When this closes itself
    pub fn deadline(&self) -> Instant {
        self.0.deadline
    }

    /// Whether the deadline passed or it was closed early
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Acquire)
    }

    /// Close now, ahead of the deadline
    pub fn close(&self) {
        self.0.close(&mut lock(&self.0.parked));
    }

    /// Block until closed
    pub fn wait(&self) {
        let semaphore = {
            let mut parked = lock(&self.0.parked);
            if self.is_closed() {
                return;
            }
            let waiter = Parked::direct();
            let semaphore = Arc::clone(waiter.semaphore());
            parked.push(waiter);
            semaphore
        };
        semaphore.wait();
    }

    /// A receiver over this, of any element type
    ///
    /// It never receives an element. Note that a receiver over an expired timeout is not
    /// selectable, so to bound a select, pass the timeout itself as a candidate.
    pub fn receiver<T: 'static>(&self) -> Receiver<T> {
        Receiver::wrap(self.clone())
    }

    fn notify(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        let mut parked = lock(&self.0.parked);
        if self.is_closed() {
            if semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
                semaphore.expire();
            }
            return;
        }
        parked.push(Parked::select(semaphore, id));
    }

    fn cancel(&self, semaphore: &Arc<ChannelSemaphore>) {
        lock(&self.0.parked).cancel(semaphore);
    }
}

impl Shared {
    // body of the timer thread.
    fn run(&self) {
        let mut parked = lock(&self.parked);
        loop {
            if self.closed.load(Acquire) {
                return;
            }
            let now = Instant::now();
            if now >= self.deadline {
                break;
            }
            parked = self.cond
                .wait_timeout(parked, self.deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        trace!("timeout elapsed");
        self.close(&mut parked);
    }

    fn close(&self, parked: &mut WaitQueue<Parked>) {
        if self.closed.swap(true, AcqRel) {
            return;
        }
        let waiters = parked.claim_all();
        trace!(waiters = waiters.len(), "closing timeout");
        for waiter in waiters {
            waiter.expire();
        }
        self.cond.notify_all();
    }
}

impl Deref for Handle {
    type Target = Shared;

    fn deref(&self) -> &Shared {
        &self.0
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.0.close(&mut lock(&self.0.parked));
    }
}

impl Selectable for Timeout {
    fn selectable(&self) -> bool {
        true
    }

    fn select_now(&self, _: SelectId) -> Option<Selection> {
        None
    }

    fn select_notify(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        self.notify(semaphore, id);
    }

    fn select_cancel(&self, semaphore: &Arc<ChannelSemaphore>) {
        self.cancel(semaphore);
    }
}

impl<T> RecvChan<T> for Timeout {
    fn is_closed(&self) -> bool {
        Timeout::is_closed(self)
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn close(&self) {
        Timeout::close(self)
    }

    fn take(&self) -> Option<T> {
        self.wait();
        None
    }

    fn select_take_now(&self, _: SelectId) -> Option<Selection> {
        None
    }

    fn select_take(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        self.notify(semaphore, id);
    }

    fn cancel_take(&self, semaphore: &Arc<ChannelSemaphore>) {
        self.cancel(semaphore);
    }
}

impl Debug for Timeout {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("deadline", &self.0.deadline)
            .field("closed", &self.is_closed())
            .finish()
    }
}
