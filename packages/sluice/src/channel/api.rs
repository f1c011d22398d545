// public endpoint handles and factories.

use super::{
    buffered::Buffered,
    core::{RecvChan, SendChan},
    error::{TimeoutError, ZeroCapacityError},
    select::{Selectable, Selection, SelectId},
    semaphore::{ChannelSemaphore, SemaphoreState},
    singleton::Singleton,
    sink::Sink,
    timeout::Timeout,
    unbuffered::Unbuffered,
};
use crate::util::AtomicTake;
use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::Arc,
    time::Duration,
};


/// Sending half of a channel
///
/// Cloning creates another handle to the same channel. A default-constructed sender behaves like
/// a handle to an already-closed channel.
pub struct Sender<T>(Option<Arc<dyn SendChan<T>>>);

/// Receiving half of a channel
///
/// Cloning creates another handle to the same channel. A default-constructed receiver behaves like
/// a handle to an already-closed, empty channel.
pub struct Receiver<T>(Option<Arc<dyn RecvChan<T>>>);

// bind a sender and a receiver to the same channel.
pub(crate) fn bind<T, C>(chan: C) -> (Sender<T>, Receiver<T>)
where
    C: SendChan<T> + RecvChan<T> + 'static,
{
    let chan = Arc::new(chan);
    (
        Sender(Some(Arc::clone(&chan) as Arc<dyn SendChan<T>>)),
        Receiver(Some(chan as Arc<dyn RecvChan<T>>)),
    )
}

// whether two handles point to the same channel, ignoring vtables.
fn same_arc<C: ?Sized>(a: &Option<Arc<C>>, b: &Option<Arc<C>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        (None, None) => true,
        _ => false,
    }
}

// complete a select round over an endpoint which has no channel.
fn resolve_closed(semaphore: &ChannelSemaphore, id: SelectId) {
    if semaphore.set_state(SemaphoreState::ParkedSelect, SemaphoreState::Claimed) {
        semaphore.complete(Selection::new(id));
    }
}


impl<T: 'static> Sender<T> {
    /// Wrap a channel into a sender
    ///
    /// If `chan` already is a `Sender<T>`, it is returned as-is rather than wrapped again.
    pub fn wrap<C: SendChan<T> + 'static>(chan: C) -> Self {
        let mut chan = Some(chan);
        if let Some(sender) = <dyn Any>::downcast_mut::<Option<Sender<T>>>(&mut chan) {
            return sender.take().unwrap_or_default();
        }
        Sender(chan.map(|chan| Arc::new(chan) as Arc<dyn SendChan<T>>))
    }
}

impl<T> Sender<T> {
    /// Block until the element is accepted and return true, or return false if the channel is or
    /// becomes closed first
    pub fn send(&self, elem: T) -> bool {
        match self.0 {
            Some(ref chan) => chan.put(elem),
            None => false,
        }
    }

    /// Whether the channel is closed
    pub fn is_closed(&self) -> bool {
        self.0.as_ref().map(|chan| chan.is_closed()).unwrap_or(true)
    }

    /// Whether a send would currently block
    pub fn is_full(&self) -> bool {
        self.0.as_ref().map(|chan| chan.is_full()).unwrap_or(false)
    }

    /// Close the channel
    pub fn close(&self) {
        if let Some(ref chan) = self.0 {
            chan.close();
        }
    }

    /// Make a [`select`](crate::select) candidate which sends `elem`
    ///
    /// After the select, [`Offer::into_inner`] gives the element back if it was not sent.
    pub fn offer(&self, elem: T) -> Offer<'_, T> {
        Offer { sender: self, elem: Arc::new(AtomicTake::some(elem)) }
    }

    /// Whether both handles send into the same channel
    pub fn same_channel(&self, other: &Self) -> bool {
        same_arc(&self.0, &other.0)
    }
}

impl<T> SendChan<T> for Sender<T> {
    fn is_closed(&self) -> bool {
        Sender::is_closed(self)
    }

    fn is_full(&self) -> bool {
        Sender::is_full(self)
    }

    fn close(&self) {
        Sender::close(self)
    }

    fn put(&self, elem: T) -> bool {
        self.send(elem)
    }

    fn select_put_now(&self, elem: &Arc<AtomicTake<T>>, id: SelectId) -> Option<Selection> {
        match self.0 {
            Some(ref chan) => chan.select_put_now(elem, id),
            None => Some(Selection::new(id)),
        }
    }

    fn select_put(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId, elem: &Arc<AtomicTake<T>>) {
        match self.0 {
            Some(ref chan) => chan.select_put(semaphore, id, elem),
            None => resolve_closed(semaphore, id),
        }
    }

    fn cancel_put(&self, semaphore: &Arc<ChannelSemaphore>) {
        if let Some(ref chan) = self.0 {
            chan.cancel_put(semaphore);
        }
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender(self.0.clone())
    }
}

impl<T> Default for Sender<T> {
    fn default() -> Self {
        Sender(None)
    }
}

impl<T> Debug for Sender<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Sender")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}


impl<T: 'static> Receiver<T> {
    /// Wrap a channel into a receiver
    ///
    /// If `chan` already is a `Receiver<T>`, it is returned as-is rather than wrapped again.
    pub fn wrap<C: RecvChan<T> + 'static>(chan: C) -> Self {
        let mut chan = Some(chan);
        if let Some(receiver) = <dyn Any>::downcast_mut::<Option<Receiver<T>>>(&mut chan) {
            return receiver.take().unwrap_or_default();
        }
        Receiver(chan.map(|chan| Arc::new(chan) as Arc<dyn RecvChan<T>>))
    }

    /// Retrieve the element a [`select`](crate::select) received from this
    ///
    /// Returns `None` if the selection carries no element of this type, which is the case when
    /// the channel closed during the select.
    pub fn extract(&self, selection: Selection) -> Option<T> {
        selection.into_payload::<T>()
    }
}

impl<T> Receiver<T> {
    /// Block until an element is available and return it, or return `None` once the channel is
    /// closed and drained
    pub fn receive(&self) -> Option<T> {
        self.0.as_ref().and_then(|chan| chan.take())
    }

    /// Whether the channel is closed
    ///
    /// Elements may still be buffered in a closed channel.
    pub fn is_closed(&self) -> bool {
        self.0.as_ref().map(|chan| chan.is_closed()).unwrap_or(true)
    }

    /// Whether no element is currently available
    pub fn is_empty(&self) -> bool {
        self.0.as_ref().map(|chan| chan.is_empty()).unwrap_or(true)
    }

    /// Close the channel
    pub fn close(&self) {
        if let Some(ref chan) = self.0 {
            chan.close();
        }
    }

    /// Iterator which receives until the channel is closed and drained
    pub fn iter(&self) -> Iter<'_, T> {
        Iter(self)
    }

    /// Whether both handles receive from the same channel
    pub fn same_channel(&self, other: &Self) -> bool {
        same_arc(&self.0, &other.0)
    }
}

impl<T> RecvChan<T> for Receiver<T> {
    fn is_closed(&self) -> bool {
        Receiver::is_closed(self)
    }

    fn is_empty(&self) -> bool {
        Receiver::is_empty(self)
    }

    fn close(&self) {
        Receiver::close(self)
    }

    fn take(&self) -> Option<T> {
        self.receive()
    }

    fn select_take_now(&self, id: SelectId) -> Option<Selection> {
        match self.0 {
            Some(ref chan) => chan.select_take_now(id),
            None => Some(Selection::new(id)),
        }
    }

    fn select_take(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        match self.0 {
            Some(ref chan) => chan.select_take(semaphore, id),
            None => resolve_closed(semaphore, id),
        }
    }

    fn cancel_take(&self, semaphore: &Arc<ChannelSemaphore>) {
        if let Some(ref chan) = self.0 {
            chan.cancel_take(semaphore);
        }
    }
}

impl<T> Selectable for Receiver<T> {
    fn selectable(&self) -> bool {
        !(self.is_closed() && self.is_empty())
    }

    fn select_now(&self, id: SelectId) -> Option<Selection> {
        self.select_take_now(id)
    }

    fn select_notify(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        self.select_take(semaphore, id);
    }

    fn select_cancel(&self, semaphore: &Arc<ChannelSemaphore>) {
        self.cancel_take(semaphore);
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver(self.0.clone())
    }
}

impl<T> Default for Receiver<T> {
    fn default() -> Self {
        Receiver(None)
    }
}

impl<T> Debug for Receiver<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("closed", &self.is_closed())
            .field("empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}

/// Iterator over the elements received from a [`Receiver`]
#[derive(Debug)]
pub struct Iter<'a, T>(&'a Receiver<T>);

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.receive()
    }
}

impl<'a, T> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}


/// [`select`](crate::select) candidate which sends an element through a [`Sender`]
pub struct Offer<'a, T> {
    sender: &'a Sender<T>,
    // taken by whoever wins the select
    elem: Arc<AtomicTake<T>>,
}

impl<'a, T> Offer<'a, T> {
    /// Get the element back, if it was not sent
    pub fn into_inner(self) -> Option<T> {
        self.elem.take()
    }
}

impl<'a, T> Selectable for Offer<'a, T> {
    fn selectable(&self) -> bool {
        !self.sender.is_closed() && self.elem.is_some()
    }

    fn select_now(&self, id: SelectId) -> Option<Selection> {
        self.sender.select_put_now(&self.elem, id)
    }

    fn select_notify(&self, semaphore: &Arc<ChannelSemaphore>, id: SelectId) {
        self.sender.select_put(semaphore, id, &self.elem);
    }

    fn select_cancel(&self, semaphore: &Arc<ChannelSemaphore>) {
        self.sender.cancel_put(semaphore);
    }
}

impl<'a, T> Debug for Offer<'a, T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Offer")
            .field("pending", &self.elem.is_some())
            .finish_non_exhaustive()
    }
}


/// Make an [`Unbuffered`] channel
pub fn unbuffered<T: Send + 'static>() -> (Sender<T>, Receiver<T>) {
    Unbuffered::make()
}

/// Make a [`Buffered`] channel with the given nonzero capacity
pub fn buffered<T: Send + 'static>(cap: usize) -> Result<(Sender<T>, Receiver<T>), ZeroCapacityError> {
    Buffered::make(cap)
}

/// Make a [`Singleton`] channel
pub fn singleton<T: Send + 'static>() -> (Sender<T>, Receiver<T>) {
    Singleton::make()
}

/// Make a [`Sink`]
pub fn sink<T: Send + 'static>() -> Sender<T> {
    Sink::make()
}

/// Make a [`Timeout`] which closes after the given nonzero delay
pub fn timeout(delay: Duration) -> Result<Timeout, TimeoutError> {
    Timeout::new(delay)
}

/// Which kind of bidirectional channel to make
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Flavor {
    /// See [`Unbuffered`]
    #[default]
    Unbuffered,
    /// See [`Buffered`]
    Buffered(usize),
    /// See [`Singleton`]
    Singleton,
}

impl Flavor {
    /// Make a channel of this flavor
    pub fn make<T: Send + 'static>(self) -> Result<(Sender<T>, Receiver<T>), ZeroCapacityError> {
        match self {
            Flavor::Unbuffered => Ok(Unbuffered::make()),
            Flavor::Buffered(cap) => Buffered::make(cap),
            Flavor::Singleton => Ok(Singleton::make()),
        }
    }
}
