// implementation of the channels and of select.
//
// the basic architecture is as such:
//
// endpoint handles (Sender, Receiver) wrap around Arc<dyn SendChan<T>> / Arc<dyn RecvChan<T>>
//                                                    |
//          /-----------------------------------------/
//          v
//       concrete channel (Unbuffered, Buffered, Singleton, Timeout, Sink)
//          |
//          |------ it contains a Mutex around its lockable state, which holds the element
//          |       storage (if any) and two wait queues of parked parties.
//          |
//          |------ it contains atomic counters of elements written and read, and an atomic closed
//          |       flag, so that the is_* observers need not lock.
//          |
//          \------ each parked party in a wait queue holds an Arc<ChannelSemaphore>. a party
//                  parked by a direct put/take has a semaphore of its own; a party parked by a
//                  select shares one semaphore with every other candidate of that select round.
//
// whoever makes a parked party ready (a counterpart, close, a timer) must first win the
// semaphore's compare-and-swap into the Claimed state. winning is exactly-once per semaphore, so
// a select round has exactly one winner no matter how many of its candidates become ready at
// the same time. a lost compare-and-swap means the parked party is stale, and the loser leaves
// the channel's storage alone.
//
// the organization of these modules is as such:
//
//      semaphore<---------waiter<-----------core: the SendChan and RecvChan contracts which
//                           ^               ^     every variant implements.
//      queue<---------------|---------------|
//                           |               |
//                         variants----------/     (unbuffered, buffered, singleton, timeout, sink)
//                           ^
//                           |
//      select<-------------api: Sender, Receiver, Offer, factories. The crate re-exports this
//                               API publically.
//
// there is also the error module, which contains the error types, which is also re-exported
// publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod semaphore;
pub(crate) mod select;
pub(crate) mod queue;

pub(crate) mod unbuffered;
pub(crate) mod buffered;
pub(crate) mod singleton;
pub(crate) mod timeout;
pub(crate) mod sink;

mod waiter;
