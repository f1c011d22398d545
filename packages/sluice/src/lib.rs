//! CSP-style channels for OS threads.
//!
//! Typed channels with several buffering policies, capability-restricted [`Sender`] and
//! [`Receiver`] handles over them, and a multi-way blocking [`select`] in which exactly one of an
//! arbitrary set of endpoints wins.
//!
//! ```
//! use sluice::{buffered, select, Selectable};
//!
//! let (tx, rx) = buffered::<u32>(2).unwrap();
//! assert!(tx.send(7));
//!
//! let selection = select(&[&rx as &dyn Selectable]).unwrap();
//! assert!(selection.is(&rx));
//! assert_eq!(rx.extract(selection), Some(7));
//! ```

#[macro_use]
extern crate tracing;

mod channel;
pub mod util;
pub mod future;

pub use crate::channel::{
    api::*,
    core::{SendChan, RecvChan},
    semaphore::{ChannelSemaphore, SemaphoreState},
    select::{select, Selectable, Selection, SelectId},
    queue::{Queue, Drain},
    unbuffered::Unbuffered,
    buffered::Buffered,
    singleton::Singleton,
    timeout::Timeout,
    sink::Sink,
};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}
