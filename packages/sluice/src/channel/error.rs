// channel error types.
//
// ordinary terminal outcomes (put into a closed channel, take from a closed and drained channel)
// are plain values, not errors. the types here only cover misconfiguration at construction time
// and failures of the threads the crate spawns.

use std::io;
use thiserror::Error;


/// Error for trying to make a buffered channel with a capacity of zero
///
/// A rendezvous channel is made with [`Unbuffered`](crate::Unbuffered) instead.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[error("buffered channel capacity must be nonzero")]
pub struct ZeroCapacityError;

/// Error for trying to make a [`Timeout`](crate::Timeout)
#[derive(Error, Debug)]
pub enum TimeoutError {
    /// The delay was zero
    #[error("timeout delay must be positive")]
    ZeroDelay,
    /// The timer thread could not be spawned
    #[error("failed to spawn timer thread")]
    Spawn(#[from] io::Error),
}

/// Error for retrieving the result of a [`Task`](crate::future::Task) whose closure panicked
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[error("background task panicked")]
pub struct TaskPanickedError;
