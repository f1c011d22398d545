//! Run a closure on a background thread and retrieve its result later.

use crate::{
    ChannelSemaphore,
    error::TaskPanickedError,
};
use std::{
    fmt::{self, Debug, Formatter},
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, OnceLock},
    thread,
};


/// Handle to the result of a closure running on a background thread
///
/// Cloning creates another handle to the same result.
pub struct Task<T>(Arc<Inner<T>>);

struct Inner<T> {
    result: OnceLock<Result<T, TaskPanickedError>>,
    // signalled once the result is set. every getter re-signals it after waiting, so it stays
    // passable.
    done: ChannelSemaphore,
}

/// Spawn a thread to run `task`, returning a handle to its result
///
/// Errors if the thread could not be spawned.
pub fn future<T, F>(task: F) -> io::Result<Task<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + Sync + 'static,
{
    let inner = Arc::new(Inner { result: OnceLock::new(), done: ChannelSemaphore::new(0) });
    let worker = Arc::clone(&inner);
    thread::Builder::new()
        .name("sluice-future".into())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|_| {
                    warn!("background task panicked");
                    TaskPanickedError
                });
            let set = worker.result.set(result);
            debug_assert!(set.is_ok());
            worker.done.signal();
        })?;
    Ok(Task(inner))
}

impl<T> Task<T> {
    /// Block until the closure finished, and return its result
    ///
    /// Every call returns the same result.
    pub fn get(&self) -> Result<&T, TaskPanickedError> {
        self.0.done.wait();
        self.0.done.signal();
        match self.0.result.get() {
            Some(Ok(val)) => Ok(val),
            Some(&Err(e)) => Err(e),
            None => unreachable!("task signalled done without a result"),
        }
    }

    /// Whether the closure finished
    pub fn is_ready(&self) -> bool {
        self.0.result.get().is_some()
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task(Arc::clone(&self.0))
    }
}

impl<T> Debug for Task<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Task")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}
