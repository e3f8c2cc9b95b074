//! Compute-once, read-many values produced on a background thread.

use std::any::Any;
use std::fmt;
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;

/// A value computed by a spawned task and joined on first read.
///
/// The task always runs to completion; there is no cancellation. Every reader
/// after the first sees the retained result, and concurrent first readers
/// block until it is ready.
///
/// ```
/// # use gpu_fft_accuracy::deferred::Deferred;
/// let value = Deferred::spawn(|| 6 * 7);
/// assert_eq!(*value.get(), 42);
/// assert_eq!(*value.get(), 42);
/// ```
pub struct Deferred<T> {
    value: OnceLock<T>,
    task: Mutex<Task<T>>,
}

enum Task<T> {
    Pending(JoinHandle<T>),
    /// The task panicked; later readers panic with the same message.
    Panicked(String),
    Joined,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "deferred task panicked".to_string()
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Launches `compute` on its own thread.
    pub fn spawn<F>(compute: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Deferred {
            value: OnceLock::new(),
            task: Mutex::new(Task::Pending(std::thread::spawn(compute))),
        }
    }
}

impl<T> Deferred<T> {
    /// An already-computed value.
    pub fn ready(value: T) -> Self {
        Deferred {
            value: OnceLock::from(value),
            task: Mutex::new(Task::Joined),
        }
    }

    /// Blocks until the value is available.
    ///
    /// # Panics
    ///
    /// If the computing task panicked. The first reader re-raises the original
    /// payload; every later reader panics with its message.
    pub fn get(&self) -> &T {
        self.value.get_or_init(|| {
            let mut task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match std::mem::replace(&mut *task, Task::Joined) {
                Task::Pending(handle) => match handle.join() {
                    Ok(value) => value,
                    Err(payload) => {
                        *task = Task::Panicked(panic_message(payload.as_ref()));
                        drop(task);
                        std::panic::resume_unwind(payload)
                    }
                },
                Task::Panicked(message) => {
                    *task = Task::Panicked(message.clone());
                    drop(task);
                    panic!("{message}")
                }
                Task::Joined => panic!("deferred value was joined without being stored"),
            }
        })
    }

    /// True once a reader has joined the task.
    pub fn is_ready(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.get() {
            Some(value) => f.debug_tuple("Deferred").field(value).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}
