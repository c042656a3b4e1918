use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Unit of work delivered on the host callback thread.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded host callback queue.
///
/// The thread that owns the queue drains it; any thread may post through a
/// [`CallbackPoster`]. Callbacks run in the order they were posted.
pub struct CallbackQueue {
    sender: Sender<Callback>,
    receiver: Receiver<Callback>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub fn poster(&self) -> CallbackPoster {
        CallbackPoster {
            sender: self.sender.clone(),
        }
    }

    /// Run everything already queued; returns how many callbacks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Block up to `timeout` for one callback and run it.
    pub fn run_next_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackQueue").finish_non_exhaustive()
    }
}

/// Cloneable, thread-safe handle for posting onto a [`CallbackQueue`].
#[derive(Clone)]
pub struct CallbackPoster {
    sender: Sender<Callback>,
}

impl CallbackPoster {
    /// Queue `callback`; `false` once the queue has been dropped.
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(callback)).is_ok()
    }
}

impl std::fmt::Debug for CallbackPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPoster").finish_non_exhaustive()
    }
}
