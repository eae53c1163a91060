use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

/// Process-wide lock serializing redefinitions against each other and against class use
///
/// At most one thread redefines at a time. Code about to trust cached class structure calls
/// [`RedefinitionLock::check`], which waits for an active redefinition to end unless it is
/// running on the redefining thread itself. Waiting is unbounded.
#[derive(Default)]
pub struct RedefinitionLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl RedefinitionLock {
    pub fn new() -> RedefinitionLock {
        RedefinitionLock::default()
    }

    /// Start a redefinition, waiting for any other one to end
    ///
    /// Not reentrant: the owning thread must drop its guard before beginning again.
    pub fn begin(&self) -> RedefinitionGuard<'_> {
        let current = thread::current().id();
        let mut owner = self.owner.lock();
        debug_assert_ne!(*owner, Some(current), "redefinition already active on this thread");
        while owner.is_some() {
            self.released.wait(&mut owner);
        }
        *owner = Some(current);
        log::debug!("Redefinition started on {:?}", current);
        RedefinitionGuard { lock: self }
    }

    /// Wait until no redefinition is active on another thread
    pub fn check(&self) {
        let current = thread::current().id();
        let mut owner = self.owner.lock();
        while matches!(*owner, Some(thread) if thread != current) {
            self.released.wait(&mut owner);
        }
    }

    pub fn is_redefining_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    pub fn is_active(&self) -> bool {
        self.owner.lock().is_some()
    }

    fn end(&self) {
        let previous = self.owner.lock().take();
        log::debug!("Redefinition ended on {:?}", previous);
        self.released.notify_all();
    }
}

/// An active redefinition, which ends when this is dropped
pub struct RedefinitionGuard<'a> {
    lock: &'a RedefinitionLock,
}

impl<'a> Drop for RedefinitionGuard<'a> {
    fn drop(&mut self) {
        self.lock.end();
    }
}
