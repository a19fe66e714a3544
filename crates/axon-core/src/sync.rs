// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Locks shared between the host and module libraries.
//!
//! Every module library links its own copy of this crate and of its
//! dependencies. A lock whose waiters are tracked in a per-library global
//! table (as `parking_lot` does) loses wakeups when the thread that parked
//! and the thread that unlocks run code from different libraries. The
//! standard library locks keep all of their state inside the lock itself, so
//! everything reachable from a [`RegistryContext`](crate::RegistryContext)
//! uses them. `parking_lot` stays in use for locks that never leave one
//! library.
//!
//! The standard library is itself linked once per library, and so is its
//! thread-id counter: two libraries can give the same thread different
//! [`ThreadId`]s. Code that compares thread ids across libraries therefore
//! asks one [`ThreadIdentity`], captured by the registry in the host.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Locks `mutex`, ignoring poisoning.
///
/// Handlers and module callbacks never run while one of these locks is held,
/// so a poisoned lock still guards consistent data.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits on `condvar`, ignoring poisoning.
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// Names the calling thread, as seen by one library's standard library.
pub(crate) type ThreadIdentity = fn() -> ThreadId;

/// The [`ThreadIdentity`] of the library this code is compiled into.
pub(crate) fn current_thread() -> ThreadId {
    thread::current().id()
}

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: usize,
}

/// A lock the owning thread may take again without blocking.
pub(crate) struct ReentrantLock {
    state: Mutex<Ownership>,
    released: Condvar,
    identity: ThreadIdentity,
}

impl ReentrantLock {
    /// Creates an unlocked lock whose owners are named by `identity`.
    pub(crate) fn new(identity: ThreadIdentity) -> Self {
        Self {
            state: Mutex::new(Ownership::default()),
            released: Condvar::new(),
            identity,
        }
    }

    /// Blocks until no other thread holds the lock, then takes it.
    pub(crate) fn lock(&self) -> ReentrantGuard<'_> {
        let me = (self.identity)();
        let mut state = lock(&self.state);
        while state.owner.is_some_and(|owner| owner != me) {
            state = wait(&self.released, state);
        }
        state.owner = Some(me);
        state.depth += 1;
        ReentrantGuard { lock: self }
    }

    #[cfg(test)]
    fn is_locked(&self) -> bool {
        lock(&self.state).owner.is_some()
    }

    fn unlock(&self) {
        let mut state = lock(&self.state);
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_all();
        }
    }
}

impl fmt::Debug for ReentrantLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentrantLock")
            .field("state", &*lock(&self.state))
            .finish()
    }
}

/// Held while a [`ReentrantLock`] is taken. Dropping it releases one level.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub(crate) struct ReentrantGuard<'a> {
    lock: &'a ReentrantLock,
}

impl Drop for ReentrantGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
