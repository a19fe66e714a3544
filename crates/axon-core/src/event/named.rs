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

use super::handler::{Handler, HandlerId};
use crate::sync::{self, ThreadIdentity};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

struct EventState<T> {
    handlers: Arc<[Handler<T>]>,
    in_flight: usize,
    /// Threads currently running handlers of some dispatch, one entry per
    /// running stretch.
    running: Vec<ThreadId>,
    closed: bool,
}

impl<T> EventState<T> {
    /// Structural changes wait while a dispatch is in flight, unless the
    /// calling thread is itself running one of its handlers.
    fn must_wait(&self, me: ThreadId) -> bool {
        self.in_flight > 0 && !self.running.contains(&me)
    }
}

/// A named channel on an [`EventBus`](super::EventBus).
///
/// The handler list is copy-on-write: a dispatch clones it when it starts and
/// runs exactly those handlers. Subscribing or unsubscribing from another
/// thread blocks until no dispatch is in flight, so a structural change never
/// completes while a snapshot is being run. A handler may still subscribe or
/// unsubscribe on its own event; the change applies from the next dispatch.
///
/// Closing the event refuses new dispatches and waits until the running ones
/// complete.
///
/// # Hazards
///
/// A handler that waits on another thread which subscribes to, unsubscribes
/// from or destroys the same event never returns.
pub struct NamedEvent<T> {
    name: String,
    state: Mutex<EventState<T>>,
    idle: Condvar,
    identity: ThreadIdentity,
}

impl<T> NamedEvent<T> {
    pub(crate) fn new(name: &str, identity: ThreadIdentity) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(EventState {
                handlers: Arc::from(Vec::<Handler<T>>::new()),
                in_flight: 0,
                running: Vec::new(),
                closed: false,
            }),
            idle: Condvar::new(),
            identity,
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of subscribed handlers.
    pub fn len(&self) -> usize {
        sync::lock(&self.state).handlers.len()
    }

    /// Returns `true` if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the subscribed handlers, in dispatch order.
    pub fn handler_ids(&self) -> Vec<HandlerId> {
        sync::lock(&self.state)
            .handlers
            .iter()
            .map(Handler::id)
            .collect()
    }

    /// Dispatches currently running.
    pub fn in_flight(&self) -> usize {
        sync::lock(&self.state).in_flight
    }

    /// Returns `true` once the event has been destroyed.
    pub fn is_closed(&self) -> bool {
        sync::lock(&self.state).closed
    }

    /// Appends `added` after the current handlers. Returns their ids, or
    /// nothing if the event is closed by the time the change can be made.
    pub(crate) fn add(&self, added: Vec<Handler<T>>) -> Vec<HandlerId> {
        if added.is_empty() {
            return Vec::new();
        }
        let mut state = self.settled();
        if state.closed {
            return Vec::new();
        }
        let ids = added.iter().map(Handler::id).collect();
        let merged: Vec<Handler<T>> = state.handlers.iter().cloned().chain(added).collect();
        state.handlers = merged.into();
        ids
    }

    /// Removes every handler whose id is in `ids`. Returns how many were removed.
    pub(crate) fn remove(&self, ids: &[HandlerId]) -> usize {
        let mut state = self.settled();
        let kept: Vec<Handler<T>> = state
            .handlers
            .iter()
            .filter(|handler| !ids.contains(&handler.id()))
            .cloned()
            .collect();
        let removed = state.handlers.len() - kept.len();
        if removed > 0 {
            state.handlers = kept.into();
        }
        removed
    }

    /// Locks the state once no dispatch started elsewhere is in flight.
    fn settled(&self) -> std::sync::MutexGuard<'_, EventState<T>> {
        let me = (self.identity)();
        let mut state = sync::lock(&self.state);
        while !state.closed && state.must_wait(me) {
            log::trace!(
                "Event '{}' change waiting on {} dispatch(es)",
                self.name,
                state.in_flight
            );
            state = sync::wait(&self.idle, state);
        }
        state
    }

    /// Starts a dispatch: counts it as in flight and snapshots the handlers.
    /// `None` if the event is closed.
    pub(crate) fn begin(self: &Arc<Self>) -> Option<Dispatch<T>> {
        let mut state = sync::lock(&self.state);
        if state.closed {
            return None;
        }
        state.in_flight += 1;
        let snapshot = Arc::clone(&state.handlers);
        Some(Dispatch {
            event: Arc::clone(self),
            snapshot,
        })
    }

    fn finish(&self) {
        let mut state = sync::lock(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }

    fn enter(&self, thread: ThreadId) {
        sync::lock(&self.state).running.push(thread);
    }

    fn leave(&self, thread: ThreadId) {
        let mut state = sync::lock(&self.state);
        if let Some(at) = state.running.iter().position(|running| *running == thread) {
            state.running.swap_remove(at);
        }
    }

    /// Refuses further dispatches and blocks until the running ones complete.
    ///
    /// There is no timeout. Calling this from inside one of the event's own
    /// handlers never returns.
    pub(crate) fn close_and_drain(&self) {
        let mut state = sync::lock(&self.state);
        state.closed = true;
        // Changes parked in `settled` now see the event closed.
        self.idle.notify_all();
        while state.in_flight > 0 {
            log::trace!(
                "Event '{}' waiting on {} dispatch(es)",
                self.name,
                state.in_flight
            );
            state = sync::wait(&self.idle, state);
        }
    }
}

impl<T> fmt::Debug for NamedEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = sync::lock(&self.state);
        f.debug_struct("NamedEvent")
            .field("name", &self.name)
            .field(
                "handlers",
                &state.handlers.iter().map(Handler::id).collect::<Vec<_>>(),
            )
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish()
    }
}

/// One dispatch in progress. Dropping it marks the dispatch complete.
pub(crate) struct Dispatch<T> {
    event: Arc<NamedEvent<T>>,
    snapshot: Arc<[Handler<T>]>,
}

impl<T> Dispatch<T> {
    /// The handlers this dispatch runs, in subscription order.
    pub(crate) fn handlers(&self) -> &[Handler<T>] {
        &self.snapshot
    }

    /// Marks the current thread as running this dispatch's handlers until
    /// the returned guard drops. Such a thread may change the event's
    /// handlers without waiting for the dispatch to finish.
    pub(crate) fn enter(&self) -> Running<'_, T> {
        let thread = (self.event.identity)();
        self.event.enter(thread);
        Running {
            event: &self.event,
            thread,
        }
    }

    /// Runs every handler in order on the current thread.
    pub(crate) fn run(&self, payload: &T) -> usize {
        let _running = self.enter();
        for handler in self.snapshot.iter() {
            handler.invoke(payload);
        }
        self.snapshot.len()
    }
}

impl<T> Drop for Dispatch<T> {
    fn drop(&mut self) {
        self.event.finish();
    }
}

/// Returned by [`Dispatch::enter`].
pub(crate) struct Running<'a, T> {
    event: &'a NamedEvent<T>,
    thread: ThreadId,
}

impl<T> Drop for Running<'_, T> {
    fn drop(&mut self) {
        self.event.leave(self.thread);
    }
}
