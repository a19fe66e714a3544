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

use super::handler::{Handler, HandlerFn, HandlerId};
use super::named::NamedEvent;
use crate::registry::{EventKey, PayloadTag, SharedAny};
use crate::RegistryContext;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Publish/subscribe over named events carrying payloads of type `T`.
///
/// There is one bus per payload type per [`RegistryContext`]; every module
/// asking for `EventBus::<T>::instance` gets the same one. Events live in the
/// registry, so a module can dispatch on an event another module created
/// without holding a reference to that module.
///
/// Operations on an unknown event name log a warning and return an empty
/// result instead of failing.
pub struct EventBus<T: Send + Sync + 'static> {
    registry: Arc<RegistryContext>,
    tag: PayloadTag,
    _payload: PhantomData<fn(&T)>,
}

impl<T: Send + Sync + 'static> EventBus<T> {
    /// Returns the bus for payload type `T`, creating it on first use.
    ///
    /// Every call takes a reference that must be returned with
    /// [`request_delete`](EventBus::request_delete).
    pub fn instance(registry: &Arc<RegistryContext>) -> Arc<Self> {
        let tag = PayloadTag::of::<T>();
        let mut buses = registry.buses();

        if let Some(bus) = buses.get(&tag).cloned().and_then(downcast::<Self>) {
            let count = buses.add(tag);
            log::trace!("EventBus<{}> reference taken ({count} held)", tag.name());
            return bus;
        }

        let bus = Arc::new(Self {
            registry: Arc::clone(registry),
            tag,
            _payload: PhantomData,
        });
        buses.insert(tag, Arc::clone(&bus) as SharedAny);
        buses.add(tag);
        log::info!("EventBus<{}> initialized.", tag.name());
        bus
    }

    /// Gives back a reference taken by [`instance`](EventBus::instance).
    ///
    /// The registry forgets the bus when the last reference is returned.
    /// Events created on it are unaffected.
    pub fn request_delete(&self) {
        let released = {
            let mut buses = self.registry.buses();
            match buses.subtract(&self.tag) {
                Some(0) => buses.erase(&self.tag),
                _ => None,
            }
        };
        if released.is_some() {
            log::info!("EventBus<{}> deleted.", self.tag.name());
        }
    }

    /// Creates event `name`, or takes another reference to it if it exists.
    pub fn create(&self, name: &str) {
        let key = self.key(name);
        let mut events = self.registry.events();
        if events.contains(&key) {
            let count = events.add(key);
            log::debug!("Event '{name}' already exists; refcount is now {count}");
            return;
        }
        let event: SharedAny = Arc::new(NamedEvent::<T>::new(
            name,
            self.registry.thread_identity(),
        ));
        events.insert(key.clone(), event);
        events.add(key);
        log::debug!("Event '{name}' created on EventBus<{}>", self.tag.name());
    }

    /// Drops one reference to event `name`.
    ///
    /// On the last reference the event stops accepting dispatches, this call
    /// blocks until the running ones complete, and the event is gone. A later
    /// [`create`](EventBus::create) starts from an empty handler list.
    pub fn destroy(&self, name: &str) {
        let key = self.key(name);
        let removed = {
            let mut events = self.registry.events();
            match events.subtract(&key) {
                None => {
                    log::warn!("Unable to destroy event '{name}': no such event");
                    return;
                }
                Some(0) => events.erase(&key),
                Some(remaining) => {
                    log::debug!("Event '{name}' still held; refcount is now {remaining}");
                    return;
                }
            }
        };

        if let Some(event) = removed.and_then(downcast::<NamedEvent<T>>) {
            event.close_and_drain();
            log::debug!("Event '{name}' destroyed");
        }
    }

    /// Subscribes `handler` to event `name`.
    ///
    /// Returns `None` (and logs) if the event does not exist.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> Option<HandlerId>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_all(name, [Arc::new(handler) as HandlerFn<T>])
            .into_iter()
            .next()
    }

    /// Subscribes every handler in `handlers` to event `name`, in order.
    ///
    /// Returns the new ids in the same order, or an empty vector (and logs) if
    /// the event does not exist.
    pub fn subscribe_all<I>(&self, name: &str, handlers: I) -> Vec<HandlerId>
    where
        I: IntoIterator<Item = HandlerFn<T>>,
    {
        let Some(event) = self.lookup(name) else {
            log::warn!("Unable to subscribe to event '{name}': no such event");
            return Vec::new();
        };
        let added: Vec<Handler<T>> = handlers
            .into_iter()
            .map(|func| Handler::new(self.registry.next_handler_id(), func))
            .collect();
        let ids = event.add(added);
        log::trace!("Subscribed {} handler(s) to '{name}'", ids.len());
        ids
    }

    /// Removes handler `id` from event `name`. Returns `true` if it was found.
    pub fn unsubscribe(&self, name: &str, id: HandlerId) -> bool {
        self.unsubscribe_all(name, &[id]) == 1
    }

    /// Removes every handler in `ids` from event `name`. Returns how many were
    /// found.
    pub fn unsubscribe_all(&self, name: &str, ids: &[HandlerId]) -> usize {
        let Some(event) = self.lookup(name) else {
            log::warn!("Unable to unsubscribe from event '{name}': no such event");
            return 0;
        };
        event.remove(ids)
    }

    /// Calls every handler of event `name` with `payload`, in subscription
    /// order, on the current thread. Returns how many ran.
    ///
    /// The handler list is snapshotted when the call starts. Subscribing or
    /// unsubscribing from another thread waits until the call returns; a
    /// handler changing the list itself affects the next call only.
    pub fn call(&self, name: &str, payload: T) -> usize {
        let Some(dispatch) = self.lookup(name).and_then(|event| event.begin()) else {
            log::warn!("Unable to call event '{name}': no such event");
            return 0;
        };
        dispatch.run(&payload)
    }

    /// Like [`call`](EventBus::call), but on a helper thread.
    ///
    /// The snapshot is taken before this returns. `None` (and logs) if the
    /// event does not exist or the helper thread could not be started.
    pub fn call_async_blocking(&self, name: &str, payload: T) -> Option<PendingDispatch> {
        let Some(dispatch) = self.lookup(name).and_then(|event| event.begin()) else {
            log::warn!("Unable to call event '{name}': no such event");
            return None;
        };
        let spawned = thread::Builder::new()
            .name(format!("axon-dispatch-{name}"))
            .spawn(move || dispatch.run(&payload));
        match spawned {
            Ok(handle) => Some(PendingDispatch { handle }),
            Err(err) => {
                log::error!("Unable to start dispatch thread for '{name}': {err}");
                None
            }
        }
    }

    /// Calls every handler of event `name` on its own thread and returns once
    /// all of them have finished. Returns how many ran.
    ///
    /// Handlers may subscribe or unsubscribe from their own threads without
    /// waiting for the others.
    ///
    /// If a thread cannot be started, that handler runs on the calling thread
    /// instead.
    pub fn call_async(&self, name: &str, payload: &T) -> usize {
        let Some(dispatch) = self.lookup(name).and_then(|event| event.begin()) else {
            log::warn!("Unable to call event '{name}': no such event");
            return 0;
        };
        thread::scope(|scope| {
            for handler in dispatch.handlers() {
                let dispatch = &dispatch;
                let spawned = thread::Builder::new()
                    .name(format!("axon-handler-{}", handler.id().get()))
                    .spawn_scoped(scope, move || {
                        let _running = dispatch.enter();
                        handler.invoke(payload);
                    });
                if let Err(err) = spawned {
                    log::error!("Unable to start handler thread for '{name}': {err}");
                    let _running = dispatch.enter();
                    handler.invoke(payload);
                }
            }
        });
        dispatch.handlers().len()
    }

    /// Returns `true` if event `name` exists on this bus.
    pub fn exists(&self, name: &str) -> bool {
        self.registry.events().contains(&self.key(name))
    }

    /// Names of every event on this bus, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .events()
            .keys()
            .filter(|key| key.payload == self.tag)
            .map(|key| key.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of handlers subscribed to event `name`, 0 if it does not exist.
    pub fn handler_count(&self, name: &str) -> usize {
        self.lookup(name).map_or(0, |event| event.len())
    }

    /// Ids subscribed to event `name` in dispatch order, empty if it does not
    /// exist.
    pub fn handler_ids(&self, name: &str) -> Vec<HandlerId> {
        self.lookup(name)
            .map(|event| event.handler_ids())
            .unwrap_or_default()
    }

    fn key(&self, name: &str) -> EventKey {
        EventKey::new(self.tag, name)
    }

    fn lookup(&self, name: &str) -> Option<Arc<NamedEvent<T>>> {
        let event = self.registry.events().get(&self.key(name)).cloned()?;
        downcast::<NamedEvent<T>>(event)
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("payload", &self.tag)
            .field("events", &self.event_names())
            .finish()
    }
}

/// A dispatch started by [`EventBus::call_async_blocking`].
#[derive(Debug)]
#[must_use = "dropping a PendingDispatch detaches it"]
pub struct PendingDispatch {
    handle: JoinHandle<usize>,
}

impl PendingDispatch {
    /// Waits for the dispatch to complete and returns how many handlers ran.
    ///
    /// ## Errors
    /// Returns the panic payload if a handler panicked.
    pub fn join(self) -> thread::Result<usize> {
        self.handle.join()
    }

    /// Returns `true` once every handler has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn downcast<V: Send + Sync + 'static>(value: SharedAny) -> Option<Arc<V>> {
    match value.downcast::<V>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::error!(
                "Registry entry is not a {}; ignoring it",
                std::any::type_name::<V>()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::StaticPlatform;
    use crate::KernelConfig;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<RegistryContext> {
        Arc::new(RegistryContext::new(
            KernelConfig::default(),
            Arc::new(StaticPlatform::new()),
        ))
    }

    #[test]
    fn instance_is_one_per_payload_type() {
        let registry = registry();
        let first = EventBus::<f64>::instance(&registry);
        let second = EventBus::<f64>::instance(&registry);
        let other = EventBus::<String>::instance(&registry);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.bus_ref_count::<f64>(), 2);
        assert_eq!(registry.bus_ref_count::<String>(), 1);

        first.request_delete();
        second.request_delete();
        other.request_delete();
        assert_eq!(registry.bus_ref_count::<f64>(), 0);

        let fresh = EventBus::<f64>::instance(&registry);
        assert!(!Arc::ptr_eq(&first, &fresh));
        fresh.request_delete();
    }

    #[test]
    fn same_name_on_different_buses_is_independent() {
        let registry = registry();
        let floats = EventBus::<f64>::instance(&registry);
        let words = EventBus::<String>::instance(&registry);
        floats.create("update");

        assert!(floats.exists("update"));
        assert!(!words.exists("update"));
        assert!(words.subscribe("update", |_: &String| {}).is_none());
        assert_eq!(floats.event_names(), vec!["update".to_string()]);
        assert!(words.event_names().is_empty());
    }

    #[test]
    fn call_runs_handlers_once_in_order() {
        let registry = registry();
        let bus = EventBus::<u32>::instance(&registry);
        bus.create("tick");
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let order = Arc::clone(&order);
            bus.subscribe("tick", move |value: &u32| order.lock().push((tag, *value)));
        }

        assert_eq!(bus.call("tick", 7), 2);
        assert_eq!(*order.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn create_twice_needs_destroy_twice() {
        let registry = registry();
        let bus = EventBus::<u32>::instance(&registry);
        bus.create("tick");
        bus.create("tick");
        assert_eq!(registry.event_ref_count::<u32>("tick"), 2);

        bus.destroy("tick");
        assert!(bus.exists("tick"));
        bus.destroy("tick");
        assert!(!bus.exists("tick"));
        bus.destroy("tick");
        assert_eq!(registry.event_ref_count::<u32>("tick"), 0);
    }

    #[test]
    fn unknown_event_gives_empty_results() {
        let registry = registry();
        let bus = EventBus::<u32>::instance(&registry);

        assert!(bus.subscribe_all("nowhere", Vec::new()).is_empty());
        assert!(!bus.unsubscribe("nowhere", HandlerId::new(1)));
        assert_eq!(bus.call("nowhere", 1), 0);
        assert_eq!(bus.call_async("nowhere", &1), 0);
        assert!(bus.call_async_blocking("nowhere", 1).is_none());
        assert_eq!(bus.handler_count("nowhere"), 0);
        assert!(bus.handler_ids("nowhere").is_empty());
    }

    #[test]
    fn call_async_blocking_runs_on_helper_thread() {
        let registry = registry();
        let bus = EventBus::<u32>::instance(&registry);
        bus.create("tick");
        let caller = thread::current().id();
        let off_thread = Arc::new(AtomicUsize::new(0));
        {
            let off_thread = Arc::clone(&off_thread);
            bus.subscribe("tick", move |_| {
                if thread::current().id() != caller {
                    off_thread.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let pending = bus.call_async_blocking("tick", 3).unwrap();
        assert_eq!(pending.join().unwrap(), 1);
        assert_eq!(off_thread.load(Ordering::SeqCst), 1);
    }
}
