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

//! The shared store behind the loader and every event bus.
//!
//! The [`RegistryContext`] holds one [`RefTable`] per logical table:
//!
//! - resident modules, keyed by module name;
//! - the loader singleton;
//! - named events, keyed by `(payload type, event name)`;
//! - event buses, keyed by payload type.
//!
//! It has no business logic of its own. The entry point constructs exactly one
//! context, wraps it in an `Arc`, and hands it to the loader; the loader hands
//! it to every module's `initialize`, and modules hand it to
//! [`EventBus::instance`](crate::EventBus::instance). Two modules therefore
//! always see the same loader and the same bus for a given payload type.
//!
//! # Locking
//!
//! All tables sit behind one table lock. No callback ever runs while it is
//! held, so it does not need to be re-entrant. The loader's own re-entrant lock
//! is a separate lock, stored here so that every image shares it. Both are
//! built on the standard library locks, which work across module libraries.

mod table;

pub use table::RefTable;

use crate::config::KernelConfig;
use crate::event::HandlerId;
use crate::module::{ModuleLoader, ModuleRecord};
use crate::platform::PlatformLoader;
use crate::sync::{self, ReentrantLock, ThreadIdentity};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Type-erased value stored for buses and named events.
pub(crate) type SharedAny = Arc<dyn Any + Send + Sync>;

/// Identifies an event payload type.
///
/// Equality and hashing use the [`TypeId`] only; the type name is kept for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct PayloadTag {
    id: TypeId,
    name: &'static str,
}

impl PayloadTag {
    /// The tag of payload type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Readable name of the payload type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for PayloadTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadTag {}

impl Hash for PayloadTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PayloadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Registry key of a named event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Payload type of the owning bus.
    pub payload: PayloadTag,
    /// Event name.
    pub name: String,
}

impl EventKey {
    /// Key of event `name` on the bus for payload type `T`.
    pub fn of<T: 'static>(name: &str) -> Self {
        Self::new(PayloadTag::of::<T>(), name)
    }

    pub(crate) fn new(payload: PayloadTag, name: &str) -> Self {
        Self {
            payload,
            name: name.to_string(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Tables {
    modules: RefTable<String, ModuleRecord>,
    loader: RefTable<(), Arc<ModuleLoader>>,
    events: RefTable<EventKey, SharedAny>,
    buses: RefTable<PayloadTag, SharedAny>,
}

/// The table lock, narrowed to one table.
pub(crate) struct TableGuard<'a, V> {
    tables: MutexGuard<'a, Tables>,
    read: fn(&Tables) -> &V,
    write: fn(&mut Tables) -> &mut V,
}

impl<V> Deref for TableGuard<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        (self.read)(&self.tables)
    }
}

impl<V> DerefMut for TableGuard<'_, V> {
    fn deref_mut(&mut self) -> &mut V {
        (self.write)(&mut self.tables)
    }
}

/// The single shared-state store of a kernel instance.
pub struct RegistryContext {
    config: KernelConfig,
    platform: Arc<dyn PlatformLoader>,
    tables: Mutex<Tables>,
    loader_lock: ReentrantLock,
    thread_identity: ThreadIdentity,
    next_handler_id: AtomicU64,
    logger: &'static dyn log::Log,
    log_level: log::LevelFilter,
}

impl RegistryContext {
    /// Creates an empty registry.
    ///
    /// The process logger and its level are captured here so modules built
    /// as separate libraries can forward to them (see [`RegistryContext::logger`]).
    /// Initialize logging before calling this. The way threads are told apart
    /// is captured too, so every library agrees on it.
    ///
    /// ## Arguments
    /// * `config` - Layout all module paths are resolved against.
    /// * `platform` - Backend used to open module libraries.
    #[must_use]
    pub fn new(config: KernelConfig, platform: Arc<dyn PlatformLoader>) -> Self {
        log::debug!(
            "Registry created with base directory '{}'",
            config.base_directory().display()
        );
        Self {
            config,
            platform,
            tables: Mutex::new(Tables::default()),
            loader_lock: ReentrantLock::new(sync::current_thread),
            thread_identity: sync::current_thread,
            next_handler_id: AtomicU64::new(1),
            logger: log::logger(),
            log_level: log::max_level(),
        }
    }

    /// The kernel configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The directory module paths are resolved against.
    pub fn base_directory(&self) -> &Path {
        self.config.base_directory()
    }

    /// The library backend.
    pub fn platform(&self) -> &Arc<dyn PlatformLoader> {
        &self.platform
    }

    /// The logger installed in the host when the registry was created.
    ///
    /// A `cdylib` module links its own copy of the `log` facade, which starts
    /// with no logger; installing this one routes its records to the host.
    pub fn logger(&self) -> &'static dyn log::Log {
        self.logger
    }

    /// The host's maximum log level when the registry was created.
    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level
    }

    /// Outstanding [`ModuleLoader::instance`] references.
    #[must_use]
    pub fn loader_ref_count(&self) -> usize {
        self.lock_tables().loader.count(&())
    }

    /// Outstanding [`EventBus::instance`](crate::EventBus::instance) references
    /// for payload type `T`.
    #[must_use]
    pub fn bus_ref_count<T: 'static>(&self) -> usize {
        self.lock_tables().buses.count(&PayloadTag::of::<T>())
    }

    /// Outstanding `create` calls for event `name` of payload type `T`.
    #[must_use]
    pub fn event_ref_count<T: 'static>(&self, name: &str) -> usize {
        self.lock_tables().events.count(&EventKey::of::<T>(name))
    }

    /// Outstanding `load` calls for module `name`.
    #[must_use]
    pub fn module_ref_count(&self, name: &str) -> usize {
        self.lock_tables().modules.count(name)
    }

    fn lock_tables(&self) -> MutexGuard<'_, Tables> {
        sync::lock(&self.tables)
    }

    pub(crate) fn modules(&self) -> TableGuard<'_, RefTable<String, ModuleRecord>> {
        TableGuard {
            tables: self.lock_tables(),
            read: |tables| &tables.modules,
            write: |tables| &mut tables.modules,
        }
    }

    pub(crate) fn loader(&self) -> TableGuard<'_, RefTable<(), Arc<ModuleLoader>>> {
        TableGuard {
            tables: self.lock_tables(),
            read: |tables| &tables.loader,
            write: |tables| &mut tables.loader,
        }
    }

    pub(crate) fn events(&self) -> TableGuard<'_, RefTable<EventKey, SharedAny>> {
        TableGuard {
            tables: self.lock_tables(),
            read: |tables| &tables.events,
            write: |tables| &mut tables.events,
        }
    }

    pub(crate) fn buses(&self) -> TableGuard<'_, RefTable<PayloadTag, SharedAny>> {
        TableGuard {
            tables: self.lock_tables(),
            read: |tables| &tables.buses,
            write: |tables| &mut tables.buses,
        }
    }

    /// Serializes `instance`, `load`, `unload` and `request_delete` on the loader.
    pub(crate) fn loader_lock(&self) -> &ReentrantLock {
        &self.loader_lock
    }

    /// Names the calling thread the same way from every library.
    pub(crate) fn thread_identity(&self) -> ThreadIdentity {
        self.thread_identity
    }

    /// Mints a handler id. Ids start at 1 and are never reused.
    pub(crate) fn next_handler_id(&self) -> HandlerId {
        HandlerId::new(self.next_handler_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for RegistryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.lock_tables();
        f.debug_struct("RegistryContext")
            .field("config", &self.config)
            .field("modules", &tables.modules.len())
            .field("events", &tables.events.len())
            .field("buses", &tables.buses.len())
            .finish_non_exhaustive()
    }
}
