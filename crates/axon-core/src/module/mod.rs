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

//! The module contract and the loader that drives it.

mod ffi;
mod handle;
mod loader;

pub use ffi::ModuleSlot;
pub use handle::{ModuleGuard, ModuleHandle};
pub use loader::{ModuleLoader, UnloadOutcome};

pub(crate) use handle::InstancePtr;
pub(crate) use loader::ModuleRecord;

use crate::RegistryContext;
use std::any::Any;
use std::sync::Arc;

/// The instance a module library's `Create` hands out.
///
/// The outer box gives the trait object a thin, FFI-safe address.
pub type ModuleBox = Box<dyn Module>;

/// The lifecycle every loadable unit implements.
///
/// Methods take `&self` because a resident module is shared by every caller
/// that loaded it; mutable state belongs behind the module's own locks.
///
/// # Lock hazard
///
/// The loader holds its re-entrant lock while it calls [`initialize`] and
/// [`release`]. Calling `load`/`unload` from those methods on the same thread
/// is fine. Spawning a thread there that calls `load`/`unload` and then
/// joining it deadlocks. A module that depends on other modules loads them
/// in [`start`] and unloads them in [`stop`].
///
/// [`initialize`]: Module::initialize
/// [`release`]: Module::release
/// [`start`]: Module::start
/// [`stop`]: Module::stop
pub trait Module: Send + Sync {
    /// Called exactly once, after the instance is created and registered.
    ///
    /// The registry is the handle to everything shared: the loader, the event
    /// buses and the kernel configuration.
    fn initialize(&self, registry: &Arc<RegistryContext>);

    /// Called exactly once, right before the library's `Destroy`.
    fn release(&self);

    /// Begins steady-state operation. Never called by the loader.
    fn start(&self);

    /// Ends steady-state operation. Never called by the loader.
    fn stop(&self);

    /// Allows downcasting to the concrete module type.
    fn as_any(&self) -> &dyn Any;
}
