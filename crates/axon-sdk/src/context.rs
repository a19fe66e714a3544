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

use axon_core::{EventBus, ModuleLoader, RegistryContext};
use std::sync::{Arc, OnceLock};

/// Keeps the registry a module receives in `initialize` for its later
/// lifecycle calls.
///
/// Every [`loader`](ModuleContext::loader) or [`bus`](ModuleContext::bus)
/// call takes a reference that the module gives back with `request_delete`.
#[derive(Debug, Default)]
pub struct ModuleContext {
    registry: OnceLock<Arc<RegistryContext>>,
}

impl ModuleContext {
    /// An unbound context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers `registry`. Only the first call has an effect.
    ///
    /// Also routes this library's `log` records to the host logger.
    pub fn bind(&self, registry: &Arc<RegistryContext>) {
        forward_logs(registry);
        if self.registry.set(Arc::clone(registry)).is_err() {
            log::warn!("ModuleContext already bound; keeping the first registry");
        }
    }

    /// The bound registry.
    pub fn registry(&self) -> Option<&Arc<RegistryContext>> {
        self.registry.get()
    }

    /// Takes a reference to the loader.
    pub fn loader(&self) -> Option<Arc<ModuleLoader>> {
        self.registry().map(ModuleLoader::instance)
    }

    /// Takes a reference to the bus for payload type `T`.
    pub fn bus<T: Send + Sync + 'static>(&self) -> Option<Arc<EventBus<T>>> {
        self.registry().map(EventBus::<T>::instance)
    }
}

/// Installs the host logger in this library's copy of `log`. Fails quietly
/// when a logger is already set, which is the case whenever the module shares
/// the host's copy.
fn forward_logs(registry: &RegistryContext) {
    if log::set_logger(registry.logger()).is_ok() {
        log::set_max_level(registry.log_level());
    }
}
