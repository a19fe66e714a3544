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

//! Drives the lifecycle of the modules named by a startup file.

use axon_core::{ModuleHandle, ModuleLoader, RegistryContext, UnloadOutcome};
use std::sync::Arc;

/// Owns the loader reference and one handle per successful load.
///
/// Modules are started in load order and stopped and unloaded in reverse.
pub struct Host {
    loader: Arc<ModuleLoader>,
    loaded: Vec<ModuleHandle>,
}

impl Host {
    /// Takes a loader reference from `registry`.
    pub fn new(registry: &Arc<RegistryContext>) -> Self {
        Self {
            loader: ModuleLoader::instance(registry),
            loaded: Vec::new(),
        }
    }

    /// Loads each module in order. Failures are logged and skipped.
    ///
    /// ## Returns
    ///
    /// The number of modules that loaded.
    pub fn load_all<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let before = self.loaded.len();
        for name in names {
            let name = name.as_ref();
            match self.loader.load(name) {
                Ok(handle) => self.loaded.push(handle),
                Err(err) => log::error!("Skipping module '{name}': {err}"),
            }
        }
        self.loaded.len() - before
    }

    /// Calls `start` on every loaded module in load order.
    pub fn start_all(&self) {
        for handle in &self.loaded {
            log::debug!("Starting module '{}'", handle.name());
            if handle.with(|module| module.start()).is_none() {
                log::warn!("Module '{}' is no longer resident; not starting it", handle.name());
            }
        }
    }

    /// Calls `stop` on every loaded module in reverse load order.
    pub fn stop_all(&self) {
        for handle in self.loaded.iter().rev() {
            log::debug!("Stopping module '{}'", handle.name());
            if handle.with(|module| module.stop()).is_none() {
                log::warn!("Module '{}' is no longer resident; not stopping it", handle.name());
            }
        }
    }

    /// Gives back every load reference, newest first.
    pub fn unload_all(&mut self) {
        while let Some(handle) = self.loaded.pop() {
            match self.loader.unload(handle.name()) {
                UnloadOutcome::Released => log::info!("Module '{}' released", handle.name()),
                UnloadOutcome::Decremented { remaining } => log::debug!(
                    "Module '{}' still has {remaining} reference(s)",
                    handle.name()
                ),
                UnloadOutcome::NotLoaded => {}
            }
        }
    }

    /// Handles of the modules loaded so far, in load order.
    pub fn loaded(&self) -> &[ModuleHandle] {
        &self.loaded
    }

    /// Unloads everything and returns the loader reference.
    pub fn shutdown(mut self) {
        self.unload_all();
        self.loader.request_delete();
    }
}
