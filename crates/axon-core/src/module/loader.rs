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

//! Opens module libraries and drives their lifecycle.

use super::{InstancePtr, ModuleHandle};
use crate::error::LoadError;
use crate::platform::{LibraryHandle, CREATE_SYMBOL, DESTROY_SYMBOL};
use crate::RegistryContext;
use std::ffi::CString;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Registry entry of a resident module.
pub(crate) struct ModuleRecord {
    path: PathBuf,
    handle: ModuleHandle,
    library: Box<dyn LibraryHandle>,
}

/// What an [`unload`](ModuleLoader::unload) call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    /// The last reference was dropped: the module was released, destroyed and
    /// its library closed.
    Released,
    /// Other holders remain; the module stays resident.
    Decremented {
        /// References still held.
        remaining: usize,
    },
    /// The module was not loaded. Nothing happened.
    NotLoaded,
}

/// Loads modules by name and reference-counts them.
///
/// There is one loader per [`RegistryContext`], obtained with
/// [`instance`](ModuleLoader::instance) and given back with
/// [`request_delete`](ModuleLoader::request_delete). `instance`, `load`,
/// `unload` and `request_delete` are serialized by one re-entrant lock: a
/// module may call back into the loader from its own `initialize`/`release` on
/// the same thread, while two distinct threads block on each other.
pub struct ModuleLoader {
    registry: Arc<RegistryContext>,
}

impl ModuleLoader {
    /// Returns the loader of `registry`, creating it on first use.
    ///
    /// Every call takes a reference that must be returned with
    /// [`request_delete`](ModuleLoader::request_delete).
    pub fn instance(registry: &Arc<RegistryContext>) -> Arc<ModuleLoader> {
        let _serial = registry.loader_lock().lock();
        let mut slot = registry.loader();

        if let Some(loader) = slot.get(&()).cloned() {
            let count = slot.add(());
            log::trace!("ModuleLoader reference taken ({count} held)");
            return loader;
        }

        let loader = Arc::new(ModuleLoader {
            registry: Arc::clone(registry),
        });
        slot.insert((), Arc::clone(&loader));
        slot.add(());
        log::info!(
            "ModuleLoader initialized (base directory '{}')",
            registry.base_directory().display()
        );
        loader
    }

    /// Gives back a reference taken by [`instance`](ModuleLoader::instance).
    ///
    /// The registry forgets the loader when the last reference is returned;
    /// a later `instance` call creates a new one. Modules still resident at
    /// that point stay resident.
    pub fn request_delete(&self) {
        let _serial = self.registry.loader_lock().lock();
        let released = {
            let mut slot = self.registry.loader();
            match slot.subtract(&()) {
                Some(0) => slot.erase(&()),
                Some(count) => {
                    log::trace!("ModuleLoader reference returned ({count} held)");
                    None
                }
                None => {
                    log::warn!("ModuleLoader::request_delete called with no reference held");
                    None
                }
            }
        };

        if released.is_some() {
            let resident = self.registry.modules().len();
            if resident > 0 {
                log::warn!("ModuleLoader deleted with {resident} module(s) still resident");
            } else {
                log::info!("ModuleLoader deleted");
            }
        }
    }

    /// The registry this loader belongs to.
    pub fn registry(&self) -> &Arc<RegistryContext> {
        &self.registry
    }

    /// Library path module `name` resolves to.
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.registry
            .config()
            .module_path(name, self.registry.platform().extension())
    }

    /// Loads module `name`, or takes another reference to it if it is
    /// already resident.
    ///
    /// A resident module is returned without touching the filesystem. Otherwise
    /// the library is opened, its `Create` symbol called, the instance
    /// registered with a refcount of 1, and finally `initialize` called on it.
    ///
    /// ## Errors
    /// Returns a [`LoadError`] if the path contains a NUL byte, the library
    /// cannot be opened, has no `Create`, or `Create` returns null. The failure is also logged and any
    /// opened library is closed before returning.
    pub fn load(&self, name: &str) -> Result<ModuleHandle, LoadError> {
        let _serial = self.registry.loader_lock().lock();

        {
            let mut modules = self.registry.modules();
            if let Some(handle) = modules.get(name).map(|record| record.handle.clone()) {
                let count = modules.add(name.to_string());
                log::debug!("Module '{name}' already loaded; refcount is now {count}");
                return Ok(handle);
            }
        }

        let path = self.module_path(name);
        let Ok(c_path) = CString::new(path.to_string_lossy().into_owned()) else {
            log::error!(
                "Unable to load module '{name}': '{}' contains a NUL byte",
                path.display()
            );
            return Err(LoadError::InvalidPath {
                name: name.to_string(),
                path,
            });
        };
        let library = self.registry.platform().open(&path).map_err(|source| {
            log::warn!("Could not load module '{name}': {source}");
            LoadError::Open {
                name: name.to_string(),
                source,
            }
        })?;

        let create = match library.create_symbol(CREATE_SYMBOL) {
            Ok(create) => create,
            Err(err) => {
                log::error!("Unable to load module '{name}': {err}");
                close_quietly(library);
                return Err(LoadError::MissingCreate {
                    name: name.to_string(),
                    path,
                });
            }
        };

        // SAFETY: `create` was resolved from `library`, which stays open until
        // the instance is destroyed.
        let raw = unsafe { create(c_path.as_ptr()) };
        let Some(instance) = InstancePtr::from_raw(raw) else {
            log::error!("Module '{name}' \"Create\" returned no instance");
            close_quietly(library);
            return Err(LoadError::NullInstance {
                name: name.to_string(),
                path,
            });
        };

        let handle = ModuleHandle::new(name, &path, instance);
        {
            let mut modules = self.registry.modules();
            modules.insert(
                name.to_string(),
                ModuleRecord {
                    path: path.clone(),
                    handle: handle.clone(),
                    library,
                },
            );
            modules.add(name.to_string());
        }

        instance.module().initialize(&self.registry);
        log::info!("Module '{name}' loaded from '{}'", path.display());
        Ok(handle)
    }

    /// Loads module `name` into `out`, leaving `None` there on failure.
    ///
    /// Convenient for worker threads that must be joined before the result
    /// is looked at.
    pub fn load_into(&self, name: &str, out: &mut Option<ModuleHandle>) {
        *out = self.load(name).ok();
    }

    /// Drops one reference to module `name`.
    ///
    /// On the last reference the module is `release`d, the library's
    /// `Destroy` is called, the library is closed and the registry entry
    /// erased. Outstanding [`ModuleHandle`]s resolve to `None` from then on.
    pub fn unload(&self, name: &str) -> UnloadOutcome {
        let _serial = self.registry.loader_lock().lock();

        let record = {
            let mut modules = self.registry.modules();
            match modules.subtract(name) {
                None => {
                    log::warn!("Unable to unload module '{name}': it is not loaded");
                    return UnloadOutcome::NotLoaded;
                }
                Some(0) => modules.erase(name),
                Some(remaining) => {
                    log::debug!("Module '{name}' still held; refcount is now {remaining}");
                    return UnloadOutcome::Decremented { remaining };
                }
            }
        };
        let Some(record) = record else {
            log::warn!("Unable to unload module '{name}': it is not loaded");
            return UnloadOutcome::NotLoaded;
        };

        let instance = record.handle.retire();
        match record.library.destroy_symbol(DESTROY_SYMBOL) {
            Ok(destroy) => {
                if let Some(instance) = instance {
                    instance.module().release();
                }
                // SAFETY: resolved from the library that produced the instance,
                // which is still open.
                unsafe { destroy() };
                log::info!("Module '{name}' unloaded from '{}'", record.path.display());
            }
            Err(err) => {
                log::error!("Unable to destroy module '{name}': {err}");
            }
        }

        if let Err(err) = record.library.close() {
            log::error!("Module '{name}': {err}");
        }
        UnloadOutcome::Released
    }

    /// Returns `true` while module `name` is resident.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.registry.modules().contains(name)
    }

    /// References currently held on module `name`.
    pub fn ref_count(&self, name: &str) -> usize {
        self.registry.modules().count(name)
    }

    /// Names of every resident module, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.modules().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("base_directory", &self.registry.base_directory())
            .field("loaded", &self.loaded_modules())
            .finish()
    }
}

fn close_quietly(library: Box<dyn LibraryHandle>) {
    if let Err(err) = library.close() {
        log::error!("{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformLoader, StaticPlatform, StaticSymbols};
    use crate::{KernelConfig, Module};
    use std::any::Any;
    use std::os::raw::c_char;

    #[derive(Default)]
    struct Inert;

    impl Module for Inert {
        fn initialize(&self, _registry: &Arc<RegistryContext>) {}
        fn release(&self) {}
        fn start(&self) {}
        fn stop(&self) {}
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    crate::declare_module!(INERT, inert_create, inert_destroy, Inert);

    #[allow(improper_ctypes_definitions)]
    unsafe extern "C" fn null_create(_path: *const c_char) -> *mut crate::module::ModuleBox {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn noop_destroy() {}

    fn setup() -> (Arc<StaticPlatform>, Arc<RegistryContext>) {
        let platform = Arc::new(StaticPlatform::new());
        let registry = Arc::new(RegistryContext::new(
            KernelConfig::new("/app/bin"),
            platform.clone(),
        ));
        (platform, registry)
    }

    #[test]
    fn instance_is_shared_and_refcounted() {
        let (_platform, registry) = setup();
        let first = ModuleLoader::instance(&registry);
        let second = ModuleLoader::instance(&registry);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.loader_ref_count(), 2);

        second.request_delete();
        assert_eq!(registry.loader_ref_count(), 1);
        first.request_delete();
        assert_eq!(registry.loader_ref_count(), 0);

        let third = ModuleLoader::instance(&registry);
        assert!(!Arc::ptr_eq(&first, &third));
        third.request_delete();
    }

    #[test]
    fn module_path_uses_platform_extension() {
        let (platform, registry) = setup();
        let loader = ModuleLoader::instance(&registry);
        let expected = PathBuf::from(format!(
            "/app/bin/../plugins/runner/bin/runner.{}",
            platform.extension()
        ));
        assert_eq!(loader.module_path("runner"), expected);
        loader.request_delete();
    }

    #[test]
    fn missing_library_is_an_open_error() {
        let (platform, registry) = setup();
        let loader = ModuleLoader::instance(&registry);

        let err = loader.load("ghost").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
        assert_eq!(err.module_name(), "ghost");
        assert!(!loader.is_loaded("ghost"));
        assert_eq!(platform.close_count(), 0);
        loader.request_delete();
    }

    #[test]
    fn nul_in_module_path_fails_before_opening() {
        let (platform, registry) = setup();
        platform.register("inert", StaticSymbols::new(inert_create, inert_destroy));
        let loader = ModuleLoader::instance(&registry);

        let err = loader.load("in\0ert").unwrap_err();
        assert!(matches!(err, LoadError::InvalidPath { .. }));
        assert_eq!(err.module_name(), "in\0ert");
        assert_eq!(platform.open_count(), 0);
        assert!(loader.loaded_modules().is_empty());
        loader.request_delete();
    }

    #[test]
    fn missing_create_closes_the_library() {
        let (platform, registry) = setup();
        platform.register(
            "headless",
            StaticSymbols {
                create: None,
                destroy: Some(noop_destroy),
            },
        );
        let loader = ModuleLoader::instance(&registry);

        let err = loader.load("headless").unwrap_err();
        assert!(matches!(err, LoadError::MissingCreate { .. }));
        assert_eq!(platform.open_count(), 1);
        assert_eq!(platform.close_count(), 1);
        assert_eq!(loader.ref_count("headless"), 0);
        loader.request_delete();
    }

    #[test]
    fn null_instance_closes_the_library() {
        let (platform, registry) = setup();
        platform.register("hollow", StaticSymbols::new(null_create, noop_destroy));
        let loader = ModuleLoader::instance(&registry);

        let mut out = None;
        loader.load_into("hollow", &mut out);
        assert!(out.is_none());
        assert_eq!(platform.close_count(), 1);
        assert!(loader.loaded_modules().is_empty());
        loader.request_delete();
    }

    #[test]
    fn unload_of_unknown_module_is_a_noop() {
        let (_platform, registry) = setup();
        let loader = ModuleLoader::instance(&registry);
        assert_eq!(loader.unload("nobody"), UnloadOutcome::NotLoaded);
        loader.request_delete();
    }

    #[test]
    fn load_then_unload_round_trip() {
        let (platform, registry) = setup();
        platform.register("inert", StaticSymbols::new(inert_create, inert_destroy));
        let loader = ModuleLoader::instance(&registry);

        let handle = loader.load("inert").unwrap();
        assert!(INERT.is_live());
        assert_eq!(loader.loaded_modules(), vec!["inert".to_string()]);
        assert_eq!(registry.module_ref_count("inert"), 1);

        assert_eq!(loader.unload("inert"), UnloadOutcome::Released);
        assert!(!INERT.is_live());
        assert!(handle.get().is_none());
        assert_eq!(platform.close_count(), 1);
        loader.request_delete();
    }
}
