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

use super::{Module, ModuleBox};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Address of a library-owned module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InstancePtr(NonNull<ModuleBox>);

// SAFETY: the pointee is a `Box<dyn Module>`, and `Module: Send + Sync`.
unsafe impl Send for InstancePtr {}
unsafe impl Sync for InstancePtr {}

impl InstancePtr {
    /// Wraps what a `Create` call returned; `None` for null.
    pub(crate) fn from_raw(raw: *mut ModuleBox) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    /// Borrows the instance.
    ///
    /// Only valid until the owning library's `Destroy` runs; the loader calls
    /// this on pointers it has not yet destroyed.
    pub(crate) fn module(&self) -> &(dyn Module + 'static) {
        // SAFETY: see above.
        let boxed: &ModuleBox = unsafe { self.0.as_ref() };
        &**boxed
    }
}

/// Read access to a resident module, returned by [`ModuleHandle::get`].
///
/// The module cannot be destroyed while a guard is alive: the final `unload`
/// waits for every guard to drop. Do not hold one across a call that unloads
/// the same module.
pub struct ModuleGuard<'a> {
    _slot: RwLockReadGuard<'a, Option<InstancePtr>>,
    instance: InstancePtr,
}

impl Deref for ModuleGuard<'_> {
    type Target = dyn Module;

    fn deref(&self) -> &Self::Target {
        self.instance.module()
    }
}

struct Residency {
    name: String,
    path: PathBuf,
    instance: RwLock<Option<InstancePtr>>,
}

/// A clonable reference to a module returned by
/// [`ModuleLoader::load`](crate::ModuleLoader::load).
///
/// A handle never keeps the module loaded; the refcount does. Once the last
/// `unload` destroys the instance, every outstanding handle resolves to `None`.
#[derive(Clone)]
pub struct ModuleHandle {
    residency: Arc<Residency>,
}

impl ModuleHandle {
    pub(crate) fn new(name: &str, path: &Path, instance: InstancePtr) -> Self {
        Self {
            residency: Arc::new(Residency {
                name: name.to_string(),
                path: path.to_path_buf(),
                instance: RwLock::new(Some(instance)),
            }),
        }
    }

    /// Name the module was loaded under.
    pub fn name(&self) -> &str {
        &self.residency.name
    }

    /// Library the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.residency.path
    }

    /// Returns `true` until the module is destroyed.
    pub fn is_resident(&self) -> bool {
        self.slot().is_some()
    }

    /// Borrows the module, or `None` once it has been destroyed.
    pub fn get(&self) -> Option<ModuleGuard<'_>> {
        let slot = self.slot();
        let instance = (*slot)?;
        Some(ModuleGuard {
            _slot: slot,
            instance,
        })
    }

    /// Runs `f` against the module if it is still resident.
    pub fn with<R>(&self, f: impl FnOnce(&dyn Module) -> R) -> Option<R> {
        self.get().map(|module| f(&*module))
    }

    /// Returns `true` if both handles refer to the same residency, that is,
    /// the same instance from the same `load` chain.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.residency, &b.residency)
    }

    /// Detaches the instance, waiting for outstanding guards to drop.
    pub(crate) fn retire(&self) -> Option<InstancePtr> {
        self.residency
            .instance
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn slot(&self) -> RwLockReadGuard<'_, Option<InstancePtr>> {
        self.residency
            .instance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.residency.name)
            .field("path", &self.residency.path)
            .field("resident", &self.is_resident())
            .finish()
    }
}
