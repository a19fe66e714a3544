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

//! Per-image storage behind a module library's `Create`/`Destroy` pair.

use super::ModuleBox;
use parking_lot::Mutex;
use std::ptr::NonNull;

struct SlotPtr(NonNull<ModuleBox>);

// SAFETY: the pointee is a `Box<dyn Module>`, and `Module: Send + Sync`.
unsafe impl Send for SlotPtr {}

/// Holds the one live instance of a module library image.
///
/// `Create` is idempotent: while an instance is live it is returned again.
/// `Destroy` requires a live instance and resets the slot, so the next
/// `Create` builds a fresh one.
///
/// Declared as a `static` by [`declare_module!`](crate::declare_module).
pub struct ModuleSlot {
    instance: Mutex<Option<SlotPtr>>,
}

impl ModuleSlot {
    /// An empty slot.
    pub const fn new() -> Self {
        Self {
            instance: parking_lot::const_mutex(None),
        }
    }

    /// Returns the live instance, constructing it with `make` if there is none.
    pub fn get_or_create(&self, make: impl FnOnce() -> ModuleBox) -> *mut ModuleBox {
        let mut slot = self.instance.lock();
        let live = slot.get_or_insert_with(|| SlotPtr(NonNull::from(Box::leak(Box::new(make())))));
        live.0.as_ptr()
    }

    /// Returns `true` while an instance is live.
    pub fn is_live(&self) -> bool {
        self.instance.lock().is_some()
    }

    /// Drops the live instance.
    ///
    /// # Panics
    ///
    /// Panics if there is no live instance. Behind an `extern "C"` symbol this
    /// aborts the process, which is the intended outcome of a double `Destroy`.
    pub fn destroy(&self) {
        let taken = self.instance.lock().take();
        assert!(taken.is_some(), "Destroy called without a live module instance");
        if let Some(live) = taken {
            // SAFETY: the pointer came from `Box::leak` in `get_or_create` and
            // has just been removed from the slot, so this is the only owner.
            drop(unsafe { Box::from_raw(live.0.as_ptr()) });
        }
    }
}

impl Default for ModuleSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares the `Create`/`Destroy` pair of a module.
///
/// ```ignore
/// declare_module!(RUNNER, runner_create, runner_destroy, Runner::default());
/// ```
///
/// expands to a `static RUNNER: ModuleSlot` plus
/// `pub unsafe extern "C" fn runner_create(*const c_char) -> *mut ModuleBox`
/// and `pub unsafe extern "C" fn runner_destroy()`. The constructor expression
/// is evaluated each time a fresh instance is needed. Register the pair with a
/// [`StaticPlatform`](crate::platform::StaticPlatform), or export it from a
/// cdylib with `axon_sdk::export_module!`.
#[macro_export]
macro_rules! declare_module {
    ($slot:ident, $create:ident, $destroy:ident, $ctor:expr) => {
        static $slot: $crate::module::ModuleSlot = $crate::module::ModuleSlot::new();

        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn $create(
            _path: *const ::std::os::raw::c_char,
        ) -> *mut $crate::module::ModuleBox {
            $slot.get_or_create(|| -> $crate::module::ModuleBox { ::std::boxed::Box::new($ctor) })
        }

        pub unsafe extern "C" fn $destroy() {
            $slot.destroy();
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Module, RegistryContext};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Sample;

    impl Module for Sample {
        fn initialize(&self, _registry: &Arc<RegistryContext>) {}
        fn release(&self) {}
        fn start(&self) {}
        fn stop(&self) {}
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl Drop for Sample {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    crate::declare_module!(SAMPLE, sample_create, sample_destroy, Sample);

    #[test]
    fn create_is_idempotent_until_destroy() {
        let first = unsafe { sample_create(std::ptr::null()) };
        let second = unsafe { sample_create(std::ptr::null()) };
        assert_eq!(first, second);
        assert!(SAMPLE.is_live());

        unsafe { sample_destroy() };
        assert!(!SAMPLE.is_live());
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);

        let third = unsafe { sample_create(std::ptr::null()) };
        assert!(SAMPLE.is_live());
        unsafe { sample_destroy() };
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
        assert!(!third.is_null());
    }

    #[test]
    #[should_panic(expected = "without a live module instance")]
    fn destroy_without_instance_panics() {
        let slot = ModuleSlot::new();
        slot.destroy();
    }
}
