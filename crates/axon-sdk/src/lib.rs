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

//! The public-facing SDK for writing axon modules.
//!
//! A module is a `cdylib` crate that implements [`Module`](prelude::Module)
//! and exports it with [`export_module!`]:
//!
//! ```ignore
//! use axon_sdk::prelude::*;
//!
//! #[derive(Default)]
//! struct Hello { context: ModuleContext }
//!
//! impl Module for Hello {
//!     fn initialize(&self, registry: &Arc<RegistryContext>) { self.context.bind(registry); }
//!     fn release(&self) {}
//!     fn start(&self) { log::info!("hello"); }
//!     fn stop(&self) {}
//!     fn as_any(&self) -> &dyn std::any::Any { self }
//! }
//!
//! axon_sdk::export_module!(Hello::default());
//! ```

mod context;

pub use axon_core::declare_module;
pub use context::ModuleContext;

pub mod prelude {
    //! Everything a module implementation usually needs.
    pub use crate::ModuleContext;
    pub use axon_core::event::{EventBus, HandlerFn, HandlerId};
    pub use axon_core::module::{Module, ModuleBox, ModuleHandle, ModuleLoader, UnloadOutcome};
    pub use axon_core::{KernelConfig, LoadError, RegistryContext};
    pub use std::sync::Arc;
}

/// Exports a module from a `cdylib` crate.
///
/// Emits the unmangled `Create` and `Destroy` symbols the loader resolves.
/// `$ctor` is evaluated every time a fresh instance is needed. Use it once
/// per library.
#[macro_export]
macro_rules! export_module {
    ($ctor:expr) => {
        $crate::declare_module!(
            __AXON_MODULE_SLOT,
            __axon_module_create,
            __axon_module_destroy,
            $ctor
        );

        #[export_name = "Create"]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn __axon_export_create(
            path: *const ::std::os::raw::c_char,
        ) -> *mut $crate::prelude::ModuleBox {
            __axon_module_create(path)
        }

        #[export_name = "Destroy"]
        pub unsafe extern "C" fn __axon_export_destroy() {
            __axon_module_destroy()
        }
    };
}
