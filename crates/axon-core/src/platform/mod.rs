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

//! Provides abstractions over the platform's dynamic library facilities.
//!
//! The loader never talks to `dlopen`/`LoadLibrary` directly. It asks a
//! [`PlatformLoader`] to open a path and then resolves the two C-ABI entry
//! points every module library exports:
//!
//! - `Create(path) -> *mut ModuleBox`, idempotent within one library image.
//! - `Destroy()`, which drops the instance `Create` produced.
//!
//! Concrete backends live elsewhere (the native one in `axon-infra`); the
//! in-process [`StaticPlatform`] lives here so statically linked modules and
//! tests travel through the exact same loader path.

mod static_library;

pub use static_library::{StaticPlatform, StaticSymbols};

use crate::error::PlatformError;
use crate::module::ModuleBox;
use std::os::raw::c_char;
use std::path::Path;

/// Name of the factory symbol every module library exports.
pub const CREATE_SYMBOL: &str = "Create";

/// Name of the destructor symbol every module library exports.
pub const DESTROY_SYMBOL: &str = "Destroy";

/// Signature of a module library's `Create` entry point.
///
/// Receives the resolved library path as a NUL-terminated string and returns
/// a pointer to the library-owned instance, or null on failure.
#[allow(improper_ctypes_definitions)]
pub type CreateFn = unsafe extern "C" fn(path: *const c_char) -> *mut ModuleBox;

/// Signature of a module library's `Destroy` entry point.
pub type DestroyFn = unsafe extern "C" fn();

/// Opens module libraries for the [`ModuleLoader`](crate::ModuleLoader).
pub trait PlatformLoader: Send + Sync {
    /// Opens the library at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, PlatformError>;

    /// File extension of shared libraries on this platform, without the dot.
    fn extension(&self) -> &str;
}

/// An open module library.
///
/// Function pointers resolved from a handle stay valid until the handle is
/// closed; the loader never calls them after that point.
pub trait LibraryHandle: Send + Sync {
    /// The path the library was opened from.
    fn path(&self) -> &Path;

    /// Resolves a `Create`-shaped symbol.
    fn create_symbol(&self, symbol: &str) -> Result<CreateFn, PlatformError>;

    /// Resolves a `Destroy`-shaped symbol.
    fn destroy_symbol(&self, symbol: &str) -> Result<DestroyFn, PlatformError>;

    /// Releases the library.
    fn close(self: Box<Self>) -> Result<(), PlatformError>;
}
