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

//! `libloading` implementation of the [`PlatformLoader`] trait.

use axon_core::platform::{CreateFn, DestroyFn, LibraryHandle, PlatformLoader};
use axon_core::PlatformError;
use libloading::Library;
use std::path::{Path, PathBuf};

/// Opens module libraries with the operating system's dynamic loader
/// (`dlopen` on Unix, `LoadLibrary` on Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlatform;

impl NativePlatform {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl PlatformLoader for NativePlatform {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, PlatformError> {
        // SAFETY: opening a library runs its initialisers. Module libraries are
        // trusted code built against the same `axon-core`.
        let library = unsafe { Library::new(path) }.map_err(|err| PlatformError::Open {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        log::debug!("Opened native library '{}'", path.display());
        Ok(Box::new(NativeLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }

    fn extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }
}

struct NativeLibrary {
    path: PathBuf,
    library: Library,
}

impl NativeLibrary {
    /// Resolves `name` as a value of function-pointer type `F`.
    ///
    /// # Safety
    ///
    /// The symbol must really have type `F`.
    unsafe fn symbol<F: Copy>(&self, name: &str) -> Result<F, PlatformError> {
        let symbol = self
            .library
            .get::<F>(name.as_bytes())
            .map_err(|_| PlatformError::MissingSymbol {
                path: self.path.clone(),
                symbol: name.to_string(),
            })?;
        Ok(*symbol)
    }
}

impl LibraryHandle for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_symbol(&self, symbol: &str) -> Result<CreateFn, PlatformError> {
        // SAFETY: module libraries export `Create` with the `CreateFn` signature.
        unsafe { self.symbol::<CreateFn>(symbol) }
    }

    fn destroy_symbol(&self, symbol: &str) -> Result<DestroyFn, PlatformError> {
        // SAFETY: module libraries export `Destroy` with the `DestroyFn` signature.
        unsafe { self.symbol::<DestroyFn>(symbol) }
    }

    fn close(self: Box<Self>) -> Result<(), PlatformError> {
        let NativeLibrary { path, library } = *self;
        library.close().map_err(|err| PlatformError::Close {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        log::debug!("Closed native library '{}'", path.display());
        Ok(())
    }
}
