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

//! Defines the error types reported by the loader and its platform backends.

use std::path::PathBuf;
use thiserror::Error;

/// An error raised by a [`PlatformLoader`](crate::platform::PlatformLoader) backend.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The library at `path` could not be opened.
    #[error("could not open library '{}': {reason}", path.display())]
    Open {
        /// The path that was requested.
        path: PathBuf,
        /// Backend-specific description of the failure.
        reason: String,
    },
    /// The library is open but does not export the requested symbol.
    #[error("symbol '{symbol}' not found in '{}'", path.display())]
    MissingSymbol {
        /// The library that was searched.
        path: PathBuf,
        /// The symbol name.
        symbol: String,
    },
    /// The backend failed to release the library handle.
    #[error("could not close library '{}': {reason}", path.display())]
    Close {
        /// The library being closed.
        path: PathBuf,
        /// Backend-specific description of the failure.
        reason: String,
    },
}

/// Why a call to [`ModuleLoader::load`](crate::ModuleLoader::load) failed.
///
/// Every variant is recovered locally: any partially opened library handle
/// has already been closed when the error is returned. Whether the failure is
/// fatal is the caller's decision.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The module's library could not be opened.
    #[error("could not load module '{name}': {source}")]
    Open {
        /// The requested module name.
        name: String,
        /// The backend failure.
        #[source]
        source: PlatformError,
    },
    /// The resolved library path cannot be handed to `Create` because it
    /// contains a NUL byte.
    #[error("module '{name}' resolves to a path with a NUL byte: '{}'", path.display())]
    InvalidPath {
        /// The requested module name.
        name: String,
        /// The resolved library path.
        path: PathBuf,
    },
    /// The library does not export the `Create` factory.
    #[error("module '{name}' has no \"Create\" entry point in '{}'", path.display())]
    MissingCreate {
        /// The requested module name.
        name: String,
        /// The resolved library path.
        path: PathBuf,
    },
    /// `Create` ran but returned a null instance.
    #[error("\"Create\" returned no instance for module '{name}' ('{}')", path.display())]
    NullInstance {
        /// The requested module name.
        name: String,
        /// The resolved library path.
        path: PathBuf,
    },
}

impl LoadError {
    /// The module name the failed request was for.
    pub fn module_name(&self) -> &str {
        match self {
            LoadError::Open { name, .. }
            | LoadError::InvalidPath { name, .. }
            | LoadError::MissingCreate { name, .. }
            | LoadError::NullInstance { name, .. } => name,
        }
    }
}
