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

//! Kernel-wide configuration shared through the registry.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration of the kernel, stored once in the
/// [`RegistryContext`](crate::RegistryContext).
///
/// Modules resolve against `base_directory` using the layout
/// `<base>/../<plugins_directory>/<name>/<binary_directory>/<name>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Root all module paths are resolved against, usually the directory of
    /// the host executable.
    pub base_directory: PathBuf,
    /// Name of the directory, sibling of `base_directory`, holding one
    /// sub-directory per module.
    pub plugins_directory: String,
    /// Name of the per-module directory holding the compiled library.
    pub binary_directory: String,
}

impl KernelConfig {
    /// Creates a configuration rooted at `base_directory` with the default layout.
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            ..Self::default()
        }
    }

    /// Directory that holds one sub-directory per module.
    pub fn plugins_root(&self) -> PathBuf {
        self.base_directory
            .join("..")
            .join(&self.plugins_directory)
    }

    /// Resolves the library path of module `name` for a platform whose shared
    /// libraries use `extension` (`so`, `dll`, `dylib`).
    pub fn module_path(&self, name: &str, extension: &str) -> PathBuf {
        self.plugins_root()
            .join(name)
            .join(&self.binary_directory)
            .join(format!("{name}.{extension}"))
    }

    /// The base directory as a path.
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            plugins_directory: "plugins".to_string(),
            binary_directory: "bin".to_string(),
        }
    }
}
