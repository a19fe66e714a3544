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

//! An in-process [`PlatformLoader`] for modules linked into the host binary.

use super::{CreateFn, DestroyFn, LibraryHandle, PlatformLoader};
use crate::error::PlatformError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The entry points a statically linked module exposes in place of exported
/// library symbols.
///
/// Either symbol may be absent, which behaves like a library that does not
/// export it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSymbols {
    /// The `Create` factory.
    pub create: Option<CreateFn>,
    /// The `Destroy` function.
    pub destroy: Option<DestroyFn>,
}

impl StaticSymbols {
    /// A complete symbol pair.
    pub fn new(create: CreateFn, destroy: DestroyFn) -> Self {
        Self {
            create: Some(create),
            destroy: Some(destroy),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Resolves module paths against a table of in-process symbol pairs.
///
/// The module is identified by the file stem of the requested path, so
/// `.../plugins/runner/bin/runner.so` opens the module registered as
/// `"runner"`.
#[derive(Debug, Default)]
pub struct StaticPlatform {
    modules: RwLock<HashMap<String, StaticSymbols>>,
    counters: Arc<Counters>,
}

impl StaticPlatform {
    /// Creates a platform with no registered modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the symbols of module `name`.
    pub fn register(&self, name: impl Into<String>, symbols: StaticSymbols) {
        let name = name.into();
        log::debug!("StaticPlatform: registered module '{name}'");
        self.modules.write().insert(name, symbols);
    }

    /// Forgets module `name`. Returns `true` if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.modules.write().remove(name).is_some()
    }

    /// Number of successful `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Number of library handles closed so far.
    pub fn close_count(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

impl PlatformLoader for StaticPlatform {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, PlatformError> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| PlatformError::Open {
                path: path.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?;

        let symbols = self
            .modules
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| PlatformError::Open {
                path: path.to_path_buf(),
                reason: format!("no static module named '{name}'"),
            })?;

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticLibrary {
            path: path.to_path_buf(),
            symbols,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }
}

struct StaticLibrary {
    path: PathBuf,
    symbols: StaticSymbols,
    counters: Arc<Counters>,
}

impl StaticLibrary {
    fn missing(&self, symbol: &str) -> PlatformError {
        PlatformError::MissingSymbol {
            path: self.path.clone(),
            symbol: symbol.to_string(),
        }
    }
}

impl LibraryHandle for StaticLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_symbol(&self, symbol: &str) -> Result<CreateFn, PlatformError> {
        self.symbols.create.ok_or_else(|| self.missing(symbol))
    }

    fn destroy_symbol(&self, symbol: &str) -> Result<DestroyFn, PlatformError> {
        self.symbols.destroy.ok_or_else(|| self.missing(symbol))
    }

    fn close(self: Box<Self>) -> Result<(), PlatformError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleBox;
    use std::os::raw::c_char;

    unsafe extern "C" fn null_create(_path: *const c_char) -> *mut ModuleBox {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn noop_destroy() {}

    #[test]
    fn open_resolves_module_by_file_stem() {
        let platform = StaticPlatform::new();
        platform.register("runner", StaticSymbols::new(null_create, noop_destroy));

        let library = platform
            .open(Path::new("/app/../plugins/runner/bin/runner.so"))
            .expect("registered module should open");
        assert!(library.create_symbol("Create").is_ok());
        assert!(library.destroy_symbol("Destroy").is_ok());
        assert_eq!(platform.open_count(), 1);

        library.close().unwrap();
        assert_eq!(platform.close_count(), 1);
    }

    #[test]
    fn open_unknown_module_fails() {
        let platform = StaticPlatform::new();
        let result = platform.open(Path::new("/plugins/missing/bin/missing.so"));
        assert!(matches!(result, Err(PlatformError::Open { .. })));
        assert_eq!(platform.open_count(), 0);
    }

    #[test]
    fn absent_symbol_is_reported_as_missing() {
        let platform = StaticPlatform::new();
        platform.register(
            "half",
            StaticSymbols {
                create: Some(null_create),
                destroy: None,
            },
        );
        let library = platform.open(Path::new("half.so")).unwrap();
        match library.destroy_symbol("Destroy") {
            Err(PlatformError::MissingSymbol { symbol, .. }) => assert_eq!(symbol, "Destroy"),
            other => panic!("expected a missing symbol, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unregister_removes_module() {
        let platform = StaticPlatform::new();
        platform.register("gone", StaticSymbols::new(null_create, noop_destroy));
        assert!(platform.unregister("gone"));
        assert!(!platform.unregister("gone"));
        assert!(platform.open(Path::new("gone.so")).is_err());
    }
}
