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

use axon_core::platform::{StaticPlatform, StaticSymbols};
use axon_core::{
    declare_module, KernelConfig, Module, ModuleHandle, ModuleLoader, RegistryContext,
    UnloadOutcome,
};
use parking_lot::Mutex;
use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn kernel() -> (Arc<StaticPlatform>, Arc<RegistryContext>, Arc<ModuleLoader>) {
    let platform = Arc::new(StaticPlatform::new());
    let registry = Arc::new(RegistryContext::new(
        KernelConfig::new("/opt/axon/bin"),
        platform.clone(),
    ));
    let loader = ModuleLoader::instance(&registry);
    (platform, registry, loader)
}

// --- "runner": records every lifecycle step in order ---

static RUNNER_JOURNAL: Mutex<Vec<&'static str>> = parking_lot::const_mutex(Vec::new());

#[derive(Default)]
struct Runner {
    started: AtomicUsize,
}

impl Module for Runner {
    fn initialize(&self, _registry: &Arc<RegistryContext>) {
        RUNNER_JOURNAL.lock().push("initialize");
    }
    fn release(&self) {
        RUNNER_JOURNAL.lock().push("release");
    }
    fn start(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn stop(&self) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        RUNNER_JOURNAL.lock().push("destroy");
    }
}

declare_module!(RUNNER, runner_create, runner_destroy, Runner::default());

#[test]
fn test_runner_is_refcounted_and_torn_down_in_order() {
    // --- 1. ARRANGE ---
    let (platform, registry, loader) = kernel();
    platform.register("runner", StaticSymbols::new(runner_create, runner_destroy));

    // --- 2. ACT ---
    let first = loader.load("runner").expect("runner should load");
    let second = loader.load("runner").expect("runner should load again");

    // --- 3. ASSERT ---
    assert!(ModuleHandle::ptr_eq(&first, &second), "Both loads share one instance");
    assert_eq!(loader.ref_count("runner"), 2);
    assert_eq!(platform.open_count(), 1, "A resident module is never reopened");
    assert_eq!(*RUNNER_JOURNAL.lock(), vec!["initialize"]);

    assert_eq!(
        loader.unload("runner"),
        UnloadOutcome::Decremented { remaining: 1 }
    );
    assert!(loader.is_loaded("runner"));
    first.get().expect("runner is still resident").start();
    let started = second
        .with(|module| {
            module
                .as_any()
                .downcast_ref::<Runner>()
                .map(|runner| runner.started.load(Ordering::SeqCst))
        })
        .flatten();
    assert_eq!(started, Some(1));

    assert_eq!(loader.unload("runner"), UnloadOutcome::Released);
    assert_eq!(
        *RUNNER_JOURNAL.lock(),
        vec!["initialize", "release", "destroy"],
        "release runs before Destroy, each exactly once"
    );
    assert!(!loader.is_loaded("runner"));
    assert_eq!(registry.module_ref_count("runner"), 0);
    assert!(first.get().is_none() && second.get().is_none());
    assert_eq!(platform.close_count(), 1);

    assert_eq!(loader.unload("runner"), UnloadOutcome::NotLoaded);
    loader.request_delete();
}

// --- "phoenix": counts constructions ---

static PHOENIX_BUILT: AtomicUsize = AtomicUsize::new(0);

struct Phoenix;

impl Phoenix {
    fn new() -> Self {
        PHOENIX_BUILT.fetch_add(1, Ordering::SeqCst);
        Phoenix
    }
}

impl Module for Phoenix {
    fn initialize(&self, _registry: &Arc<RegistryContext>) {}
    fn release(&self) {}
    fn start(&self) {}
    fn stop(&self) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

declare_module!(PHOENIX, phoenix_create, phoenix_destroy, Phoenix::new());

#[test]
fn test_load_after_release_creates_fresh_instance() {
    // --- 1. ARRANGE ---
    let (platform, _registry, loader) = kernel();
    platform.register("phoenix", StaticSymbols::new(phoenix_create, phoenix_destroy));
    let old = loader.load("phoenix").unwrap();
    assert_eq!(loader.unload("phoenix"), UnloadOutcome::Released);

    // --- 2. ACT ---
    let new = loader.load("phoenix").unwrap();

    // --- 3. ASSERT ---
    assert_eq!(PHOENIX_BUILT.load(Ordering::SeqCst), 2);
    assert!(!ModuleHandle::ptr_eq(&old, &new));
    assert!(old.get().is_none(), "Stale handle must not reach the new instance");
    assert!(new.is_resident());
    assert_eq!(platform.open_count(), 2);

    loader.unload("phoenix");
    loader.request_delete();
}

// --- "parent" loads "child" from its own initialize, on the same thread ---

static CHILD_ALIVE: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Child;

impl Module for Child {
    fn initialize(&self, _registry: &Arc<RegistryContext>) {
        CHILD_ALIVE.fetch_add(1, Ordering::SeqCst);
    }
    fn release(&self) {
        CHILD_ALIVE.fetch_sub(1, Ordering::SeqCst);
    }
    fn start(&self) {}
    fn stop(&self) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Parent {
    loader: Mutex<Option<Arc<ModuleLoader>>>,
    base: Mutex<Option<PathBuf>>,
}

impl Module for Parent {
    fn initialize(&self, registry: &Arc<RegistryContext>) {
        let loader = ModuleLoader::instance(registry);
        loader.load("child").expect("child should load re-entrantly");
        *self.base.lock() = Some(registry.base_directory().to_path_buf());
        *self.loader.lock() = Some(loader);
    }
    fn release(&self) {
        if let Some(loader) = self.loader.lock().take() {
            loader.unload("child");
            loader.request_delete();
        }
    }
    fn start(&self) {}
    fn stop(&self) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

declare_module!(CHILD, child_create, child_destroy, Child);
declare_module!(PARENT, parent_create, parent_destroy, Parent::default());

#[test]
fn test_module_may_reenter_loader_from_initialize_and_release() {
    // --- 1. ARRANGE ---
    let (platform, registry, loader) = kernel();
    platform.register("child", StaticSymbols::new(child_create, child_destroy));
    platform.register("parent", StaticSymbols::new(parent_create, parent_destroy));

    // --- 2. ACT ---
    let parent = loader.load("parent").expect("parent should load");

    // --- 3. ASSERT ---
    assert_eq!(loader.loaded_modules(), vec!["child", "parent"]);
    assert_eq!(CHILD_ALIVE.load(Ordering::SeqCst), 1);
    assert_eq!(registry.loader_ref_count(), 2);
    let base = parent
        .with(|module| {
            module
                .as_any()
                .downcast_ref::<Parent>()
                .and_then(|parent| parent.base.lock().clone())
        })
        .flatten();
    assert_eq!(base, Some(PathBuf::from("/opt/axon/bin")));

    assert_eq!(loader.unload("parent"), UnloadOutcome::Released);
    assert!(loader.loaded_modules().is_empty());
    assert_eq!(CHILD_ALIVE.load(Ordering::SeqCst), 0);
    assert_eq!(registry.loader_ref_count(), 1);

    loader.request_delete();
    assert_eq!(registry.loader_ref_count(), 0);
}

// --- "orphan": exports Create but no Destroy ---

#[derive(Default)]
struct Orphan;

impl Module for Orphan {
    fn initialize(&self, _registry: &Arc<RegistryContext>) {}
    fn release(&self) {}
    fn start(&self) {}
    fn stop(&self) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

declare_module!(ORPHAN, orphan_create, orphan_destroy, Orphan);

#[test]
fn test_missing_destroy_still_closes_library() {
    // --- 1. ARRANGE ---
    let (platform, _registry, loader) = kernel();
    platform.register(
        "orphan",
        StaticSymbols {
            create: Some(orphan_create),
            destroy: None,
        },
    );
    let handle = loader.load("orphan").unwrap();

    // --- 2. ACT ---
    let outcome = loader.unload("orphan");

    // --- 3. ASSERT ---
    assert_eq!(outcome, UnloadOutcome::Released);
    assert!(!loader.is_loaded("orphan"));
    assert!(handle.get().is_none());
    assert_eq!(platform.close_count(), 1);
    // The instance was never destroyed through the library; do it here.
    assert!(ORPHAN.is_live());
    unsafe { orphan_destroy() };
    loader.request_delete();
}
