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

//! Loads the workspace's `runner` module as a real shared library, so the
//! host and the module run separate copies of `axon-core`.

use axon_core::{EventBus, KernelConfig, ModuleLoader, RegistryContext, UnloadOutcome};
use axon_infra::NativePlatform;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

const RUNNER: &str = "runner";

/// `target/<profile>/`, found from this test binary's own location.
fn profile_dir() -> PathBuf {
    let exe = std::env::current_exe().expect("test binary path");
    exe.parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .expect("test binary lives in target/<profile>/deps")
}

/// The built `runner` library, building it first if this run has not.
fn runner_library() -> PathBuf {
    let profile_dir = profile_dir();
    let library = profile_dir.join(format!("{DLL_PREFIX}{RUNNER}{DLL_SUFFIX}"));
    if library.is_file() {
        return library;
    }

    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let target_dir = profile_dir.parent().expect("target directory");
    let mut build = Command::new(env!("CARGO"));
    build
        .current_dir(&workspace)
        .args(["build", "-p", RUNNER, "--target-dir"])
        .arg(target_dir);
    if profile_dir.ends_with("release") {
        build.arg("--release");
    }
    let status = build.status().expect("cargo should start");
    assert!(status.success(), "building the runner module failed: {status}");
    assert!(library.is_file(), "no library at '{}'", library.display());
    library
}

/// Lays the library out as `<root>/plugins/runner/bin/runner.<ext>` and
/// returns `<root>/bin`, the matching base directory.
fn stage(root: &Path, library: &Path) -> PathBuf {
    let bin = root.join("bin");
    let plugin_dir = root.join("plugins").join(RUNNER).join("bin");
    fs::create_dir_all(&bin).unwrap();
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::copy(library, plugin_dir.join(format!("{RUNNER}{DLL_SUFFIX}"))).unwrap();
    bin
}

#[test]
fn test_runner_library_ticks_across_the_image_boundary() {
    // --- 1. ARRANGE ---
    let root = tempfile::tempdir().unwrap();
    let base = stage(root.path(), &runner_library());
    let registry = Arc::new(RegistryContext::new(
        KernelConfig::new(base),
        Arc::new(NativePlatform::new()),
    ));
    let loader = ModuleLoader::instance(&registry);
    let bus = EventBus::<f64>::instance(&registry);

    // --- 2. ACT ---
    let handle = loader.load(RUNNER).expect("runner library should load");
    assert!(bus.exists(RUNNER), "initialize ran inside the library");

    let (tx, rx) = flume::unbounded();
    let id = bus
        .subscribe(RUNNER, move |dt: &f64| {
            let _ = tx.send(*dt);
        })
        .expect("the module created the event");
    handle.with(|module| module.start());

    let ticks: Vec<f64> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("a tick"))
        .collect();
    // The tick thread dispatches from library code; this waits on it from
    // host code.
    let removed = bus.unsubscribe(RUNNER, id);
    handle.with(|module| module.stop());

    // --- 3. ASSERT ---
    assert_eq!(ticks.len(), 3);
    assert!(ticks.iter().all(|dt| *dt >= 0.0));
    assert!(removed);
    assert_eq!(bus.handler_count(RUNNER), 0);

    assert_eq!(loader.unload(RUNNER), UnloadOutcome::Released);
    assert!(handle.get().is_none());
    assert!(!bus.exists(RUNNER), "release destroyed the event");
    assert!(loader.loaded_modules().is_empty());

    bus.request_delete();
    loader.request_delete();
    assert_eq!(registry.bus_ref_count::<f64>(), 0);
    assert_eq!(registry.loader_ref_count(), 0);
}

#[test]
fn test_reloading_the_library_builds_a_fresh_instance() {
    // --- 1. ARRANGE ---
    let root = tempfile::tempdir().unwrap();
    let base = stage(root.path(), &runner_library());
    let registry = Arc::new(RegistryContext::new(
        KernelConfig::new(base),
        Arc::new(NativePlatform::new()),
    ));
    let loader = ModuleLoader::instance(&registry);

    // --- 2. ACT ---
    let first = loader.load(RUNNER).unwrap();
    let again = loader.load(RUNNER).unwrap();
    let after_one_unload = loader.unload(RUNNER);
    let after_two_unloads = loader.unload(RUNNER);
    let second = loader.load(RUNNER).unwrap();

    // --- 3. ASSERT ---
    assert!(axon_core::ModuleHandle::ptr_eq(&first, &again));
    assert_eq!(
        after_one_unload,
        UnloadOutcome::Decremented { remaining: 1 }
    );
    assert_eq!(after_two_unloads, UnloadOutcome::Released);
    assert!(first.get().is_none());
    assert!(!axon_core::ModuleHandle::ptr_eq(&first, &second));
    assert!(second.get().is_some());

    assert_eq!(loader.unload(RUNNER), UnloadOutcome::Released);
    loader.request_delete();
}
