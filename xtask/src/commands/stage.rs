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

//! Lays built modules out the way the loader resolves them:
//! `target/plugins/<name>/bin/<name>.<ext>`, next to `target/<profile>/`
//! where `axon-runtime` lives.

use crate::helpers::*;
use anyhow::{Context, Result};
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};

/// Workspace module crates staged by default.
pub const MODULES: [&str; 2] = ["runner", "greeter"];

const STARTUP_FILE: &str = "startup.toml";

fn workspace_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask is expected to live inside the workspace")
}

/// The library cargo writes for module `name`.
pub fn built_artifact(profile_dir: &Path, name: &str) -> PathBuf {
    profile_dir.join(format!("{DLL_PREFIX}{name}{DLL_SUFFIX}"))
}

/// Where the loader looks for module `name` when the runtime lives in `target/<profile>/`.
pub fn staged_artifact(target_dir: &Path, name: &str) -> PathBuf {
    target_dir
        .join("plugins")
        .join(name)
        .join("bin")
        .join(format!("{name}{DLL_SUFFIX}"))
}

pub fn stage(release: bool) -> Result<()> {
    print_task_start("Staging Modules", PACKAGE, CYAN);
    let profile = if release { "release" } else { "debug" };
    print_info(&format!(
        "Building axon-runtime and {} module(s) ({profile})",
        MODULES.len()
    ));

    let mut args = vec!["build", "-p", "axon-runtime"];
    for name in MODULES {
        args.extend(["-p", name]);
    }
    if release {
        args.push("--release");
    }
    execute_command("cargo", &args, "Module build")?;

    let root = workspace_root()?;
    let target = root.join("target");
    let profile_dir = target.join(profile);
    for name in MODULES {
        let from = built_artifact(&profile_dir, name);
        let to = staged_artifact(&target, name);
        if let Some(dir) = to.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create '{}'", dir.display()))?;
        }
        fs::copy(&from, &to).with_context(|| {
            format!("Failed to copy '{}' to '{}'", from.display(), to.display())
        })?;
        print_success(&format!("{name} -> {}", to.display()));
    }

    let startup = root.join(STARTUP_FILE);
    if startup.is_file() {
        fs::copy(&startup, target.join(STARTUP_FILE))
            .with_context(|| format!("Failed to copy '{}'", startup.display()))?;
        print_success(&format!("{STARTUP_FILE} -> {}", target.display()));
    }

    println!(
        "{}{}Run with:{} target/{profile}/axon-runtime",
        BOLD, GREEN, RESET
    );
    Ok(())
}
