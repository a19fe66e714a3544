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

//! `axon-runtime`: loads the modules listed in a startup file, starts them,
//! waits, then tears everything down in reverse.

mod host;
mod startup;

use anyhow::{Context, Result};
use axon_core::{KernelConfig, RegistryContext};
use axon_infra::NativePlatform;
use clap::Parser;
use host::Host;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Startup file (.toml, .json or .cfg). Defaults to `startup.*` next to the base directory.
    #[arg(short, long)]
    startup: Option<PathBuf>,

    /// Directory module paths are resolved against. Defaults to the executable's directory.
    #[arg(short, long)]
    base_dir: Option<PathBuf>,

    /// Shut down after this many seconds instead of waiting for Enter
    #[arg(long, value_name = "SECONDS")]
    run_for: Option<f64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or(cli.log_level.as_str())).init();

    let exe_dir = executable_directory()?;
    let plan = read_plan(&cli, &exe_dir)?;
    let base_directory = cli
        .base_dir
        .clone()
        .or(plan.base_directory)
        .unwrap_or(exe_dir);

    let registry = Arc::new(RegistryContext::new(
        KernelConfig::new(base_directory),
        Arc::new(NativePlatform::new()),
    ));
    let mut host = Host::new(&registry);

    let loaded = host.load_all(plan.modules.as_slice());
    log::info!("{loaded} of {} module(s) loaded", plan.modules.len());
    for handle in host.loaded() {
        log::debug!("  {} <- '{}'", handle.name(), handle.path().display());
    }
    host.start_all();

    wait(cli.run_for)?;

    host.stop_all();
    host.shutdown();
    log::info!("Shut down cleanly");
    Ok(())
}

fn executable_directory() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("Executable '{}' has no parent directory", exe.display()))
}

/// An explicit `--startup` must exist; a missing default file means no modules.
fn read_plan(cli: &Cli, exe_dir: &Path) -> Result<startup::Startup> {
    if let Some(path) = &cli.startup {
        return startup::load(path)
            .with_context(|| format!("Failed to read startup file '{}'", path.display()));
    }

    let path = startup::default_path(cli.base_dir.as_deref().unwrap_or(exe_dir));
    if !path.is_file() {
        log::warn!(
            "No startup file at '{}'; running without modules",
            path.display()
        );
        return Ok(startup::Startup::default());
    }
    startup::load(&path).with_context(|| format!("Failed to read startup file '{}'", path.display()))
}

/// Blocks until Enter (or end of input) is read, or until `run_for` seconds pass.
fn wait(run_for: Option<f64>) -> Result<()> {
    if let Some(seconds) = run_for {
        let limit = Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Invalid --run-for value {seconds}"))?;
        log::info!("Running for {seconds} s");
        thread::sleep(limit);
        return Ok(());
    }

    let (tx, rx) = flume::bounded::<()>(1);
    thread::Builder::new()
        .name("axon-stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            if let Err(err) = io::stdin().lock().read_line(&mut line) {
                log::warn!("Failed to read stdin: {err}");
            }
            let _ = tx.send(());
        })
        .context("Failed to spawn the stdin watcher")?;

    log::info!("Press Enter to shut down");
    // A disconnected sender means the watcher ended; either way it is time to stop.
    let _ = rx.recv();
    Ok(())
}
