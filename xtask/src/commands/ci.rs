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

use crate::commands::stage;
use crate::helpers::*;
use anyhow::Result;
use std::time::Instant;

/// One cargo invocation of the CI pipeline.
pub struct CargoTask {
    pub title: &'static str,
    pub emoji: &'static str,
    pub color: &'static str,
    pub info: &'static str,
    pub args: &'static [&'static str],
}

pub const BUILD: CargoTask = CargoTask {
    title: "Building All Crates",
    emoji: HAMMER,
    color: BLUE,
    info: "Compiling the kernel crates, the runtime and every module in debug mode",
    args: &["build", "--workspace", "--exclude", "xtask"],
};

pub const TEST: CargoTask = CargoTask {
    title: "Running All Tests",
    emoji: TEST_TUBE,
    color: GREEN,
    info: "Running unit tests, integration tests and doc tests",
    args: &["test", "--workspace"],
};

pub const CHECK_TASK: CargoTask = CargoTask {
    title: "Checking All Crates",
    emoji: MAGNIFIER,
    color: CYAN,
    info: "Checking code for errors without building executables",
    args: &["check", "--workspace"],
};

// `fmt` takes `--all`, not `--workspace`.
pub const FORMAT: CargoTask = CargoTask {
    title: "Formatting Code",
    emoji: BRUSH,
    color: MAGENTA,
    info: "Formatting code using rustfmt with default settings",
    args: &["fmt", "--all"],
};

pub const CLIPPY_TASK: CargoTask = CargoTask {
    title: "Running Clippy",
    emoji: CLIPPY,
    color: YELLOW,
    info: "Running Clippy linter with warnings as errors",
    args: &["clippy", "--workspace", "--", "-D", "warnings"],
};

pub fn run(task: &CargoTask) -> Result<()> {
    print_task_start(task.title, task.emoji, task.color);
    print_info(task.info);
    execute_command("cargo", task.args, task.title)
}

/// Build, test, check, format, clippy, then stage the debug layout.
pub fn all() -> Result<()> {
    println!("{}", BANNER);
    println!("{}{}Starting full build pipeline...{}", BOLD, CYAN, RESET);

    let start_time = Instant::now();
    let mut outcomes: Vec<(&str, bool)> = [BUILD, TEST, CHECK_TASK, FORMAT, CLIPPY_TASK]
        .iter()
        .map(|task| (task.title, run(task).is_ok()))
        .collect();
    outcomes.push(("Staging Modules", stage::stage(false).is_ok()));

    let total_tasks = outcomes.len();
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(title, _)| *title)
        .collect();

    print_boxed("PIPELINE SUMMARY");

    if failed.is_empty() {
        println!(
            "{}{} {} All {} tasks completed successfully! {}{}",
            BOLD, GREEN, CHECK, total_tasks, ROCKET, RESET
        );
    } else {
        for title in &failed {
            print_error(&format!("{title} failed"));
        }
    }
    println!(
        "{BOLD}{BLUE}Total time: {:.2}s{RESET}",
        start_time.elapsed().as_secs_f64()
    );

    if !failed.is_empty() {
        anyhow::bail!(
            "Pipeline failed with {}/{} successful tasks.",
            total_tasks - failed.len(),
            total_tasks
        );
    }
    Ok(())
}
