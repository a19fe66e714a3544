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

// Build automation and scripting tasks for the axon workspace
// Run with: cargo xtask <command>

mod commands;
mod helpers;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ci, stage};

#[derive(Parser)]
#[command(author, version, about = "Build automation for the axon workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build all crates
    Build,
    /// Run all tests
    Test,
    /// Run cargo check on all crates
    Check,
    /// Format all code
    Format,
    /// Run clippy on all crates with warnings as errors
    Clippy,
    /// Build the runtime and modules, then lay them out under target/plugins
    Stage {
        /// Stage the release profile
        #[arg(long)]
        release: bool,
    },
    /// Run every task above
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Build => ci::run(&ci::BUILD),
        Command::Test => ci::run(&ci::TEST),
        Command::Check => ci::run(&ci::CHECK_TASK),
        Command::Format => ci::run(&ci::FORMAT),
        Command::Clippy => ci::run(&ci::CLIPPY_TASK),
        Command::Stage { release } => stage::stage(release),
        Command::All => ci::all(),
    }
}
