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

//! Startup files: which modules to load, in which order.
//!
//! Three formats are accepted, chosen by extension:
//!
//! - `.toml` (also the fallback for unknown extensions) and `.json`, with the
//!   fields `modules`, `include` and `base_directory`;
//! - `.cfg`, the line-based `key=value` format with `load_plugins=a,b` and
//!   `config_dirs=dir1,dir2` (each directory contributing
//!   `<dir>/startup/startup.cfg`).
//!
//! Included files are expanded depth-first at their position: in TOML/JSON all
//! includes come before the file's own modules, in `.cfg` files lines are
//! processed top to bottom. Relative paths resolve against the directory of
//! the file that names them.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Startup file names probed, in order, when none is given on the command line.
const DEFAULT_NAMES: [&str; 3] = ["startup.toml", "startup.json", "startup.cfg"];

/// Why a startup file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read startup file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse startup file '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("startup file '{}' is included again from '{}'", path.display(), via.display())]
    Include { path: PathBuf, via: PathBuf },
}

/// The resolved contents of a startup file and everything it includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Startup {
    /// Module names in load order. A name may appear more than once.
    pub modules: Vec<String>,
    /// Base directory override, already resolved against its file.
    pub base_directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StartupFile {
    modules: Vec<String>,
    include: Vec<PathBuf>,
    base_directory: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum Entry {
    Module(String),
    Include(PathBuf),
}

#[derive(Debug, Default)]
struct Parsed {
    entries: Vec<Entry>,
    base_directory: Option<PathBuf>,
}

impl From<StartupFile> for Parsed {
    fn from(file: StartupFile) -> Self {
        let entries = file
            .include
            .into_iter()
            .map(Entry::Include)
            .chain(file.modules.into_iter().map(Entry::Module))
            .collect();
        Self {
            entries,
            base_directory: file.base_directory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
    Cfg,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            Some("cfg") => Format::Cfg,
            _ => Format::Toml,
        }
    }
}

/// The startup file used when none is given: the first of `startup.toml`,
/// `startup.json`, `startup.cfg` that exists next to `base_directory`'s parent.
pub fn default_path(base_directory: &Path) -> PathBuf {
    let root = base_directory.join("..");
    DEFAULT_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| root.join(DEFAULT_NAMES[0]))
}

/// Reads `path` and every file it includes.
pub fn load(path: &Path) -> Result<Startup, ConfigError> {
    let mut startup = Startup::default();
    let mut chain = Vec::new();
    load_into(path, &mut startup, &mut chain)?;
    log::info!(
        "Startup file '{}' lists {} module(s): {:?}",
        path.display(),
        startup.modules.len(),
        startup.modules
    );
    Ok(startup)
}

fn load_into(
    path: &Path,
    startup: &mut Startup,
    chain: &mut Vec<PathBuf>,
) -> Result<(), ConfigError> {
    let canonical = fs::canonicalize(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if chain.contains(&canonical) {
        return Err(ConfigError::Include {
            via: chain.last().cloned().unwrap_or_default(),
            path: canonical,
        });
    }

    let text = fs::read_to_string(&canonical).map_err(|source| ConfigError::Io {
        path: canonical.clone(),
        source,
    })?;
    let parsed = parse(&text, Format::of(&canonical)).map_err(|reason| ConfigError::Parse {
        path: canonical.clone(),
        reason,
    })?;
    log::debug!("Parsed startup file '{}'", canonical.display());

    let dir = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if startup.base_directory.is_none() {
        startup.base_directory = parsed.base_directory.map(|base| dir.join(base));
    }

    chain.push(canonical);
    for entry in parsed.entries {
        match entry {
            Entry::Module(name) => startup.modules.push(name),
            Entry::Include(include) => load_into(&dir.join(include), startup, chain)?,
        }
    }
    chain.pop();
    Ok(())
}

fn parse(text: &str, format: Format) -> Result<Parsed, String> {
    match format {
        Format::Toml => toml::from_str::<StartupFile>(text)
            .map(Parsed::from)
            .map_err(|err| err.to_string()),
        Format::Json => serde_json::from_str::<StartupFile>(text)
            .map(Parsed::from)
            .map_err(|err| err.to_string()),
        Format::Cfg => Ok(parse_cfg(text)),
    }
}

fn parse_cfg(text: &str) -> Parsed {
    let mut entries = Vec::new();
    for raw in text.lines() {
        let line: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("Ignoring startup line without '=': {raw}");
            continue;
        };
        let items = value.split(',').filter(|item| !item.is_empty());
        match key {
            "load_plugins" => entries.extend(items.map(|name| Entry::Module(name.to_string()))),
            "config_dirs" => entries.extend(
                items.map(|dir| Entry::Include(Path::new(dir).join("startup").join("startup.cfg"))),
            ),
            other => log::warn!("Ignoring unknown startup key '{other}'"),
        }
    }
    Parsed {
        entries,
        base_directory: None,
    }
}
