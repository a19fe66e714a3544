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

//! # Axon Core
//!
//! The in-process microkernel: independently compiled modules are loaded,
//! unloaded, and made to talk to each other at runtime without static
//! linkage between them.
//!
//! Three pieces carry the design:
//!
//! - [`RegistryContext`]: the single shared store behind everything else. It is
//!   constructed once by the process entry point and passed by reference to the
//!   loader, to every event bus, and to every module's `initialize`.
//! - [`ModuleLoader`]: opens module libraries through a
//!   [`PlatformLoader`](platform::PlatformLoader), calls their `Create` factory,
//!   and reference-counts repeated load requests.
//! - [`EventBus<T>`](event::EventBus): one publish/subscribe bus per payload
//!   type, holding named events that modules create, subscribe to, and dispatch.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod module;
pub mod platform;
pub mod registry;
mod sync;

pub use config::KernelConfig;
pub use error::{LoadError, PlatformError};
pub use event::{EventBus, HandlerFn, HandlerId, PendingDispatch};
pub use module::{Module, ModuleHandle, ModuleLoader, UnloadOutcome};
pub use registry::RegistryContext;
