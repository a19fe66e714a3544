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

//! Typed publish/subscribe between modules.
//!
//! Modules never call each other directly. One module creates a named event
//! on the [`EventBus`] of some payload type, others subscribe handlers to it,
//! and anyone holding the bus can dispatch on it:
//!
//! - [`EventBus::call`] runs the handlers in order on the calling thread;
//! - [`EventBus::call_async_blocking`] runs them in order on a helper thread;
//! - [`EventBus::call_async`] runs each on its own thread and joins them all.

mod bus;
mod handler;
mod named;

pub use bus::{EventBus, PendingDispatch};
pub use handler::{Handler, HandlerFn, HandlerId};
pub use named::NamedEvent;
