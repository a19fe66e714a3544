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

use std::fmt;
use std::sync::Arc;

/// The callable stored for a subscription.
///
/// Anything that can be called with a payload reference qualifies: closures,
/// function items, or adapters around callables from a scripting host.
pub type HandlerFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies one subscription. Unique within a registry and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A subscribed callable and its id.
pub struct Handler<T> {
    id: HandlerId,
    func: HandlerFn<T>,
}

impl<T> Handler<T> {
    pub(crate) fn new(id: HandlerId, func: HandlerFn<T>) -> Self {
        Self { id, func }
    }

    /// The subscription id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Calls the handler with `payload`.
    pub fn invoke(&self, payload: &T) {
        (self.func)(payload)
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            func: Arc::clone(&self.func),
        }
    }
}

impl<T> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}
