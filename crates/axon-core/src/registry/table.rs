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

//! A keyed store of values with independent reference counts.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Values and reference counts sharing one key space.
///
/// Counts and values are tracked separately: `add` on an absent key starts
/// its count at 1, `subtract` on an absent key does nothing, and nothing is
/// ever evicted automatically. Whoever drives a count to zero is expected to
/// [`erase`](RefTable::erase) the entry.
#[derive(Debug)]
pub struct RefTable<K, V> {
    values: HashMap<K, V>,
    counts: HashMap<K, usize>,
}

impl<K: Eq + Hash, V> RefTable<K, V> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.get(key)
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.contains_key(key)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    /// The count is left untouched.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.values.insert(key, value)
    }

    /// Current count of `key`, 0 if absent.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Increments the count of `key` (starting at 1) and returns the new count.
    pub fn add(&mut self, key: K) -> usize {
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrements the count of `key` and returns what remains.
    ///
    /// Returns `None` without touching anything if `key` has no count.
    pub fn subtract<Q>(&mut self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let count = self.counts.get_mut(key)?;
        *count = count.saturating_sub(1);
        Some(*count)
    }

    /// Removes both the value and the count of `key`, returning the value.
    pub fn erase<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.counts.remove(key);
        self.values.remove(key)
    }

    /// Keys that currently hold a value.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.values.keys()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no value is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for RefTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
