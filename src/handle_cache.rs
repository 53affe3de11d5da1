// Copyright 2020 - present Alex Dukhno
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

//! Open-addressed, fixed-size hash table mapping shove → KVS handle, per
//! database environment. §4.2.

use crate::kvs::DbiHandle;
use crate::limits::{CACHE_SIZE, UNKNOWN};
use crate::shove::Shove;
use std::sync::Mutex;

#[derive(Clone, Copy, Default)]
struct Slot {
    shove: Shove,
    handle: DbiHandle,
}

/// Open-addressed array of size `CACHE_SIZE`; slot *i* holds `{shove,
/// handle}`. Empty slot is `shove == 0`. Every lookup and mutation is
/// guarded by an internal mutex standing in for `dbi_mutex`, regardless of
/// the caller's transaction level.
pub struct HandleCache {
    slots: Mutex<Vec<Slot>>,
}

impl Default for HandleCache {
    fn default() -> HandleCache {
        HandleCache {
            slots: Mutex::new(vec![Slot::default(); CACHE_SIZE]),
        }
    }
}

impl HandleCache {
    pub fn new() -> HandleCache {
        HandleCache::default()
    }

    /// O(1): if `hint` is in range and still holds `shove`, return its handle.
    pub fn peek(&self, shove: Shove, hint: usize) -> Option<DbiHandle> {
        if hint >= CACHE_SIZE {
            return None;
        }
        let slots = self.slots.lock().unwrap();
        let slot = slots[hint];
        if slot.shove == shove {
            Some(slot.handle)
        } else {
            None
        }
    }

    /// Probes from `shove % CACHE_SIZE`, wrapping once. Returns the handle
    /// and updates `hint` to the slot found, or to `UNKNOWN` on a miss.
    pub fn lookup(&self, shove: Shove, hint: &mut usize) -> Option<DbiHandle> {
        let slots = self.slots.lock().unwrap();
        let start = (shove % CACHE_SIZE as u64) as usize;
        for step in 0..CACHE_SIZE {
            let i = (start + step) % CACHE_SIZE;
            let slot = slots[i];
            if slot.shove == shove {
                *hint = i;
                return Some(slot.handle);
            }
            if slot.shove == 0 {
                break;
            }
        }
        *hint = UNKNOWN;
        None
    }

    /// Installs `{shove, handle}` in the first empty slot found by probing
    /// from `shove % CACHE_SIZE`. Returns the slot index, or `UNKNOWN` if the
    /// cache is full — a soft overflow signal, not an error.
    pub fn update(&self, shove: Shove, handle: DbiHandle) -> usize {
        let mut slots = self.slots.lock().unwrap();
        let start = (shove % CACHE_SIZE as u64) as usize;
        for step in 0..CACHE_SIZE {
            let i = (start + step) % CACHE_SIZE;
            if slots[i].shove == 0 {
                slots[i] = Slot { shove, handle };
                return i;
            }
        }
        UNKNOWN
    }

    /// Symmetric to `lookup`: clears the slot holding `shove` and returns its
    /// previous handle, or `None` if not present.
    pub fn remove(&self, shove: Shove, hint: Option<usize>) -> Option<DbiHandle> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(hint) = hint {
            if hint < CACHE_SIZE && slots[hint].shove == shove {
                let handle = slots[hint].handle;
                slots[hint] = Slot::default();
                return Some(handle);
            }
        }
        let start = (shove % CACHE_SIZE as u64) as usize;
        for step in 0..CACHE_SIZE {
            let i = (start + step) % CACHE_SIZE;
            if slots[i].shove == shove {
                let handle = slots[i].handle;
                slots[i] = Slot::default();
                return Some(handle);
            }
            if slots[i].shove == 0 {
                return None;
            }
        }
        None
    }

    /// The double-checked-locking open path of §4.2: `peek` without holding
    /// the lock across `open_fn`; on a stale hint, re-`lookup` (which takes
    /// the lock), and if still missing, call `open_fn` and `update`.
    pub fn open_or_insert(
        &self,
        shove: Shove,
        hint: usize,
        open_fn: impl FnOnce() -> crate::error::Result<DbiHandle>,
    ) -> crate::error::Result<(DbiHandle, usize)> {
        if let Some(handle) = self.peek(shove, hint) {
            return Ok((handle, hint));
        }
        let mut fresh_hint = hint;
        if let Some(handle) = self.lookup(shove, &mut fresh_hint) {
            return Ok((handle, fresh_hint));
        }
        let handle = open_fn()?;
        let installed = self.update(shove, handle);
        Ok((handle, installed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_lookup_returns_installed_handle_and_hint() {
        let cache = HandleCache::new();
        let shove: Shove = 0xABCD_1234;
        let index = cache.update(shove, 77);
        assert_ne!(index, UNKNOWN);

        let mut hint = UNKNOWN;
        assert_eq!(cache.lookup(shove, &mut hint), Some(77));
        assert_eq!(hint, index);
        assert_eq!(cache.peek(shove, hint), Some(77));
    }

    #[test]
    fn peek_with_stale_hint_misses() {
        let cache = HandleCache::new();
        let shove: Shove = 0xABCD_1234;
        let installed = cache.update(shove, 77);
        let stale_hint = (installed + 1) % CACHE_SIZE;
        assert_eq!(cache.peek(shove, stale_hint), None);
    }

    #[test]
    fn remove_clears_the_slot() {
        let cache = HandleCache::new();
        let shove: Shove = 55;
        let index = cache.update(shove, 9);
        assert_eq!(cache.remove(shove, Some(index)), Some(9));
        let mut hint = UNKNOWN;
        assert_eq!(cache.lookup(shove, &mut hint), None);
    }

    #[test]
    fn lookup_of_absent_shove_returns_none() {
        let cache = HandleCache::new();
        let mut hint = UNKNOWN;
        assert_eq!(cache.lookup(424242, &mut hint), None);
        assert_eq!(hint, UNKNOWN);
    }

    #[test]
    fn cache_overflow_is_soft() {
        let cache = HandleCache::new();
        for i in 0..CACHE_SIZE as u64 {
            // shove 0 is reserved for "empty"; offset by 1 to avoid it.
            let shove = i + 1;
            let idx = cache.update(shove, shove);
            assert_ne!(idx, UNKNOWN, "cache should not be full yet at {}", i);
        }
        let overflow_shove = CACHE_SIZE as u64 + 1;
        let idx = cache.update(overflow_shove, overflow_shove);
        assert_eq!(idx, UNKNOWN);

        let mut hint = UNKNOWN;
        assert_eq!(cache.lookup(overflow_shove, &mut hint), None);
        assert_eq!(cache.peek(overflow_shove, UNKNOWN.min(CACHE_SIZE - 1)), None);
    }
}
