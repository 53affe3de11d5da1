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

//! The external KVS collaborator's contract. The schema core is built
//! against this trait seam; a real LMDB/MDBX/sled binding is substituted at
//! the call site. Out of the core's scope per §1, but needed as a trait
//! object so the rest of the crate compiles and is testable in isolation.

use crate::error::{Error, Result};

/// Transaction privilege levels, totally ordered: `Read < Write < Schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxnLevel {
    Read,
    Write,
    Schema,
}

/// Opaque handle to an open sub-database ("DBI" in LMDB/MDBX parlance).
/// `0` is never issued by a real `Kvs` implementation and is reserved as the
/// handle-cache's "empty slot" sentinel.
pub type DbiHandle = u64;

/// Flags describing how a sub-DB is keyed and ordered, derived by
/// `dbi_flags` from a column's shove and its ordinal within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbiFlags {
    pub integer_key: bool,
    pub allow_dups: bool,
    pub reverse_key: bool,
    /// Primary sub-DBs store full rows; secondary sub-DBs store PK values.
    pub stores_pk_value: bool,
}

pub trait KvsTxn {
    fn level(&self) -> TxnLevel;
    fn db_version(&self) -> u64;
}

/// Minimal seam the schema core needs from the external KVS: named sub-DB
/// open/drop, and get/put/del plus sorted iteration over the catalog.
pub trait Kvs {
    fn open_dbi(&self, txn: &dyn KvsTxn, name: &str, create: bool, flags: DbiFlags) -> Result<DbiHandle>;
    fn drop_dbi(&self, txn: &dyn KvsTxn, handle: DbiHandle) -> Result<()>;
    fn get(&self, txn: &dyn KvsTxn, dbi: DbiHandle, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, txn: &dyn KvsTxn, dbi: DbiHandle, key: &[u8], value: &[u8], no_overwrite: bool) -> Result<()>;
    fn del(&self, txn: &dyn KvsTxn, dbi: DbiHandle, key: &[u8]) -> Result<()>;
    /// Iterates the sub-DB's entries in ascending key order.
    fn iter_sorted(&self, txn: &dyn KvsTxn, dbi: DbiHandle) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Test-only in-memory `Kvs`, grounded on the teacher's `DashMap`-backed
/// `OnDiskCatalogHandle`/`OnDiskSchemaHandle` test doubles. Not part of the
/// public production contract — callers bring their own `Kvs`.
pub mod testing {
    use super::*;
    use dashmap::DashMap;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    pub struct SimpleTxn {
        level: TxnLevel,
        db_version: u64,
    }

    impl SimpleTxn {
        pub fn new(level: TxnLevel, db_version: u64) -> SimpleTxn {
            SimpleTxn { level, db_version }
        }
    }

    impl KvsTxn for SimpleTxn {
        fn level(&self) -> TxnLevel {
            self.level
        }

        fn db_version(&self) -> u64 {
            self.db_version
        }
    }

    #[derive(Default)]
    struct DbiState {
        rows: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    }

    pub struct MemKvs {
        names: DashMap<String, DbiHandle>,
        dbis: DashMap<DbiHandle, DbiState>,
        next_handle: AtomicU64,
    }

    impl Default for MemKvs {
        fn default() -> MemKvs {
            MemKvs {
                names: DashMap::new(),
                dbis: DashMap::new(),
                next_handle: AtomicU64::new(1),
            }
        }
    }

    impl MemKvs {
        pub fn new() -> MemKvs {
            MemKvs::default()
        }
    }

    impl Kvs for MemKvs {
        fn open_dbi(&self, _txn: &dyn KvsTxn, name: &str, create: bool, _flags: DbiFlags) -> Result<DbiHandle> {
            if let Some(handle) = self.names.get(name) {
                return Ok(*handle);
            }
            if !create {
                return Err(Error::NotFound);
            }
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
            self.names.insert(name.to_owned(), handle);
            self.dbis.insert(handle, DbiState::default());
            Ok(handle)
        }

        fn drop_dbi(&self, _txn: &dyn KvsTxn, handle: DbiHandle) -> Result<()> {
            self.dbis.remove(&handle);
            self.names.retain(|_, h| *h != handle);
            Ok(())
        }

        fn get(&self, _txn: &dyn KvsTxn, dbi: DbiHandle, key: &[u8]) -> Result<Option<Vec<u8>>> {
            let state = self.dbis.get(&dbi).ok_or(Error::Internal)?;
            Ok(state.rows.lock().unwrap().get(key).cloned())
        }

        fn put(&self, _txn: &dyn KvsTxn, dbi: DbiHandle, key: &[u8], value: &[u8], no_overwrite: bool) -> Result<()> {
            let state = self.dbis.get(&dbi).ok_or(Error::Internal)?;
            let mut rows = state.rows.lock().unwrap();
            if no_overwrite && rows.contains_key(key) {
                return Err(Error::Eexist);
            }
            rows.insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        fn del(&self, _txn: &dyn KvsTxn, dbi: DbiHandle, key: &[u8]) -> Result<()> {
            let state = self.dbis.get(&dbi).ok_or(Error::Internal)?;
            state.rows.lock().unwrap().remove(key);
            Ok(())
        }

        fn iter_sorted(&self, _txn: &dyn KvsTxn, dbi: DbiHandle) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            let state = self.dbis.get(&dbi).ok_or(Error::Internal)?;
            Ok(state.rows.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
    }

}
