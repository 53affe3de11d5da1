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

//! Binary layout and integrity checking for one stored-schema record: the
//! on-disk `StoredSchema` header, its in-memory `TableSchema` counterpart,
//! and the `validate`/`clone`/`free` operations of §4.3.

use crate::error::Result;
use crate::kvs::{DbiFlags, DbiHandle, Kvs, KvsTxn};
use crate::limits::{CACHE_SIZE, MAX_COLS, SCHEMA_CHECKSEED, SCHEMA_SIGNATURE, UNKNOWN};
use crate::schema_builder::validate_defs;
use crate::shove::{is_table_shove, shove_to_dbiname, Shove};
use std::convert::TryInto;
use xxhash_rust::xxh3::xxh3_64_with_seed;

const HEADER_SIZE: usize = 4 + 4 + 8 + 8; // signature + count + csn + checksum

/// Opens (optionally creating) the catalog sub-DB itself, keyed under the
/// zero shove (`shove_to_dbiname(0) == "@"`), shared by every caller that
/// needs to read or write catalog rows.
pub(crate) fn catalog_dbi(kvs: &dyn Kvs, txn: &dyn KvsTxn, create: bool) -> Result<DbiHandle> {
    kvs.open_dbi(
        txn,
        &shove_to_dbiname(0),
        create,
        DbiFlags {
            integer_key: true,
            ..Default::default()
        },
    )
}

/// Binary record persisted in the catalog sub-DB under key = table-shove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchema {
    pub signature: u32,
    pub count: u32,
    pub csn: u64,
    pub checksum: u64,
    pub columns: Vec<Shove>,
}

impl StoredSchema {
    /// Builds a fresh record for `columns`, stamping `csn` and computing the
    /// checksum over everything but the checksum field itself.
    pub fn new(columns: Vec<Shove>, csn: u64) -> StoredSchema {
        let mut schema = StoredSchema {
            signature: SCHEMA_SIGNATURE,
            count: columns.len() as u32,
            csn,
            checksum: 0,
            columns,
        };
        schema.checksum = schema.compute_checksum();
        schema
    }

    fn compute_checksum(&self) -> u64 {
        let mut bytes = Vec::with_capacity(HEADER_SIZE - 8 + self.columns.len() * 8);
        bytes.extend_from_slice(&self.signature.to_ne_bytes());
        bytes.extend_from_slice(&self.count.to_ne_bytes());
        bytes.extend_from_slice(&self.csn.to_ne_bytes());
        for shove in &self.columns {
            bytes.extend_from_slice(&shove.to_ne_bytes());
        }
        xxh3_64_with_seed(&bytes, SCHEMA_CHECKSEED)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.columns.len() * 8);
        bytes.extend_from_slice(&self.signature.to_ne_bytes());
        bytes.extend_from_slice(&self.count.to_ne_bytes());
        bytes.extend_from_slice(&self.csn.to_ne_bytes());
        bytes.extend_from_slice(&self.checksum.to_ne_bytes());
        for shove in &self.columns {
            bytes.extend_from_slice(&shove.to_ne_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<StoredSchema> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let signature = u32::from_ne_bytes(bytes[0..4].try_into().ok()?);
        let count = u32::from_ne_bytes(bytes[4..8].try_into().ok()?);
        let csn = u64::from_ne_bytes(bytes[8..16].try_into().ok()?);
        let checksum = u64::from_ne_bytes(bytes[16..24].try_into().ok()?);
        if bytes.len() != HEADER_SIZE + (count as usize) * 8 {
            return None;
        }
        let mut columns = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let start = HEADER_SIZE + i * 8;
            columns.push(u64::from_ne_bytes(bytes[start..start + 8].try_into().ok()?));
        }
        Some(StoredSchema {
            signature,
            count,
            csn,
            checksum,
            columns,
        })
    }
}

/// In-memory owned copy of a `StoredSchema`, plus the per-column handle-cache
/// hints §3 describes.
#[derive(Debug, Clone)]
pub struct TableSchema {
    key: Shove,
    stored: StoredSchema,
    handle_hints: Vec<usize>,
}

impl TableSchema {
    pub fn table_shove(&self) -> Shove {
        self.key
    }

    pub fn column_shove(&self, i: usize) -> Option<Shove> {
        self.stored.columns.get(i).copied()
    }

    pub fn column_count(&self) -> usize {
        self.stored.columns.len()
    }

    pub fn table_pk(&self) -> Option<Shove> {
        self.stored.columns.first().copied()
    }

    pub fn version_csn(&self) -> u64 {
        self.stored.csn
    }

    pub fn handle_hint(&self, i: usize) -> usize {
        self.handle_hints.get(i).copied().unwrap_or(UNKNOWN)
    }

    pub fn set_handle_hint(&mut self, i: usize, hint: usize) {
        if let Some(slot) = self.handle_hints.get_mut(i) {
            *slot = hint;
        }
    }

    pub fn reset_handle_hints(&mut self) {
        for hint in &mut self.handle_hints {
            *hint = UNKNOWN;
        }
    }

    pub fn stored(&self) -> &StoredSchema {
        &self.stored
    }
}

/// `validate(key, bytes)`: true iff the stored bytes decode to a
/// structurally sound, checksummed, column-valid schema for `key`.
pub fn validate(key: Shove, bytes: &[u8]) -> bool {
    if !is_table_shove(key) {
        return false;
    }
    let stored = match StoredSchema::from_bytes(bytes) {
        Some(s) => s,
        None => return false,
    };
    if stored.signature != SCHEMA_SIGNATURE {
        return false;
    }
    if stored.count == 0 || stored.count as usize > MAX_COLS {
        return false;
    }
    if stored.csn == 0 {
        return false;
    }
    if stored.compute_checksum() != stored.checksum {
        return false;
    }
    validate_defs(&stored.columns).is_ok()
}

/// `clone(key, bytes) -> TableSchema`: decodes `bytes` (already validated by
/// the caller) into a fresh in-memory schema with all handle-cache hints set
/// to `UNKNOWN`.
pub fn clone_schema(key: Shove, bytes: &[u8]) -> Option<TableSchema> {
    let stored = StoredSchema::from_bytes(bytes)?;
    let handle_hints = vec![UNKNOWN; stored.columns.len().min(CACHE_SIZE)];
    Some(TableSchema {
        key,
        stored,
        handle_hints,
    })
}

/// `free(schema)`: poisons the in-memory header before the value is dropped.
/// Rust's ownership already prevents use-after-free; this mirrors the
/// reference's poisoning as a debugging aid, not a safety requirement.
pub fn free(schema: &mut TableSchema) {
    schema.stored.signature = 0;
    schema.stored.checksum = !schema.stored.checksum;
    schema.stored.count = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shove::{column_shove, shove_name, table_shove, DataType, IndexType, Role};

    fn sample_columns() -> Vec<Shove> {
        let pk = column_shove(
            shove_name("pk", Role::Column),
            DataType::Uint64,
            IndexType::PrimaryUniqueOrderedObverse,
            false,
        );
        let v = column_shove(
            shove_name("v", Role::Column),
            DataType::String,
            IndexType::SecondaryWithDupsOrderedObverse,
            false,
        );
        vec![pk, v]
    }

    #[test]
    fn stored_schema_round_trips_through_bytes() {
        let schema = StoredSchema::new(sample_columns(), 7);
        let bytes = schema.to_bytes();
        let decoded = StoredSchema::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, schema);
    }

    #[test]
    fn checksum_covers_the_column_payload() {
        let schema = StoredSchema::new(sample_columns(), 7);
        let mut bytes = schema.to_bytes();
        let last = bytes.len() - 1; // inside the trailing column's bytes
        bytes[last] ^= 0x01;
        let key = table_shove(shove_name("T", Role::Column));
        assert!(!validate(key, &bytes));
    }

    #[test]
    fn validate_accepts_freshly_built_schema() {
        let key = table_shove(shove_name("T", Role::Column));
        let schema = StoredSchema::new(sample_columns(), 7);
        assert!(validate(key, &schema.to_bytes()));
    }

    #[test]
    fn validate_rejects_non_table_key() {
        let key = shove_name("T", Role::Column);
        let schema = StoredSchema::new(sample_columns(), 7);
        assert!(!validate(key, &schema.to_bytes()));
    }

    #[test]
    fn validate_rejects_zero_csn() {
        let key = table_shove(shove_name("T", Role::Column));
        let schema = StoredSchema::new(sample_columns(), 0);
        assert!(!validate(key, &schema.to_bytes()));
    }

    #[test]
    fn clone_then_free_poisons_header() {
        let key = table_shove(shove_name("T", Role::Column));
        let schema = StoredSchema::new(sample_columns(), 7);
        let mut cloned = clone_schema(key, &schema.to_bytes()).unwrap();
        assert_eq!(cloned.column_count(), 2);
        assert_eq!(cloned.handle_hint(0), UNKNOWN);

        free(&mut cloned);
        assert_eq!(cloned.stored.signature, 0);
        assert_eq!(cloned.stored.count, 0);
    }
}
