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

//! `Name` token lifecycle: init, refresh against the transaction's schema
//! version, and handle resolution (`open_table`/`open_column`/
//! `open_secondaries`). §4.6.

use crate::catalog_store::{self, catalog_dbi, TableSchema};
use crate::error::{Error, Result};
use crate::handle_cache::HandleCache;
use crate::kvs::{DbiHandle, Kvs, KvsTxn, TxnLevel};
use crate::limits::{MAX_COLS, UNKNOWN};
use crate::shove::{self, dbi_shove, name_equal, shove_to_dbiname, validate_name, Role, Shove};
use std::cell::RefCell;
use std::rc::Rc;

/// Owning binding for a table `Name`. Shared (via `Rc<RefCell<_>>`) with
/// every `ColumnName` paired to this table, since refresh must update the
/// schema once and have every paired column observe it.
#[derive(Debug)]
pub struct TableBinding {
    shove: Shove,
    version: u64,
    schema: Option<TableSchema>,
}

pub type TableName = Rc<RefCell<TableBinding>>;

impl TableBinding {
    /// Builds a binding directly from its parts, for callers (`schema_manager`)
    /// that already hold a freshly-validated schema and don't need to go
    /// through `name_init_table` + `refresh_couple`.
    pub(crate) fn from_parts(shove: Shove, version: u64, schema: Option<TableSchema>) -> TableBinding {
        TableBinding { shove, version, schema }
    }

    /// The table-role shove this binding names.
    pub fn shove(&self) -> Shove {
        self.shove
    }
}

/// A column `Name`'s link to its owning table. `Unpaired` is the
/// self-parent sentinel of §4.6/§9: "not yet paired with a table id."
#[derive(Clone)]
pub enum ColumnParent {
    Unpaired,
    Paired(TableName),
}

pub struct ColumnBinding {
    shove: Shove,
    version: u64,
    parent: ColumnParent,
    num: usize,
}

/// `name_init(id, s, Table)`: validates `s`, computes its table-shove, and
/// returns a fresh, unbound table `Name`.
pub fn name_init_table(s: &str) -> Result<TableName> {
    if !validate_name(s) {
        return Err(Error::Einval);
    }
    let shove = shove::table_shove(shove::shove_name(s, Role::Table));
    Ok(Rc::new(RefCell::new(TableBinding {
        shove,
        version: 0,
        schema: None,
    })))
}

/// `name_init(id, s, Column)`: validates `s`, computes its column-shove, and
/// returns a fresh column `Name` paired to nothing (`Unpaired`).
pub fn name_init_column(s: &str) -> Result<ColumnBinding> {
    if !validate_name(s) {
        return Err(Error::Einval);
    }
    Ok(ColumnBinding {
        shove: shove::shove_name(s, Role::Column),
        version: 0,
        parent: ColumnParent::Unpaired,
        num: UNKNOWN,
    })
}

/// `column_init(table_id, column_id, s)`: like `name_init_column` but
/// immediately paired to `table`. `table` must already be a valid table
/// token (callers construct it via `name_init_table` first).
pub fn column_init(table: &TableName, s: &str) -> Result<ColumnBinding> {
    let mut column = name_init_column(s)?;
    column.parent = ColumnParent::Paired(Rc::clone(table));
    Ok(column)
}

/// `name_destroy(id)`: releases any owned schema and zeros the token. Takes
/// `&mut` rather than consuming, mirroring the reference's in-place teardown
/// (repeated destroy is then a harmless no-op, not a double-free).
pub fn destroy_table(table: &TableName) {
    let mut binding = table.borrow_mut();
    if let Some(mut schema) = binding.schema.take() {
        catalog_store::free(&mut schema);
    }
    binding.shove = 0;
    binding.version = 0;
}

pub fn destroy_column(column: &mut ColumnBinding) {
    column.shove = 0;
    column.version = 0;
    column.parent = ColumnParent::Unpaired;
    column.num = UNKNOWN;
}

/// Removes every cached handle belonging to `schema`'s indexed columns,
/// using the handle-cache hints the schema itself carries. Called before a
/// stale schema is replaced, so a drop/recreate cannot leave dangling
/// handles behind in the cache.
fn evict_cached_handles(cache: &HandleCache, schema: &TableSchema) {
    for ordinal in 0..schema.column_count() {
        let dbi = dbi_shove(schema.table_shove(), ordinal as u8);
        cache.remove(dbi, Some(schema.handle_hint(ordinal)));
    }
}

/// The central protocol of §4.6: reconciles `table`'s (and, if supplied,
/// `column`'s) binding against `txn`'s schema snapshot.
pub fn refresh_couple(
    kvs: &dyn Kvs,
    cache: &HandleCache,
    txn: &dyn KvsTxn,
    table: &TableName,
    mut column: Option<&mut ColumnBinding>,
) -> Result<()> {
    if txn.level() < TxnLevel::Read {
        return Err(Error::Einval);
    }

    let catalog = catalog_dbi(kvs, txn, false).ok();
    let txn_version = txn.db_version();

    {
        let binding = table.borrow();
        if binding.version > txn_version {
            return Err(Error::SchemaChanged);
        }
    }

    let needs_reload = table.borrow().version < txn_version;
    if needs_reload {
        let stale_schema = table.borrow_mut().schema.take();
        if let Some(schema) = &stale_schema {
            evict_cached_handles(cache, schema);
        }

        let table_shove = table.borrow().shove;
        let loaded = match catalog {
            Some(dbi) => kvs.get(txn, dbi, &table_shove.to_ne_bytes())?,
            None => None,
        };

        let mut binding = table.borrow_mut();
        match loaded {
            Some(bytes) => {
                if !catalog_store::validate(table_shove, &bytes) {
                    log::error!("catalog record for shove {} failed integrity validation", table_shove);
                    return Err(Error::SchemaCorrupted);
                }
                binding.schema = catalog_store::clone_schema(table_shove, &bytes);
            }
            None => {
                binding.schema = None;
            }
        }
        binding.version = txn_version;
    }

    if table.borrow().schema.is_none() {
        return Err(Error::NotFound);
    }

    {
        let binding = table.borrow();
        let schema = binding.schema.as_ref().unwrap();
        if schema.table_shove() != binding.shove {
            log::error!("loaded schema's table shove does not match the binding it was loaded for");
            return Err(Error::SchemaCorrupted);
        }
    }

    let column = match column.take() {
        Some(c) => c,
        None => return Ok(()),
    };

    if let ColumnParent::Unpaired = column.parent {
        column.parent = ColumnParent::Paired(Rc::clone(table));
    } else if let ColumnParent::Paired(parent) = &column.parent {
        if !Rc::ptr_eq(parent, table) {
            return Err(Error::Einval);
        }
    }

    let table_version = table.borrow().version;
    if column.version > table_version {
        return Err(Error::SchemaChanged);
    }

    if column.version != table_version {
        let binding = table.borrow();
        let schema = binding.schema.as_ref().unwrap();
        let mut found = None;
        for i in 0..schema.column_count() {
            if let Some(candidate) = schema.column_shove(i) {
                if name_equal(candidate, column.shove) {
                    found = Some((i, candidate));
                    break;
                }
            }
        }
        match found {
            Some((num, canonical_shove)) => {
                column.num = num;
                column.shove = canonical_shove;
            }
            None => return Err(Error::NotFound),
        }
        column.version = table_version;
    }

    if column.num > MAX_COLS {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// `table_column_get(table_id, i, &mut column_id)`: populates `column` from
/// the *i*-th entry of `table`'s already-bound schema, without a catalog
/// read.
pub fn table_column_get(table: &TableName, i: usize, column: &mut ColumnBinding) -> Result<()> {
    let binding = table.borrow();
    let schema = binding.schema.as_ref().ok_or(Error::NotFound)?;
    let shove = schema.column_shove(i).ok_or(Error::NoData)?;
    column.shove = shove;
    column.num = i;
    column.version = binding.version;
    column.parent = ColumnParent::Paired(Rc::clone(table));
    Ok(())
}

fn open_dbi_cached(
    kvs: &dyn Kvs,
    cache: &HandleCache,
    txn: &dyn KvsTxn,
    dbi_shove: Shove,
    hint: usize,
) -> Result<(DbiHandle, usize)> {
    cache.open_or_insert(dbi_shove, hint, || {
        kvs.open_dbi(txn, &shove_to_dbiname(dbi_shove), false, crate::kvs::DbiFlags::default())
    })
}

/// `open_table`: resolves the handle for the table's own (primary) sub-DB.
pub fn open_table(kvs: &dyn Kvs, cache: &HandleCache, txn: &dyn KvsTxn, table: &TableName) -> Result<DbiHandle> {
    let (shove_val, hint) = {
        let binding = table.borrow();
        let schema = binding.schema.as_ref().ok_or(Error::NotFound)?;
        (dbi_shove(schema.table_shove(), 0), schema.handle_hint(0))
    };
    let (handle, new_hint) = open_dbi_cached(kvs, cache, txn, shove_val, hint)?;
    table.borrow_mut().schema.as_mut().unwrap().set_handle_hint(0, new_hint);
    Ok(handle)
}

/// `open_column`: for the primary column (`num == 0`) this is the table
/// handle itself; otherwise resolves the secondary index's sub-DB.
pub fn open_column(kvs: &dyn Kvs, cache: &HandleCache, txn: &dyn KvsTxn, column: &ColumnBinding) -> Result<DbiHandle> {
    let table = match &column.parent {
        ColumnParent::Paired(t) => t,
        ColumnParent::Unpaired => return Err(Error::Einval),
    };
    if column.num == 0 {
        return open_table(kvs, cache, txn, table);
    }
    let (shove_val, hint) = {
        let binding = table.borrow();
        let schema = binding.schema.as_ref().ok_or(Error::NotFound)?;
        (dbi_shove(schema.table_shove(), column.num as u8), schema.handle_hint(column.num))
    };
    let (handle, new_hint) = open_dbi_cached(kvs, cache, txn, shove_val, hint)?;
    table.borrow_mut().schema.as_mut().unwrap().set_handle_hint(column.num, new_hint);
    Ok(handle)
}

/// `open_secondaries`: resolves handles for every indexed column from
/// ordinal 1 onward, stopping at the first non-indexed column.
pub fn open_secondaries(kvs: &dyn Kvs, cache: &HandleCache, txn: &dyn KvsTxn, table: &TableName) -> Result<Vec<DbiHandle>> {
    let column_count = {
        let binding = table.borrow();
        let schema = binding.schema.as_ref().ok_or(Error::NotFound)?;
        schema.column_count()
    };
    let mut handles = Vec::new();
    for i in 1..column_count {
        let (shove_val, is_indexed, hint) = {
            let binding = table.borrow();
            let schema = binding.schema.as_ref().unwrap();
            let shove = schema.column_shove(i).ok_or(Error::NoData)?;
            let indexed = shove::shove_index_type(shove).map(|t| t.is_indexed()).unwrap_or(false);
            (dbi_shove(schema.table_shove(), i as u8), indexed, schema.handle_hint(i))
        };
        if !is_indexed {
            break;
        }
        let (handle, new_hint) = open_dbi_cached(kvs, cache, txn, shove_val, hint)?;
        table.borrow_mut().schema.as_mut().unwrap().set_handle_hint(i, new_hint);
        handles.push(handle);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::testing::{MemKvs, SimpleTxn};
    use crate::schema_builder::{describe_column, validate_set, ColumnSet};
    use crate::schema_manager::create_table;
    use crate::shove::{DataType, IndexType};

    fn sample_set() -> ColumnSet {
        let mut set = ColumnSet::new();
        describe_column("pk", DataType::Uint64, IndexType::PrimaryUniqueOrderedObverse, false, &mut set).unwrap();
        describe_column("v", DataType::String, IndexType::SecondaryWithDupsOrderedObverse, false, &mut set).unwrap();
        describe_column("note", DataType::String, IndexType::NoIndex, false, &mut set).unwrap();
        validate_set(&mut set).unwrap();
        set
    }

    #[test]
    fn name_init_then_destroy_leaves_table_all_zero() {
        let table = name_init_table("T").unwrap();
        assert_ne!(table.borrow().shove, 0);
        destroy_table(&table);
        assert_eq!(table.borrow().shove, 0);
        assert_eq!(table.borrow().version, 0);
        assert!(table.borrow().schema.is_none());
    }

    #[test]
    fn name_init_then_destroy_leaves_column_all_zero() {
        let mut column = name_init_column("v").unwrap();
        assert_ne!(column.shove, 0);
        destroy_column(&mut column);
        assert_eq!(column.shove, 0);
        assert_eq!(column.version, 0);
        assert_eq!(column.num, UNKNOWN);
        assert!(matches!(column.parent, ColumnParent::Unpaired));
    }

    #[test]
    fn refresh_couple_is_idempotent_within_a_txn() {
        let kvs = MemKvs::new();
        let cache = HandleCache::new();
        let schema_txn = SimpleTxn::new(TxnLevel::Schema, 1);
        create_table(&kvs, &cache, &schema_txn, "T", sample_set()).unwrap();

        let read_txn = SimpleTxn::new(TxnLevel::Read, 1);
        let table = name_init_table("T").unwrap();
        refresh_couple(&kvs, &cache, &read_txn, &table, None).unwrap();
        let after_first = table.borrow().version;
        refresh_couple(&kvs, &cache, &read_txn, &table, None).unwrap();
        assert_eq!(table.borrow().version, after_first);
    }

    #[test]
    fn refresh_with_future_version_is_schema_changed() {
        let kvs = MemKvs::new();
        let cache = HandleCache::new();
        let schema_txn = SimpleTxn::new(TxnLevel::Schema, 1);
        create_table(&kvs, &cache, &schema_txn, "T", sample_set()).unwrap();

        let table = name_init_table("T").unwrap();
        table.borrow_mut().version = 5;
        let read_txn = SimpleTxn::new(TxnLevel::Read, 1);
        assert_eq!(
            refresh_couple(&kvs, &cache, &read_txn, &table, None).unwrap_err(),
            Error::SchemaChanged
        );
    }

    #[test]
    fn column_refresh_resolves_ordinal_and_canonical_shove() {
        let kvs = MemKvs::new();
        let cache = HandleCache::new();
        let schema_txn = SimpleTxn::new(TxnLevel::Schema, 1);
        create_table(&kvs, &cache, &schema_txn, "T", sample_set()).unwrap();

        let read_txn = SimpleTxn::new(TxnLevel::Read, 1);
        let table = name_init_table("T").unwrap();
        refresh_couple(&kvs, &cache, &read_txn, &table, None).unwrap();

        let mut column = name_init_column("v").unwrap();
        refresh_couple(&kvs, &cache, &read_txn, &table, Some(&mut column)).unwrap();
        assert_ne!(column.num, UNKNOWN);
    }
}
