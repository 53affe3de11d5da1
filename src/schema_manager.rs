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

//! Create/drop table and catalog listing: opens sub-DBs, writes the catalog
//! row, rolls back on failure, and fetches the catalog listing. §4.5.

use crate::catalog_store::{self, catalog_dbi, StoredSchema};
use crate::error::{Error, Result};
use crate::handle_cache::HandleCache;
use crate::kvs::{DbiFlags, DbiHandle, Kvs, KvsTxn, TxnLevel};
use crate::limits::MAX_TABLES;
use crate::name_binding::{destroy_table, TableBinding, TableName};
use crate::schema_builder::{validate_set, ColumnSet};
use crate::shove::{self, dbi_shove, is_table_shove, shove_index_type, shove_to_dbiname, validate_name, Role, Shove};
use std::cell::RefCell;
use std::rc::Rc;

fn require_schema_level(txn: &dyn KvsTxn) -> Result<()> {
    if txn.level() != TxnLevel::Schema {
        return Err(Error::Einval);
    }
    Ok(())
}

fn dbi_flags_for(shove: Shove, ordinal: usize) -> DbiFlags {
    let index_type = shove_index_type(shove);
    let data_type = shove::shove_data_type(shove);
    // The sub-DB's key is always this column's own value, whether it's the
    // table's primary (ordinal 0) or a secondary index.
    let integer_key = matches!(data_type, Some(crate::shove::DataType::Uint64) | Some(crate::shove::DataType::Int64));
    DbiFlags {
        integer_key,
        allow_dups: index_type.map(|t| t.is_indexed() && !t.is_unique()).unwrap_or(false),
        reverse_key: index_type.map(|t| t.is_reverse()).unwrap_or(false),
        stores_pk_value: ordinal != 0,
    }
}

/// Positions participating in sub-DB storage: ordinal 0 (the table/primary
/// itself) plus the indexed prefix at `1..`, per §3's ordering invariant.
fn indexed_ordinals(defs: &[Shove]) -> Vec<usize> {
    let mut ordinals = vec![0];
    for (i, shove) in defs.iter().enumerate().skip(1) {
        if shove_index_type(*shove).map(|t| t.is_indexed()).unwrap_or(false) {
            ordinals.push(i);
        } else {
            break;
        }
    }
    ordinals
}

fn rollback_opened(kvs: &dyn Kvs, cache: &HandleCache, txn: &dyn KvsTxn, opened: &[(Shove, DbiHandle, usize)]) {
    for (dbi, handle, hint) in opened {
        cache.remove(*dbi, Some(*hint));
        if let Err(err) = kvs.drop_dbi(txn, *handle) {
            log::error!("failed to drop sub-DB {:?} while rolling back create_table: {:?}", dbi, err);
        }
    }
}

/// `create_table(txn, name, set)`: validates, opens each indexed column's
/// sub-DB, writes the catalog row, and rolls back any partially-opened
/// sub-DBs on failure.
pub fn create_table(kvs: &dyn Kvs, cache: &HandleCache, txn: &dyn KvsTxn, name: &str, mut set: ColumnSet) -> Result<TableName> {
    require_schema_level(txn)?;
    if !validate_name(name) {
        return Err(Error::Einval);
    }
    validate_set(&mut set)?;

    let table_shove = shove::table_shove(shove::shove_name(name, Role::Table));
    let catalog = catalog_dbi(kvs, txn, true)?;

    let defs = set.as_slice().to_vec();
    let ordinals = indexed_ordinals(&defs);

    for &ordinal in &ordinals {
        let dbi = dbi_shove(table_shove, ordinal as u8);
        match kvs.open_dbi(txn, &shove_to_dbiname(dbi), false, DbiFlags::default()) {
            Err(Error::NotFound) => {}
            Ok(_) => return Err(Error::Eexist),
            Err(other) => return Err(other),
        }
    }

    let mut opened = Vec::with_capacity(ordinals.len());
    for &ordinal in &ordinals {
        let dbi = dbi_shove(table_shove, ordinal as u8);
        let flags = dbi_flags_for(defs[ordinal], ordinal);
        match kvs.open_dbi(txn, &shove_to_dbiname(dbi), true, flags) {
            Ok(handle) => {
                let hint = cache.update(dbi, handle);
                opened.push((dbi, handle, hint));
            }
            Err(err) => {
                rollback_opened(kvs, cache, txn, &opened);
                return Err(err);
            }
        }
    }

    let stored = StoredSchema::new(defs, txn.db_version().max(1));
    let bytes = stored.to_bytes();
    if let Err(err) = kvs.put(txn, catalog, &table_shove.to_ne_bytes(), &bytes, true) {
        rollback_opened(kvs, cache, txn, &opened);
        return Err(err);
    }

    let schema = catalog_store::clone_schema(table_shove, &bytes);
    Ok(Rc::new(RefCell::new(TableBinding::from_parts(table_shove, txn.db_version(), schema))))
}

/// `drop_table(txn, name)`: reads and validates the catalog record, opens
/// each index sub-DB to obtain its handle, deletes the catalog row, then
/// evicts and drops each sub-DB.
pub fn drop_table(kvs: &dyn Kvs, cache: &HandleCache, txn: &dyn KvsTxn, name: &str) -> Result<()> {
    require_schema_level(txn)?;
    if !validate_name(name) {
        return Err(Error::Einval);
    }

    let table_shove = shove::table_shove(shove::shove_name(name, Role::Table));
    let catalog = catalog_dbi(kvs, txn, false)?;

    let bytes = kvs.get(txn, catalog, &table_shove.to_ne_bytes())?.ok_or(Error::NotFound)?;
    if !catalog_store::validate(table_shove, &bytes) {
        log::error!("catalog record for table {:?} failed integrity validation on drop", name);
        return Err(Error::SchemaCorrupted);
    }
    let stored = StoredSchema::from_bytes(&bytes).ok_or(Error::SchemaCorrupted)?;

    let ordinals = indexed_ordinals(&stored.columns);
    let mut opened = Vec::with_capacity(ordinals.len());
    for &ordinal in &ordinals {
        let dbi = dbi_shove(table_shove, ordinal as u8);
        match kvs.open_dbi(txn, &shove_to_dbiname(dbi), false, DbiFlags::default()) {
            Ok(handle) => opened.push((dbi, handle)),
            Err(Error::NotFound) => {}
            Err(other) => return Err(other),
        }
    }

    kvs.del(txn, catalog, &table_shove.to_ne_bytes())?;

    for (dbi, handle) in &opened {
        cache.remove(*dbi, None);
        if let Err(err) = kvs.drop_dbi(txn, *handle) {
            log::error!("failed to drop sub-DB {:?} while dropping table: {:?}", dbi, err);
            return Err(Error::Internal);
        }
    }

    Ok(())
}

/// `fetch(txn)`: lists every table currently in the catalog as an unbound
/// `TableName` (key only; no schema attached).
pub fn fetch(kvs: &dyn Kvs, txn: &dyn KvsTxn) -> Result<SchemaInfo> {
    let catalog = match catalog_dbi(kvs, txn, false) {
        Ok(dbi) => dbi,
        Err(Error::NotFound) => return Ok(SchemaInfo::empty()),
        Err(other) => return Err(other),
    };

    let rows = kvs.iter_sorted(txn, catalog)?;
    if rows.len() > MAX_TABLES {
        log::error!("catalog holds {} rows, over the {} fetch cap", rows.len(), MAX_TABLES);
        return Err(Error::SchemaCorrupted);
    }

    let mut tables = Vec::with_capacity(rows.len());
    for (key_bytes, value_bytes) in rows {
        if key_bytes.len() != 8 {
            log::error!("catalog row key is {} bytes, expected 8", key_bytes.len());
            return Err(Error::SchemaCorrupted);
        }
        let key = u64::from_ne_bytes(key_bytes.as_slice().try_into().map_err(|_| Error::SchemaCorrupted)?);
        if !is_table_shove(key) || !catalog_store::validate(key, &value_bytes) {
            log::error!("catalog row under key {} is not a valid table schema record", key);
            return Err(Error::SchemaCorrupted);
        }
        tables.push(Rc::new(RefCell::new(TableBinding::from_parts(key, 0, None))));
    }

    Ok(SchemaInfo::new(tables))
}

/// Result of `fetch`: an enumerable set of unbound table names, plus the
/// `destroy` sentinel behavior of §4.5 (a second `destroy` call is rejected).
pub struct SchemaInfo {
    tables: Vec<TableName>,
    destroyed: bool,
}

impl SchemaInfo {
    fn empty() -> SchemaInfo {
        SchemaInfo {
            tables: Vec::new(),
            destroyed: false,
        }
    }

    fn new(tables: Vec<TableName>) -> SchemaInfo {
        SchemaInfo { tables, destroyed: false }
    }

    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }

    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Err(Error::Einval);
        }
        for table in &self.tables {
            destroy_table(table);
        }
        self.destroyed = true;
        Ok(())
    }
}
