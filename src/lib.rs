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

//! Schema and handle-cache core for a typed table library layered atop an
//! external ordered KVS: name encoding and fingerprinting, sub-DB naming, a
//! process-local handle cache, a schema catalog with integrity checks, and
//! the name-binding refresh protocol tying the two together.

pub mod catalog_store;
pub mod error;
pub mod handle_cache;
pub mod kvs;
pub mod limits;
pub mod name_binding;
pub mod schema_builder;
pub mod schema_manager;
pub mod shove;

pub use catalog_store::{validate, TableSchema};
pub use error::{Error, Result};
pub use handle_cache::HandleCache;
pub use kvs::{DbiFlags, DbiHandle, Kvs, KvsTxn, TxnLevel};
pub use name_binding::{
    column_init, destroy_column, destroy_table, name_init_column, name_init_table, open_column, open_secondaries,
    open_table, refresh_couple, table_column_get, ColumnBinding, ColumnParent, TableBinding, TableName,
};
pub use schema_builder::{describe_column, validate_defs, validate_set, ColumnSet};
pub use schema_manager::{create_table, drop_table, fetch, SchemaInfo};
pub use shove::{DataType, IndexType, Role, Shove};
