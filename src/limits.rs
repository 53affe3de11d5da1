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

//! Build-time constants. These mirror the preprocessor constants of the
//! reference implementation; they are not runtime configuration.

/// Minimum identifier length.
pub const MIN_LEN: usize = 1;
/// Maximum identifier length (bounded by the on-stack identifier buffer in
/// the reference; kept generous here since nothing here is stack-allocated).
pub const MAX_LEN: usize = 63;
/// Maximum number of columns in a single table, including the primary key.
pub const MAX_COLS: usize = 32;
/// Maximum number of indexed columns (primary + secondaries) per table.
pub const MAX_INDEXES: usize = 8;
/// Size of the process-local handle cache, in slots.
pub const CACHE_SIZE: usize = 1024;
/// Maximum number of tables a single `fetch` can enumerate.
pub const MAX_TABLES: usize = 1024;

/// Whether `.` is accepted in identifiers besides the leading character rule.
/// The reference exposes this as a compile-time toggle (`AllowDot`); this
/// crate fixes it to `false`, matching the common build of the original.
pub const ALLOW_DOT: bool = false;

/// Magic value stamped into every `StoredSchema` header.
pub const SCHEMA_SIGNATURE: u32 = 0xA1FA_5C4E;
/// Seed used for the schema-record checksum.
pub const SCHEMA_CHECKSEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Sentinel hint/index value meaning "not present in the handle cache".
pub const UNKNOWN: usize = usize::MAX;

/// Sentinel that `fetch`'s `destroy` stamps into a `SchemaInfo` so a repeated
/// `destroy` call is rejected rather than double-freeing.
pub const DEADBEEF: usize = 0xDEAD_BEEF;
