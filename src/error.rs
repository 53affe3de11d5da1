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

use std::fmt::{self, Display, Formatter};

/// Error taxonomy for the schema and handle-cache core. No variant carries a
/// string message; `Display` renders only the kind, matching callers that
/// only ever branch on `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Argument or identifier malformed; wrong txn level; mismatched parent token.
    Einval,
    /// Catalog key or column not present.
    NotFound,
    /// Duplicate column in a set, or pre-existing sub-DB at create time.
    Eexist,
    /// Column or index count over limit.
    TooMany,
    /// Requested column ordinal out of range.
    NoData,
    /// Required non-indexed column absent from a row.
    ColumnMissing,
    /// Caller's token is newer than the txn snapshot (rollback observed).
    SchemaChanged,
    /// Checksum/signature/structure failure in a stored schema record.
    SchemaCorrupted,
    /// Page-size mismatch on reopen, reported by the KVS and surfaced unchanged.
    DbIncompat,
    /// Allocation failure.
    NoMem,
    /// KVS-returned error escalated via `internal_abort`.
    Internal,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Error::Einval => "EINVAL",
            Error::NotFound => "ENOENT",
            Error::Eexist => "EEXIST",
            Error::TooMany => "TOOMANY",
            Error::NoData => "NoData",
            Error::ColumnMissing => "ColumnMissing",
            Error::SchemaChanged => "SchemaChanged",
            Error::SchemaCorrupted => "SchemaCorrupted",
            Error::DbIncompat => "DbIncompat",
            Error::NoMem => "NoMem",
            Error::Internal => "Internal",
        };
        write!(f, "{}", name)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
