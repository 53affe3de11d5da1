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

//! Name encoding and fingerprinting: case-folded 64-bit identifiers
//! ("shoves"), the base-64-ish sub-DB naming scheme, and the closed
//! `DataType`/`IndexType` enumerations a shove's low bits carry.

use crate::error::{Error, Result};
use crate::limits::{ALLOW_DOT, MAX_LEN, MIN_LEN};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// A 64-bit packed identifier: `[ hash:48 | is_table:1 | index:7 | type:8 ]`.
///
/// Two shoves are *name-equal* iff their hash and table/column-role bits
/// agree, regardless of the type/index payload in the low 15 bits.
pub type Shove = u64;

/// Sub-DB naming key, derived from a table-shove: the `is_table` bit is
/// stripped and the column ordinal (0 = primary, 1..N = secondary indexes)
/// is folded into the low byte in its place.
pub type DbiShove = u64;

const HASH_SHIFT: u32 = 16;
const IS_TABLE_BIT: u64 = 1 << 15;
const INDEX_SHIFT: u32 = 8;
const INDEX_MASK: u64 = 0x7F00;
const TYPE_MASK: u64 = 0x00FF;
/// Set in the low byte when a *non-indexed* column is nullable. Indexed
/// columns carry nullability in their `IndexType` variant instead; this bit
/// is meaningless (and left clear) whenever `IndexType::is_indexed` holds.
const NONINDEXED_NULLABLE_BIT: u64 = 0x80;
const DATA_TYPE_MASK: u64 = 0x07;
const NAME_MASK: u64 = !0u64 << HASH_SHIFT | IS_TABLE_BIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Table,
    Column,
}

/// Scalar payload types a column may hold. A small, closed set stands in for
/// the reference's `fptu_*` type tags; the core only needs to range-check
/// and to know which types are reverse-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Uint64,
    Int64,
    Double,
    String,
    Bytes,
}

impl DataType {
    fn tag(self) -> u64 {
        match self {
            DataType::Bool => 0,
            DataType::Uint64 => 1,
            DataType::Int64 => 2,
            DataType::Double => 3,
            DataType::String => 4,
            DataType::Bytes => 5,
        }
    }

    /// Byte width for fixed-width types; `None` for variable-width types.
    pub(crate) fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Bool => Some(1),
            DataType::Uint64 | DataType::Int64 | DataType::Double => Some(8),
            DataType::String | DataType::Bytes => None,
        }
    }
}

/// Closed set of index combinations a column may be described with, matching
/// the exhaustive switch in the reference's `fpta_column_def_validate`
/// (`primary_withdups_unordered_nullable_reverse` has no well-defined
/// ordering and is intentionally absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    NoIndex,
    PrimaryUniqueOrderedObverse,
    PrimaryUniqueOrderedObverseNullable,
    PrimaryUniqueOrderedReverse,
    PrimaryUniqueOrderedReverseNullable,
    PrimaryUniqueUnordered,
    PrimaryUniqueUnorderedNullableObverse,
    PrimaryUniqueUnorderedNullableReverse,
    PrimaryWithDupsOrderedObverse,
    PrimaryWithDupsOrderedObverseNullable,
    PrimaryWithDupsOrderedReverse,
    PrimaryWithDupsOrderedReverseNullable,
    PrimaryWithDupsUnordered,
    PrimaryWithDupsUnorderedNullableObverse,
    SecondaryUniqueOrderedObverse,
    SecondaryUniqueOrderedObverseNullable,
    SecondaryUniqueOrderedReverse,
    SecondaryUniqueOrderedReverseNullable,
    SecondaryUniqueUnordered,
    SecondaryUniqueUnorderedNullableObverse,
    SecondaryUniqueUnorderedNullableReverse,
    SecondaryWithDupsOrderedObverse,
    SecondaryWithDupsOrderedObverseNullable,
    SecondaryWithDupsOrderedReverse,
    SecondaryWithDupsOrderedReverseNullable,
    SecondaryWithDupsUnordered,
    SecondaryWithDupsUnorderedNullableObverse,
    SecondaryWithDupsUnorderedNullableReverse,
}

impl IndexType {
    fn tag(self) -> u64 {
        use IndexType::*;
        match self {
            NoIndex => 0,
            PrimaryUniqueOrderedObverse => 1,
            PrimaryUniqueOrderedObverseNullable => 2,
            PrimaryUniqueOrderedReverse => 3,
            PrimaryUniqueOrderedReverseNullable => 4,
            PrimaryUniqueUnordered => 5,
            PrimaryUniqueUnorderedNullableObverse => 6,
            PrimaryUniqueUnorderedNullableReverse => 7,
            PrimaryWithDupsOrderedObverse => 8,
            PrimaryWithDupsOrderedObverseNullable => 9,
            PrimaryWithDupsOrderedReverse => 10,
            PrimaryWithDupsOrderedReverseNullable => 11,
            PrimaryWithDupsUnordered => 12,
            PrimaryWithDupsUnorderedNullableObverse => 13,
            SecondaryUniqueOrderedObverse => 14,
            SecondaryUniqueOrderedObverseNullable => 15,
            SecondaryUniqueOrderedReverse => 16,
            SecondaryUniqueOrderedReverseNullable => 17,
            SecondaryUniqueUnordered => 18,
            SecondaryUniqueUnorderedNullableObverse => 19,
            SecondaryUniqueUnorderedNullableReverse => 20,
            SecondaryWithDupsOrderedObverse => 21,
            SecondaryWithDupsOrderedObverseNullable => 22,
            SecondaryWithDupsOrderedReverse => 23,
            SecondaryWithDupsOrderedReverseNullable => 24,
            SecondaryWithDupsUnordered => 25,
            SecondaryWithDupsUnorderedNullableObverse => 26,
            SecondaryWithDupsUnorderedNullableReverse => 27,
        }
    }

    fn from_tag(tag: u64) -> Option<IndexType> {
        use IndexType::*;
        Some(match tag {
            0 => NoIndex,
            1 => PrimaryUniqueOrderedObverse,
            2 => PrimaryUniqueOrderedObverseNullable,
            3 => PrimaryUniqueOrderedReverse,
            4 => PrimaryUniqueOrderedReverseNullable,
            5 => PrimaryUniqueUnordered,
            6 => PrimaryUniqueUnorderedNullableObverse,
            7 => PrimaryUniqueUnorderedNullableReverse,
            8 => PrimaryWithDupsOrderedObverse,
            9 => PrimaryWithDupsOrderedObverseNullable,
            10 => PrimaryWithDupsOrderedReverse,
            11 => PrimaryWithDupsOrderedReverseNullable,
            12 => PrimaryWithDupsUnordered,
            13 => PrimaryWithDupsUnorderedNullableObverse,
            14 => SecondaryUniqueOrderedObverse,
            15 => SecondaryUniqueOrderedObverseNullable,
            16 => SecondaryUniqueOrderedReverse,
            17 => SecondaryUniqueOrderedReverseNullable,
            18 => SecondaryUniqueUnordered,
            19 => SecondaryUniqueUnorderedNullableObverse,
            20 => SecondaryUniqueUnorderedNullableReverse,
            21 => SecondaryWithDupsOrderedObverse,
            22 => SecondaryWithDupsOrderedObverseNullable,
            23 => SecondaryWithDupsOrderedReverse,
            24 => SecondaryWithDupsOrderedReverseNullable,
            25 => SecondaryWithDupsUnordered,
            26 => SecondaryWithDupsUnorderedNullableObverse,
            27 => SecondaryWithDupsUnorderedNullableReverse,
            _ => return None,
        })
    }

    pub fn is_indexed(self) -> bool {
        !matches!(self, IndexType::NoIndex)
    }

    pub fn is_primary(self) -> bool {
        self.tag() >= 1 && self.tag() <= 13
    }

    pub fn is_secondary(self) -> bool {
        self.tag() >= 14
    }

    pub fn is_unique(self) -> bool {
        use IndexType::*;
        matches!(
            self,
            PrimaryUniqueOrderedObverse
                | PrimaryUniqueOrderedObverseNullable
                | PrimaryUniqueOrderedReverse
                | PrimaryUniqueOrderedReverseNullable
                | PrimaryUniqueUnordered
                | PrimaryUniqueUnorderedNullableObverse
                | PrimaryUniqueUnorderedNullableReverse
                | SecondaryUniqueOrderedObverse
                | SecondaryUniqueOrderedObverseNullable
                | SecondaryUniqueOrderedReverse
                | SecondaryUniqueOrderedReverseNullable
                | SecondaryUniqueUnordered
                | SecondaryUniqueUnorderedNullableObverse
                | SecondaryUniqueUnorderedNullableReverse
        )
    }

    pub fn is_ordered(self) -> bool {
        use IndexType::*;
        matches!(
            self,
            PrimaryUniqueOrderedObverse
                | PrimaryUniqueOrderedObverseNullable
                | PrimaryUniqueOrderedReverse
                | PrimaryUniqueOrderedReverseNullable
                | PrimaryWithDupsOrderedObverse
                | PrimaryWithDupsOrderedObverseNullable
                | PrimaryWithDupsOrderedReverse
                | PrimaryWithDupsOrderedReverseNullable
                | SecondaryUniqueOrderedObverse
                | SecondaryUniqueOrderedObverseNullable
                | SecondaryUniqueOrderedReverse
                | SecondaryUniqueOrderedReverseNullable
                | SecondaryWithDupsOrderedObverse
                | SecondaryWithDupsOrderedObverseNullable
                | SecondaryWithDupsOrderedReverse
                | SecondaryWithDupsOrderedReverseNullable
        )
    }

    pub fn is_reverse(self) -> bool {
        use IndexType::*;
        matches!(
            self,
            PrimaryUniqueOrderedReverse
                | PrimaryUniqueOrderedReverseNullable
                | PrimaryUniqueUnorderedNullableReverse
                | PrimaryWithDupsOrderedReverse
                | PrimaryWithDupsOrderedReverseNullable
                | SecondaryUniqueOrderedReverse
                | SecondaryUniqueOrderedReverseNullable
                | SecondaryUniqueUnorderedNullableReverse
                | SecondaryWithDupsOrderedReverse
                | SecondaryWithDupsOrderedReverseNullable
                | SecondaryWithDupsUnorderedNullableReverse
        )
    }

    pub fn is_nullable(self) -> bool {
        use IndexType::*;
        matches!(
            self,
            PrimaryUniqueOrderedObverseNullable
                | PrimaryUniqueOrderedReverseNullable
                | PrimaryUniqueUnorderedNullableObverse
                | PrimaryUniqueUnorderedNullableReverse
                | PrimaryWithDupsOrderedObverseNullable
                | PrimaryWithDupsOrderedReverseNullable
                | PrimaryWithDupsUnorderedNullableObverse
                | SecondaryUniqueOrderedObverseNullable
                | SecondaryUniqueOrderedReverseNullable
                | SecondaryUniqueUnorderedNullableObverse
                | SecondaryUniqueUnorderedNullableReverse
                | SecondaryWithDupsOrderedObverseNullable
                | SecondaryWithDupsOrderedReverseNullable
                | SecondaryWithDupsUnorderedNullableObverse
                | SecondaryWithDupsUnorderedNullableReverse
        )
    }
}

/// Validates a candidate identifier per §4.1: non-empty, length-bounded,
/// starts with an alphabetic character or `_`, and the remainder is
/// alphanumeric, `_`, or (if `ALLOW_DOT`) `.`.
pub fn validate_name(s: &str) -> bool {
    if s.len() < MIN_LEN || s.len() > MAX_LEN {
        return false;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    for c in chars {
        let ok = c.is_alphanumeric() || c == '_' || (ALLOW_DOT && c == '.');
        if !ok {
            return false;
        }
    }
    shove_name(s, Role::Column) >> HASH_SHIFT != 0
}

/// Case-folds `s` to upper case, hashes it with a stable 64-bit hash, and
/// shifts it into the name-hash field, ORing in the table-role bit iff
/// `role == Table`.
pub fn shove_name(s: &str, role: Role) -> Shove {
    let folded = s.to_uppercase();
    let hash = xxh3_64_with_seed(folded.as_bytes(), crate::limits::SCHEMA_CHECKSEED);
    let mut shove = (hash << HASH_SHIFT) & (!0u64 << HASH_SHIFT);
    if matches!(role, Role::Table) {
        shove |= IS_TABLE_BIT;
    }
    shove
}

/// Packs a column's name-hash (taken from `name_shove`), `data_type`, and
/// `index_type` into a single column shove (`is_table` bit left clear).
/// `nullable` is only meaningful when `index_type == IndexType::NoIndex`;
/// nullability of indexed columns is carried by the `IndexType` variant.
pub fn column_shove(name_shove: Shove, data_type: DataType, index_type: IndexType, nullable: bool) -> Shove {
    let hash_part = name_shove & (!0u64 << HASH_SHIFT);
    let mut low = (index_type.tag() << INDEX_SHIFT) | data_type.tag();
    if !index_type.is_indexed() && nullable {
        low |= NONINDEXED_NULLABLE_BIT;
    }
    hash_part | low
}

/// True iff a non-indexed column shove was described as nullable. Always
/// `false` for indexed columns (see `IndexType::is_nullable`).
pub fn is_noindex_nullable(shove: Shove) -> bool {
    shove & NONINDEXED_NULLABLE_BIT != 0
}

/// Packs a table's name-hash into a table shove (`is_table` bit set).
pub fn table_shove(name_shove: Shove) -> Shove {
    (name_shove & (!0u64 << HASH_SHIFT)) | IS_TABLE_BIT
}

pub fn is_table_shove(shove: Shove) -> bool {
    shove & IS_TABLE_BIT != 0
}

pub fn shove_index_type(shove: Shove) -> Option<IndexType> {
    IndexType::from_tag((shove & INDEX_MASK) >> INDEX_SHIFT)
}

pub fn shove_data_type(shove: Shove) -> Option<DataType> {
    match shove & DATA_TYPE_MASK {
        0 => Some(DataType::Bool),
        1 => Some(DataType::Uint64),
        2 => Some(DataType::Int64),
        3 => Some(DataType::Double),
        4 => Some(DataType::String),
        5 => Some(DataType::Bytes),
        _ => None,
    }
}

/// Two shoves are name-equal iff their hash and role bits agree.
pub fn name_equal(a: Shove, b: Shove) -> bool {
    a & NAME_MASK == b & NAME_MASK
}

/// Derives a `DbiShove` from a table-shove: strips `is_table` and folds the
/// column ordinal (0 = primary, 1..N = secondary) into the low byte.
pub fn dbi_shove(table_shove: Shove, ordinal: u8) -> DbiShove {
    (table_shove & !IS_TABLE_BIT & !TYPE_MASK) | ordinal as u64
}

const ALPHABET: &[u8; 64] = b"@0123456789qwertyuiopasdfghjklzxcvbnmQWERTYUIOPASDFGHJKLZXCVBNM_";

/// Renders `shove` as a short textual sub-DB name: base-64 over `ALPHABET`,
/// least-significant 6-bit group first, stopping once the remainder is zero.
/// The all-zero shove renders as `"@"` (a single zero group), matching the
/// reference's catalog sub-DB name.
pub fn shove_to_dbiname(shove: Shove) -> String {
    let mut value = shove;
    let mut out = Vec::with_capacity(11);
    loop {
        let group = (value & 0x3F) as usize;
        out.push(ALPHABET[group]);
        value >>= 6;
        if value == 0 {
            break;
        }
    }
    String::from_utf8(out).expect("alphabet is ASCII")
}

pub fn validate_identifier_or_einval(s: &str) -> Result<()> {
    if validate_name(s) {
        Ok(())
    } else {
        Err(Error::Einval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn validate_name_rejects_empty_and_leading_digit() {
        assert!(!validate_name(""));
        assert!(!validate_name("1abc"));
    }

    #[test]
    fn validate_name_accepts_underscore_and_alnum() {
        assert!(validate_name("_hidden"));
        assert!(validate_name("Table1"));
    }

    #[test]
    fn validate_name_rejects_dot_by_default() {
        assert!(!validate_name("a.b"));
    }

    #[test]
    fn validate_name_implies_nonzero_column_hash() {
        for s in ["T", "orders", "_x", "Col42"] {
            assert!(validate_name(s));
            assert_ne!(shove_name(s, Role::Column) & (!0u64 << HASH_SHIFT), 0);
        }
    }

    #[test]
    fn shove_name_is_case_insensitive() {
        assert_eq!(shove_name("orders", Role::Table), shove_name("ORDERS", Role::Table));
        assert_eq!(shove_name("Orders", Role::Column), shove_name("orDERS", Role::Column));
    }

    #[test]
    fn table_role_bit_distinguishes_table_from_column() {
        let table = shove_name("T", Role::Table);
        let column = shove_name("T", Role::Column);
        assert!(is_table_shove(table));
        assert!(!is_table_shove(column));
        assert!(name_equal(table, table_shove(column)));
    }

    #[test]
    fn shove_to_dbiname_uses_only_alphabet_characters() {
        let alphabet: HashSet<u8> = ALPHABET.iter().copied().collect();
        for shove in [0u64, 1, 42, u64::MAX, 0xDEAD_BEEF_0000_0001] {
            let name = shove_to_dbiname(shove);
            assert!(name.len() <= 11);
            assert!(name.bytes().all(|b| alphabet.contains(&b)));
        }
    }

    #[test]
    fn shove_to_dbiname_zero_is_at_sign() {
        assert_eq!(shove_to_dbiname(0), "@");
    }

    #[test]
    fn shove_to_dbiname_is_injective_on_a_sample() {
        let mut seen = HashSet::new();
        for i in 0..5000u64 {
            let shove = i.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(i);
            let name = shove_to_dbiname(shove);
            assert!(seen.insert(name));
        }
    }

    #[test]
    fn dbi_shove_strips_table_bit_and_encodes_ordinal() {
        let table = table_shove(shove_name("T", Role::Column));
        assert!(is_table_shove(table));
        let primary = dbi_shove(table, 0);
        let secondary = dbi_shove(table, 1);
        assert_ne!(primary, secondary);
        assert!(!is_table_shove(primary));
    }

    #[test]
    fn column_shove_roundtrips_data_type_and_index_type() {
        let name = shove_name("v", Role::Column);
        let cs = column_shove(name, DataType::String, IndexType::SecondaryWithDupsOrderedObverse, false);
        assert_eq!(shove_data_type(cs), Some(DataType::String));
        assert_eq!(shove_index_type(cs), Some(IndexType::SecondaryWithDupsOrderedObverse));
        assert!(name_equal(cs, name));
    }
}
