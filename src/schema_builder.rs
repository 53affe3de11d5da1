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

//! Column-set accumulation and validation: `describe_column`, `validate_set`,
//! `validate_defs`, matching the ordering invariants of §3/§4.4.

use crate::error::{Error, Result};
use crate::limits::{MAX_COLS, MAX_INDEXES};
use crate::shove::{
    self, column_shove, name_equal, shove_data_type, shove_index_type, validate_name, DataType, IndexType, Role, Shove,
};

/// Ordered sequence of up to `MAX_COLS` column shoves, position 0 reserved
/// for the primary-key column (or the sole column, if none is indexed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    shoves: Vec<Shove>,
}

impl ColumnSet {
    pub fn new() -> ColumnSet {
        ColumnSet { shoves: Vec::new() }
    }

    pub fn count(&self) -> usize {
        self.shoves.len()
    }

    pub fn as_slice(&self) -> &[Shove] {
        &self.shoves
    }

    pub fn primary(&self) -> Option<Shove> {
        self.shoves.first().copied()
    }
}

/// Minimum variable-width byte length a reverse index is well-defined over,
/// absent an explicit ordered-comparator override.
const MIN_REVERSE_VARWIDTH_LEN: usize = 12;

fn reverse_is_well_defined(data_type: DataType, index_type: IndexType) -> bool {
    if !index_type.is_reverse() {
        return true;
    }
    if index_type.is_nullable() {
        return true;
    }
    // A reverse index's ordering is only well-defined over a wide enough
    // key: variable-width types qualify unconditionally, fixed-width types
    // only at or above `MIN_REVERSE_VARWIDTH_LEN` bytes. `is_ordered` does
    // not exempt a narrow fixed-width type from this check.
    match data_type.fixed_width() {
        Some(width) => width >= MIN_REVERSE_VARWIDTH_LEN,
        None => true,
    }
}

/// Describes a new column and inserts it into `set` at the position §4.4
/// dictates. Does not sort; `validate_set` performs the final ordering pass.
pub fn describe_column(
    name: &str,
    data_type: DataType,
    index_type: IndexType,
    nullable: bool,
    set: &mut ColumnSet,
) -> Result<()> {
    if !validate_name(name) {
        return Err(Error::Einval);
    }
    if !reverse_is_well_defined(data_type, index_type) {
        return Err(Error::Einval);
    }

    let name_shove = shove::shove_name(name, Role::Column);
    let candidate = column_shove(name_shove, data_type, index_type, nullable);

    if set.shoves.iter().any(|s| name_equal(*s, candidate)) {
        return Err(Error::Eexist);
    }

    if index_type.is_primary() {
        if !set.shoves.is_empty() {
            return Err(Error::Eexist);
        }
        set.shoves.push(candidate);
    } else {
        if index_type.is_secondary() {
            // A secondary may be described before any primary exists yet
            // (it reserves position 0 below); it's only rejected once a
            // non-unique primary is already in place.
            if let Some(pk) = set.shoves.first() {
                let pk_index = shove_index_type(*pk).ok_or(Error::Einval)?;
                if !pk_index.is_unique() {
                    return Err(Error::Einval);
                }
            }
        }
        let insert_at = set.shoves.len().max(1);
        if insert_at > set.shoves.len() {
            set.shoves.push(candidate);
        } else {
            set.shoves.insert(insert_at, candidate);
        }
    }

    if set.shoves.len() > MAX_COLS {
        set.shoves.pop();
        return Err(Error::TooMany);
    }
    Ok(())
}

fn weight(shove: Shove) -> u8 {
    match shove_index_type(shove) {
        Some(index_type) if index_type.is_indexed() => 3,
        _ if shove::is_noindex_nullable(shove) => 1,
        _ => 0,
    }
}

/// Stable-sorts positions `[1..count)` by descending weight (indexed=3,
/// nullable-non-indexed=1, plain=0), then validates the result.
pub fn validate_set(set: &mut ColumnSet) -> Result<()> {
    if set.shoves.is_empty() {
        return Err(Error::Einval);
    }
    let (head, tail) = set.shoves.split_at_mut(1);
    let _ = head;
    tail.sort_by(|a, b| weight(*b).cmp(&weight(*a)));
    validate_defs(&set.shoves)
}

/// Enforces the invariants of §3 over a fully-ordered column list: PK only
/// at position 0, indexed columns form a prefix of `1..`, secondary indexes
/// require a unique PK, index count bounded, no name-equal duplicates.
pub fn validate_defs(defs: &[Shove]) -> Result<()> {
    if defs.is_empty() || defs.len() > MAX_COLS {
        return Err(if defs.is_empty() { Error::Einval } else { Error::TooMany });
    }

    for i in 0..defs.len() {
        for j in (i + 1)..defs.len() {
            if name_equal(defs[i], defs[j]) {
                return Err(Error::Eexist);
            }
        }
    }

    let pk_index_type = shove_index_type(defs[0]).ok_or(Error::Einval)?;
    for (i, shove) in defs.iter().enumerate().skip(1) {
        let index_type = shove_index_type(*shove).ok_or(Error::Einval)?;
        if index_type.is_primary() {
            return Err(Error::Einval);
        }
        if index_type.is_secondary() && !pk_index_type.is_unique() {
            return Err(Error::Einval);
        }
        // Data-type range check. The reference implementation
        // (`fpta_column_def_validate`, schema.cxx:536) returns a bare
        // `false` instead of a typed error for a data type outside the
        // valid enumerated range; here it is a proper `EINVAL`.
        if shove_data_type(*shove).is_none() {
            return Err(Error::Einval);
        }
        let _ = i;
    }

    let indexed_count = defs.iter().filter(|s| is_indexed_shove(s)).count();
    if indexed_count > MAX_INDEXES {
        return Err(Error::TooMany);
    }

    let mut seen_noindex = false;
    for shove in defs.iter().skip(1) {
        if is_indexed_shove(shove) {
            if seen_noindex {
                return Err(Error::Einval);
            }
        } else {
            seen_noindex = true;
        }
    }

    Ok(())
}

fn is_indexed_shove(shove: &Shove) -> bool {
    shove_index_type(*shove).map(IndexType::is_indexed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shove::IndexType::*;

    fn describe(set: &mut ColumnSet, name: &str, dt: DataType, idx: IndexType) -> Result<()> {
        describe_column(name, dt, idx, false, set)
    }

    #[test]
    fn describe_then_validate_builds_accepted_set() {
        let mut set = ColumnSet::new();
        describe(&mut set, "pk", DataType::Uint64, PrimaryUniqueOrderedObverse).unwrap();
        describe(&mut set, "v", DataType::String, SecondaryWithDupsOrderedObverse).unwrap();
        describe_column("note", DataType::String, NoIndex, false, &mut set).unwrap();

        validate_set(&mut set).unwrap();
        assert_eq!(set.count(), 3);
        validate_defs(set.as_slice()).unwrap();
    }

    #[test]
    fn adding_primary_twice_is_eexist() {
        let mut set = ColumnSet::new();
        describe(&mut set, "pk", DataType::Uint64, PrimaryUniqueOrderedObverse).unwrap();
        let err = describe(&mut set, "pk2", DataType::Uint64, PrimaryUniqueOrderedObverse).unwrap_err();
        assert_eq!(err, Error::Eexist);
    }

    #[test]
    fn secondary_over_nonunique_primary_is_einval() {
        let mut set = ColumnSet::new();
        describe(&mut set, "pk", DataType::Uint64, PrimaryWithDupsOrderedObverse).unwrap();
        let err = describe(&mut set, "s", DataType::Uint64, SecondaryUniqueOrderedObverse).unwrap_err();
        assert_eq!(err, Error::Einval);
    }

    #[test]
    fn secondary_before_any_primary_is_accepted() {
        // No primary has been described yet; the secondary reserves
        // position 0 rather than being rejected outright.
        let mut set = ColumnSet::new();
        describe(&mut set, "s", DataType::Uint64, SecondaryUniqueOrderedObverse).unwrap();
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn reverse_ordered_narrow_integer_is_einval() {
        // `is_ordered()` must not exempt a narrow fixed-width type from the
        // reverse-index width check.
        let mut set = ColumnSet::new();
        let err = describe(&mut set, "r", DataType::Uint64, PrimaryUniqueOrderedReverse).unwrap_err();
        assert_eq!(err, Error::Einval);
    }

    #[rstest::rstest(
        data_type,
        index_type,
        expect_ok,
        case::narrow_ordered_reverse_integer(DataType::Uint64, PrimaryUniqueOrderedReverse, false),
        case::narrow_ordered_reverse_double(DataType::Double, SecondaryUniqueOrderedReverse, false),
        case::nullable_narrow_reverse_is_exempt(DataType::Uint64, PrimaryUniqueOrderedReverseNullable, true),
        case::variable_width_reverse_is_exempt(DataType::String, SecondaryUniqueOrderedReverse, true),
        case::obverse_index_unaffected(DataType::Uint64, PrimaryUniqueOrderedObverse, true)
    )]
    fn reverse_well_definedness_depends_on_width_not_just_ordering(
        data_type: DataType,
        index_type: IndexType,
        expect_ok: bool,
    ) {
        let mut set = ColumnSet::new();
        let result = describe(&mut set, "col", data_type, index_type);
        assert_eq!(result.is_ok(), expect_ok);
    }

    #[test]
    fn reverse_over_unordered_nonnullable_integer_is_einval() {
        // An unordered, non-nullable reverse index has no well-defined
        // ordering over a fixed-width integer and has no variant in the
        // closed `IndexType` set (the set only offers the nullable unordered
        // reverse combinations); forging its raw tag must still surface
        // `EINVAL` rather than panicking or succeeding.
        let pk = shove::column_shove(
            shove::shove_name("pk", Role::Column),
            DataType::Uint64,
            PrimaryUniqueOrderedObverse,
            false,
        );
        let forged_unordered_reverse_nonnullable_tag = 28u64;
        let bad = shove::column_shove(
            shove::shove_name("r", Role::Column),
            DataType::Int64,
            SecondaryUniqueOrderedObverse,
            false,
        ) & !0x7F00u64
            | (forged_unordered_reverse_nonnullable_tag << 8);

        assert_eq!(validate_defs(&[pk, bad]).unwrap_err(), Error::Einval);
    }

    #[test]
    fn duplicate_name_is_eexist() {
        let mut set = ColumnSet::new();
        describe(&mut set, "pk", DataType::Uint64, PrimaryUniqueOrderedObverse).unwrap();
        let err = describe(&mut set, "pk", DataType::Uint64, NoIndex).unwrap_err();
        assert_eq!(err, Error::Eexist);
    }

    #[test]
    fn too_many_columns_is_toomany() {
        let mut set = ColumnSet::new();
        describe(&mut set, "pk", DataType::Uint64, PrimaryUniqueOrderedObverse).unwrap();
        for i in 0..(MAX_COLS) {
            let name = format!("c{}", i);
            let _ = describe_column(&name, DataType::Uint64, NoIndex, false, &mut set);
        }
        assert_eq!(set.count(), MAX_COLS);
    }

    #[test]
    fn order_preserving_validate_set_matches_weight_rule() {
        let mut set = ColumnSet::new();
        describe(&mut set, "pk", DataType::Uint64, PrimaryUniqueOrderedObverse).unwrap();
        describe_column("a", DataType::String, NoIndex, false, &mut set).unwrap();
        describe(&mut set, "b", DataType::String, SecondaryWithDupsOrderedObverse).unwrap();
        describe_column("c", DataType::String, NoIndex, true, &mut set).unwrap();

        validate_set(&mut set).unwrap();

        let names = set.as_slice();
        assert!(weight(names[1]) >= weight(names[2]));
        assert!(weight(names[2]) >= weight(names[3]));
    }

    #[test]
    fn data_type_out_of_range_regression_is_einval_not_bool() {
        // Regression for the reference implementation's `return false;` bug
        // in `fpta_column_def_validate` (schema.cxx:536): an out-of-range
        // data type tag must surface a typed `EINVAL`, not merely fail some
        // boolean check the caller has no way to distinguish from other
        // failures.
        let mut defs = vec![shove::column_shove(
            shove::shove_name("pk", Role::Column),
            DataType::Uint64,
            PrimaryUniqueOrderedObverse,
            false,
        )];
        // Forge an out-of-range data-type tag into a secondary column shove.
        let bad = shove::column_shove(
            shove::shove_name("bad", Role::Column),
            DataType::Uint64,
            SecondaryUniqueOrderedObverse,
            false,
        ) | 0x06; // data type tag 6 is outside the closed DataType set (0..=5)
        defs.push(bad);

        assert_eq!(validate_defs(&defs).unwrap_err(), Error::Einval);
    }
}
