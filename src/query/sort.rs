// ============================================================================
// Record sorting
// ============================================================================
//
// - Multi-key sorting, keys applied in sequence
// - Stable sort: ties keep underlying storage order
// - NULLS LAST for ascending keys, NULLS FIRST for descending (overridable)
//
// ============================================================================

use crate::core::{EntitySchema, Record, Result, StoreError, Value};
use std::cmp::Ordering;

/// Strategy for placing NULL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    /// ASC -> NULLS LAST, DESC -> NULLS FIRST
    pub fn default_for_direction(descending: bool) -> Self {
        if descending {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

/// One sort key: a field and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
    pub null_ordering: NullOrdering,
}

impl SortKey {
    pub fn new(field: impl Into<String>, descending: bool) -> Self {
        Self {
            field: field.into(),
            descending,
            null_ordering: NullOrdering::default_for_direction(descending),
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, false)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, true)
    }

    pub fn with_null_ordering(mut self, null_ordering: NullOrdering) -> Self {
        self.null_ordering = null_ordering;
        self
    }

    pub fn validate(&self, schema: &EntitySchema) -> Result<()> {
        schema.require_field(&self.field).map(|_| ())
    }
}

/// Compares records by a list of sort keys.
pub struct RecordComparator<'a> {
    sort_keys: &'a [SortKey],
}

impl<'a> RecordComparator<'a> {
    pub fn new(sort_keys: &'a [SortKey]) -> Self {
        Self { sort_keys }
    }

    pub fn compare(&self, left: &Record, right: &Record) -> Result<Ordering> {
        for key in self.sort_keys {
            let ordering = compare_values(left.get(&key.field), right.get(&key.field), key)?;
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }
}

fn compare_values(left: &Value, right: &Value, key: &SortKey) -> Result<Ordering> {
    // NULL placement is absolute: it is not reversed by the direction.
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => {
            return Ok(match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            });
        }
        (false, true) => {
            return Ok(match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            });
        }
        (false, false) => {}
    }

    let ordering = left.compare(right)?;
    Ok(if key.descending {
        ordering.reverse()
    } else {
        ordering
    })
}

/// Stable-sort records in place.
///
/// The first comparison error aborts the sort result (the slice is left in
/// an unspecified order).
pub fn sort_records(records: &mut [Record], sort_keys: &[SortKey]) -> Result<()> {
    if records.len() < 2 || sort_keys.is_empty() {
        return Ok(());
    }

    let comparator = RecordComparator::new(sort_keys);
    let mut failure: Option<StoreError> = None;
    records.sort_by(|left, right| match comparator.compare(left, right) {
        Ok(ordering) => ordering,
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldValues, ObjectId};

    fn record(id: u64, score: Option<i64>, name: &str) -> Record {
        let mut values = FieldValues::new();
        values.insert("score".into(), Value::from(score));
        values.insert("name".into(), Value::from(name));
        Record::new(ObjectId(id), values)
    }

    fn ids(records: &[Record]) -> Vec<u64> {
        records.iter().map(|r| r.id.as_u64()).collect()
    }

    #[test]
    fn test_null_ordering_defaults() {
        assert_eq!(NullOrdering::default_for_direction(false), NullOrdering::NullsLast);
        assert_eq!(NullOrdering::default_for_direction(true), NullOrdering::NullsFirst);
    }

    #[test]
    fn test_sort_ascending_nulls_last() {
        let mut records = vec![record(0, None, "a"), record(1, Some(2), "b"), record(2, Some(1), "c")];
        sort_records(&mut records, &[SortKey::ascending("score")]).unwrap();
        assert_eq!(ids(&records), vec![2, 1, 0]);
    }

    #[test]
    fn test_sort_descending_nulls_first() {
        let mut records = vec![record(0, Some(1), "a"), record(1, None, "b"), record(2, Some(3), "c")];
        sort_records(&mut records, &[SortKey::descending("score")]).unwrap();
        assert_eq!(ids(&records), vec![1, 2, 0]);
    }

    #[test]
    fn test_multi_key_and_stability() {
        let mut records = vec![
            record(0, Some(1), "b"),
            record(1, Some(1), "a"),
            record(2, Some(0), "z"),
            record(3, Some(1), "a"),
        ];
        sort_records(
            &mut records,
            &[SortKey::ascending("score"), SortKey::ascending("name")],
        )
        .unwrap();
        // 1 and 3 tie on both keys and keep their original order
        assert_eq!(ids(&records), vec![2, 1, 3, 0]);
    }

    #[test]
    fn test_sort_type_error_is_reported() {
        let mut bad = record(1, Some(1), "x");
        bad.values.insert("score".into(), Value::Text("oops".into()));
        let mut records = vec![record(0, Some(1), "a"), bad];
        let err = sort_records(&mut records, &[SortKey::ascending("score")]).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch(_)));
    }
}
