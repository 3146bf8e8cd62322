//! Predicate evaluation against in-memory rows.

use super::row::Row;
use super::statement::{Predicate, SortOrder};
use super::value::SqlValue;
use std::cmp::Ordering;

impl Predicate {
    /// Three-valued SQL logic collapsed to `true` / not-`true`.
    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(self.column()).unwrap_or(&SqlValue::Null);
        match self {
            Predicate::Eq(_, v) => value.sql_eq(v),
            Predicate::In(_, vs) => vs.iter().any(|v| value.sql_eq(v)),
            Predicate::IsNull(_) => value.is_null(),
            Predicate::IsNotNull(_) => !value.is_null(),
            Predicate::Lt(_, v) => value.compare(v) == Some(Ordering::Less),
            Predicate::Le(_, v) => matches!(
                value.compare(v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Gt(_, v) => value.compare(v) == Some(Ordering::Greater),
            Predicate::Ge(_, v) => matches!(
                value.compare(v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::ArrayContains(_, v) => match (value, v) {
                (SqlValue::TextArray(items), SqlValue::Text(needle)) => items.contains(needle),
                _ => false,
            },
            Predicate::ArrayOverlaps(_, vs) => match value {
                SqlValue::TextArray(items) => items.iter().any(|i| vs.contains(i)),
                _ => false,
            },
        }
    }
}

/// True when every predicate holds.
pub fn matches_all(filter: &[Predicate], row: &Row) -> bool {
    filter.iter().all(|p| p.matches(row))
}

/// Sort rows by `ORDER BY` keys. `NULL` sorts last, as in Postgres ascending order.
pub fn sort_rows(rows: &mut [Row], order_by: &[(&'static str, SortOrder)]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for (column, order) in order_by {
            let left = a.value_or_null(column);
            let right = b.value_or_null(column);
            let ord = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => left.compare(&right).unwrap_or(Ordering::Equal),
            };
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
