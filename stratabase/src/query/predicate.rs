//! Typed single-column predicates
//!
//! The predicate factory turns condition descriptors into typed predicate
//! objects specialized to the column's physical type. Segments evaluate them
//! against column batches while materializing blocks; rows filtered here are
//! counted, never surfaced. Operators the factory cannot express stay with
//! the upstream conjunct evaluator.

use std::collections::BTreeSet;

use crate::data::CellValue;
use crate::query::conditions::Condition;
use crate::table::{AggregationMethod, TabletSchema};
use crate::{Result, StorageError};

#[derive(Debug, Clone)]
pub enum ColumnPredicate {
    Eq { column_id: u32, value: CellValue },
    Lt { column_id: u32, value: CellValue },
    Le { column_id: u32, value: CellValue },
    Gt { column_id: u32, value: CellValue },
    Ge { column_id: u32, value: CellValue },
    InList {
        column_id: u32,
        values: BTreeSet<CellValue>,
    },
    IsNull { column_id: u32, is_null: bool },
}

impl ColumnPredicate {
    pub fn column_id(&self) -> u32 {
        match self {
            ColumnPredicate::Eq { column_id, .. }
            | ColumnPredicate::Lt { column_id, .. }
            | ColumnPredicate::Le { column_id, .. }
            | ColumnPredicate::Gt { column_id, .. }
            | ColumnPredicate::Ge { column_id, .. }
            | ColumnPredicate::InList { column_id, .. }
            | ColumnPredicate::IsNull { column_id, .. } => *column_id,
        }
    }

    /// Evaluate against one cell. Comparisons never match null cells.
    pub fn matches(&self, value: &CellValue) -> bool {
        match self {
            ColumnPredicate::IsNull { is_null, .. } => value.is_null() == *is_null,
            _ if value.is_null() => false,
            ColumnPredicate::Eq { value: operand, .. } => value == operand,
            ColumnPredicate::Lt { value: operand, .. } => value < operand,
            ColumnPredicate::Le { value: operand, .. } => value <= operand,
            ColumnPredicate::Gt { value: operand, .. } => value > operand,
            ColumnPredicate::Ge { value: operand, .. } => value >= operand,
            ColumnPredicate::InList { values, .. } => values.contains(value),
        }
    }

    /// Evaluate against a column batch, narrowing the selection bitmap.
    pub fn evaluate(&self, values: &[CellValue], selection: &mut [bool]) {
        for (i, value) in values.iter().enumerate() {
            if selection[i] && !self.matches(value) {
                selection[i] = false;
            }
        }
    }

    /// Equality operands probed against segment bloom filters; `None` for
    /// predicates a bloom filter cannot answer.
    pub fn bloom_probe_values(&self) -> Option<Vec<&CellValue>> {
        match self {
            ColumnPredicate::Eq { value, .. } => Some(vec![value]),
            ColumnPredicate::InList { values, .. } => Some(values.iter().collect()),
            _ => None,
        }
    }
}

/// Compile one condition descriptor into a typed predicate, or `None` when
/// the operator is left to the upstream evaluator.
pub fn parse_to_predicate(
    schema: &TabletSchema,
    condition: &Condition,
) -> Result<Option<ColumnPredicate>> {
    let column = schema
        .column_by_name(&condition.column_name)
        .ok_or_else(|| StorageError::ColumnNotFound(condition.column_name.clone()))?;
    // aggregated columns hold partial states and cannot be filtered early
    if column.aggregation != AggregationMethod::None {
        return Ok(None);
    }

    let column_id = column.id;
    let parse = |text: &String| CellValue::parse(column.field_type, column.length, text);
    let first = || {
        condition.values.first().ok_or_else(|| {
            StorageError::InvalidParameter(format!(
                "condition on column {} has no operand",
                column.name
            ))
        })
    };

    let predicate = match condition.op.as_str() {
        "*=" if condition.values.len() > 1 => {
            let values: BTreeSet<CellValue> = condition
                .values
                .iter()
                .map(parse)
                .collect::<Result<BTreeSet<_>>>()?;
            ColumnPredicate::InList { column_id, values }
        }
        "*=" => ColumnPredicate::Eq {
            column_id,
            value: parse(first()?)?,
        },
        "<<" => ColumnPredicate::Lt {
            column_id,
            value: parse(first()?)?,
        },
        "<=" => ColumnPredicate::Le {
            column_id,
            value: parse(first()?)?,
        },
        ">>" => ColumnPredicate::Gt {
            column_id,
            value: parse(first()?)?,
        },
        ">=" => ColumnPredicate::Ge {
            column_id,
            value: parse(first()?)?,
        },
        "is" => ColumnPredicate::IsNull {
            column_id,
            is_null: first()?.eq_ignore_ascii_case("null"),
        },
        // not-equal and not-in are re-applied upstream
        _ => return Ok(None),
    };
    Ok(Some(predicate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FieldType;
    use crate::table::{ColumnMeta, KeysType};

    fn test_schema() -> TabletSchema {
        TabletSchema::new(
            KeysType::AggKeys,
            vec![
                ColumnMeta::key(0, "id", FieldType::BigInt),
                ColumnMeta::key(1, "tag", FieldType::Char).with_length(4),
                ColumnMeta::value(2, "total", FieldType::BigInt, AggregationMethod::Sum),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_eq_and_in_split() {
        let schema = test_schema();
        let pred = parse_to_predicate(&schema, &Condition::new("id", "*=", &["5"]))
            .unwrap()
            .unwrap();
        assert!(matches!(pred, ColumnPredicate::Eq { .. }));
        assert!(pred.matches(&CellValue::BigInt(5)));
        assert!(!pred.matches(&CellValue::BigInt(6)));

        let pred = parse_to_predicate(&schema, &Condition::new("id", "*=", &["1", "2", "3"]))
            .unwrap()
            .unwrap();
        assert!(matches!(pred, ColumnPredicate::InList { .. }));
        assert!(pred.matches(&CellValue::BigInt(2)));
        assert!(!pred.matches(&CellValue::BigInt(4)));
    }

    #[test]
    fn test_ordered_ops() {
        let schema = test_schema();
        for (op, hit, miss) in [
            ("<<", 4i64, 5i64),
            ("<=", 5, 6),
            (">>", 6, 5),
            (">=", 5, 4),
        ] {
            let pred = parse_to_predicate(&schema, &Condition::new("id", op, &["5"]))
                .unwrap()
                .unwrap();
            assert!(pred.matches(&CellValue::BigInt(hit)), "op {}", op);
            assert!(!pred.matches(&CellValue::BigInt(miss)), "op {}", op);
            assert!(!pred.matches(&CellValue::Null), "op {}", op);
        }
    }

    #[test]
    fn test_is_null() {
        let schema = test_schema();
        let pred = parse_to_predicate(&schema, &Condition::new("id", "is", &["null"]))
            .unwrap()
            .unwrap();
        assert!(pred.matches(&CellValue::Null));
        assert!(!pred.matches(&CellValue::BigInt(1)));

        let pred = parse_to_predicate(&schema, &Condition::new("id", "is", &["not null"]))
            .unwrap()
            .unwrap();
        assert!(!pred.matches(&CellValue::Null));
        assert!(pred.matches(&CellValue::BigInt(1)));
    }

    #[test]
    fn test_char_operand_padding() {
        let schema = test_schema();
        let pred = parse_to_predicate(&schema, &Condition::new("tag", "*=", &["ab"]))
            .unwrap()
            .unwrap();
        // stored char cells carry the schema-length padding
        assert!(pred.matches(&CellValue::Char("ab\0\0".to_string())));
        assert!(!pred.matches(&CellValue::Char("ab".to_string())));
    }

    #[test]
    fn test_aggregated_column_not_pushed() {
        let schema = test_schema();
        let pred = parse_to_predicate(&schema, &Condition::new("total", "*=", &["5"])).unwrap();
        assert!(pred.is_none());
    }

    #[test]
    fn test_unknown_op_not_pushed() {
        let schema = test_schema();
        let pred = parse_to_predicate(&schema, &Condition::new("id", "!*=", &["5"])).unwrap();
        assert!(pred.is_none());
    }

    #[test]
    fn test_unknown_column_is_error() {
        let schema = test_schema();
        let err = parse_to_predicate(&schema, &Condition::new("ghost", "*=", &["5"]));
        assert!(matches!(err, Err(StorageError::ColumnNotFound(_))));
    }

    #[test]
    fn test_evaluate_narrows_selection() {
        let schema = test_schema();
        let pred = parse_to_predicate(&schema, &Condition::new("id", ">=", &["3"]))
            .unwrap()
            .unwrap();
        let column = vec![
            CellValue::BigInt(1),
            CellValue::BigInt(3),
            CellValue::BigInt(5),
        ];
        let mut selection = vec![true, false, true];
        pred.evaluate(&column, &mut selection);
        assert_eq!(selection, vec![false, false, true]);
    }
}
