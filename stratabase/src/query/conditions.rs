//! Pushed-down scan conditions
//!
//! Conditions arrive as textual descriptors `{column_name, op, values}` and
//! compile into typed per-column conjunctions. The compiled form serves two
//! consumers: segment zone-map pruning (three-way evaluation against a
//! column's min/max) and the delete handler (single-row evaluation). Typed
//! single-column predicates for block-level filtering are a separate,
//! narrower compilation; see `query::predicate`.

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::data::CellValue;
use crate::table::{ColumnMeta, TabletSchema};
use crate::{Result, StorageError};

/// `IN` lists at least this large no longer qualify a column for bloom
/// filter probing.
pub const MAX_OP_IN_FIELD_NUM: usize = 100;

/// External condition descriptor.
///
/// `op` is one of `*=` (equality, or IN with several values), `!*=`
/// (inequality / NOT IN), `<<`, `<=`, `>>`, `>=`, `is`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column_name: String,
    pub op: String,
    pub values: Vec<String>,
}

impl Condition {
    pub fn new(column_name: impl Into<String>, op: impl Into<String>, values: &[&str]) -> Self {
        Condition {
            column_name: column_name.into(),
            op: op.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

/// Per-column min/max over non-null cells, plus a null marker. `range` is
/// `None` when the column holds no non-null cell.
#[derive(Debug, Clone)]
pub struct ZoneMap {
    pub has_null: bool,
    pub range: Option<(CellValue, CellValue)>,
}

/// Three-way result of evaluating a condition against a zone map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneEval {
    /// Every row in the zone matches.
    All,
    /// Some rows may match.
    Some,
    /// No row in the zone matches.
    None,
}

/// One compiled condition on one column.
#[derive(Debug, Clone)]
pub struct Cond {
    pub op: CondOp,
    pub operands: Vec<CellValue>,
}

impl Cond {
    pub fn compile(column: &ColumnMeta, op: &str, values: &[String]) -> Result<Cond> {
        let parse = |text: &String| CellValue::parse(column.field_type, column.length, text);
        let first = || {
            values.first().ok_or_else(|| {
                StorageError::InvalidParameter(format!(
                    "condition on column {} has no operand",
                    column.name
                ))
            })
        };
        let (op, operands) = match op {
            "*=" if values.len() > 1 => (CondOp::In, values.iter().map(parse).collect()),
            "*=" => (CondOp::Eq, parse(first()?).map(|v| vec![v])),
            "!*=" if values.len() > 1 => (CondOp::NotIn, values.iter().map(parse).collect()),
            "!*=" => (CondOp::Ne, parse(first()?).map(|v| vec![v])),
            "<<" => (CondOp::Lt, parse(first()?).map(|v| vec![v])),
            "<=" => (CondOp::Le, parse(first()?).map(|v| vec![v])),
            ">>" => (CondOp::Gt, parse(first()?).map(|v| vec![v])),
            ">=" => (CondOp::Ge, parse(first()?).map(|v| vec![v])),
            "is" => {
                let op = if first()?.eq_ignore_ascii_case("null") {
                    CondOp::IsNull
                } else {
                    CondOp::IsNotNull
                };
                (op, Ok(Vec::new()))
            }
            other => {
                return Err(StorageError::InvalidParameter(format!(
                    "unsupported condition op: {}",
                    other
                )))
            }
        };
        Ok(Cond {
            op,
            operands: operands?,
        })
    }

    /// Evaluate against one cell. Ordered and negative comparisons never
    /// match null cells.
    pub fn matches(&self, value: &CellValue) -> bool {
        match self.op {
            CondOp::IsNull => value.is_null(),
            CondOp::IsNotNull => !value.is_null(),
            _ if value.is_null() => false,
            CondOp::Eq => value == &self.operands[0],
            CondOp::Ne => value != &self.operands[0],
            CondOp::Lt => value < &self.operands[0],
            CondOp::Le => value <= &self.operands[0],
            CondOp::Gt => value > &self.operands[0],
            CondOp::Ge => value >= &self.operands[0],
            CondOp::In => self.operands.contains(value),
            CondOp::NotIn => !self.operands.contains(value),
        }
    }

    /// Evaluate against a zone map without touching rows.
    pub fn eval_zone(&self, zone: &ZoneMap) -> ZoneEval {
        let (min, max) = match (&self.op, &zone.range) {
            (CondOp::IsNull, None) => return ZoneEval::All,
            (CondOp::IsNull, Some(_)) if !zone.has_null => return ZoneEval::None,
            (CondOp::IsNull, Some(_)) => return ZoneEval::Some,
            (CondOp::IsNotNull, None) => return ZoneEval::None,
            (CondOp::IsNotNull, Some(_)) if !zone.has_null => return ZoneEval::All,
            (CondOp::IsNotNull, Some(_)) => return ZoneEval::Some,
            // all remaining ops never match null cells
            (_, None) => return ZoneEval::None,
            (_, Some((min, max))) => (min, max),
        };
        let pure = !zone.has_null;
        match self.op {
            CondOp::Eq => {
                let v = &self.operands[0];
                if v < min || v > max {
                    ZoneEval::None
                } else if pure && min == max {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::Ne => {
                let v = &self.operands[0];
                if min == max && v == min {
                    ZoneEval::None
                } else if pure && (v < min || v > max) {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::Lt => {
                let v = &self.operands[0];
                if min >= v {
                    ZoneEval::None
                } else if pure && max < v {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::Le => {
                let v = &self.operands[0];
                if min > v {
                    ZoneEval::None
                } else if pure && max <= v {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::Gt => {
                let v = &self.operands[0];
                if max <= v {
                    ZoneEval::None
                } else if pure && min > v {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::Ge => {
                let v = &self.operands[0];
                if max < v {
                    ZoneEval::None
                } else if pure && min >= v {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::In => {
                let any_inside = self.operands.iter().any(|v| v >= min && v <= max);
                if !any_inside {
                    ZoneEval::None
                } else if pure && min == max && self.operands.contains(min) {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::NotIn => {
                if min == max && self.operands.contains(min) {
                    ZoneEval::None
                } else if pure && !self.operands.iter().any(|v| v >= min && v <= max) {
                    ZoneEval::All
                } else {
                    ZoneEval::Some
                }
            }
            CondOp::IsNull | CondOp::IsNotNull => unreachable!("handled above"),
        }
    }
}

/// The full pushed-down condition set of one read, grouped per column.
pub struct Conditions {
    schema: Arc<TabletSchema>,
    columns: AHashMap<u32, Vec<Cond>>,
}

impl Conditions {
    pub fn new(schema: Arc<TabletSchema>) -> Conditions {
        Conditions {
            schema,
            columns: AHashMap::new(),
        }
    }

    /// Resolve and compile one descriptor into the set.
    pub fn append(&mut self, condition: &Condition) -> Result<()> {
        let column = self
            .schema
            .column_by_name(&condition.column_name)
            .ok_or_else(|| StorageError::ColumnNotFound(condition.column_name.clone()))?;
        let cond = Cond::compile(column, &condition.op, &condition.values)?;
        self.columns.entry(column.id).or_default().push(cond);
        Ok(())
    }

    pub fn columns(&self) -> &AHashMap<u32, Vec<Cond>> {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FieldType;
    use crate::table::{AggregationMethod, ColumnMeta, KeysType};

    fn bigint_column() -> ColumnMeta {
        ColumnMeta::key(0, "k", FieldType::BigInt)
    }

    fn zone(min: i64, max: i64) -> ZoneMap {
        ZoneMap {
            has_null: false,
            range: Some((CellValue::BigInt(min), CellValue::BigInt(max))),
        }
    }

    #[test]
    fn test_compile_ops() {
        let col = bigint_column();
        let eq = Cond::compile(&col, "*=", &["5".to_string()]).unwrap();
        assert_eq!(eq.op, CondOp::Eq);

        let in_list = Cond::compile(&col, "*=", &["1".to_string(), "2".to_string()]).unwrap();
        assert_eq!(in_list.op, CondOp::In);
        assert_eq!(in_list.operands.len(), 2);

        assert!(Cond::compile(&col, "like", &["x".to_string()]).is_err());
        assert!(Cond::compile(&col, "*=", &[]).is_err());
    }

    #[test]
    fn test_matches_null_semantics() {
        let col = bigint_column();
        let lt = Cond::compile(&col, "<<", &["5".to_string()]).unwrap();
        assert!(lt.matches(&CellValue::BigInt(4)));
        assert!(!lt.matches(&CellValue::BigInt(5)));
        assert!(!lt.matches(&CellValue::Null));

        let is_null = Cond::compile(&col, "is", &["null".to_string()]).unwrap();
        assert!(is_null.matches(&CellValue::Null));
        assert!(!is_null.matches(&CellValue::BigInt(0)));

        let is_not_null = Cond::compile(&col, "is", &["not null".to_string()]).unwrap();
        assert!(is_not_null.matches(&CellValue::BigInt(0)));
    }

    #[test]
    fn test_zone_eval_ordered() {
        let col = bigint_column();
        let gt = Cond::compile(&col, ">>", &["10".to_string()]).unwrap();
        assert_eq!(gt.eval_zone(&zone(1, 5)), ZoneEval::None);
        assert_eq!(gt.eval_zone(&zone(11, 20)), ZoneEval::All);
        assert_eq!(gt.eval_zone(&zone(5, 15)), ZoneEval::Some);

        let le = Cond::compile(&col, "<=", &["10".to_string()]).unwrap();
        assert_eq!(le.eval_zone(&zone(11, 20)), ZoneEval::None);
        assert_eq!(le.eval_zone(&zone(1, 10)), ZoneEval::All);
    }

    #[test]
    fn test_zone_eval_eq_with_nulls() {
        let col = bigint_column();
        let eq = Cond::compile(&col, "*=", &["5".to_string()]).unwrap();
        assert_eq!(eq.eval_zone(&zone(5, 5)), ZoneEval::All);

        let with_null = ZoneMap {
            has_null: true,
            range: Some((CellValue::BigInt(5), CellValue::BigInt(5))),
        };
        // null rows fail the equality, so the zone is only partially covered
        assert_eq!(eq.eval_zone(&with_null), ZoneEval::Some);

        let all_null = ZoneMap {
            has_null: true,
            range: None,
        };
        assert_eq!(eq.eval_zone(&all_null), ZoneEval::None);
    }

    #[test]
    fn test_conditions_append() {
        let schema = Arc::new(
            TabletSchema::new(
                KeysType::DupKeys,
                vec![
                    ColumnMeta::key(0, "k", FieldType::BigInt),
                    ColumnMeta::value(1, "v", FieldType::BigInt, AggregationMethod::None),
                ],
            )
            .unwrap(),
        );
        let mut conditions = Conditions::new(schema);
        conditions
            .append(&Condition::new("k", ">=", &["3"]))
            .unwrap();
        conditions
            .append(&Condition::new("k", "<<", &["9"]))
            .unwrap();
        assert_eq!(conditions.columns().get(&0).unwrap().len(), 2);

        let err = conditions.append(&Condition::new("missing", "*=", &["1"]));
        assert!(matches!(err, Err(StorageError::ColumnNotFound(_))));
    }
}
