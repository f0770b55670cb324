//! Row cursor: a typed record over a subset of a tablet's columns
//!
//! The cursor is the unit of exchange on the read path. Segment blocks copy
//! rows into it, the merge heap compares through it, and the aggregating
//! emit paths fold into it. One cursor is allocated per merge child and per
//! output row; copies reuse the existing cell buffers.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::data::CellValue;
use crate::table::{AggregationMethod, TabletSchema};
use crate::{Result, StorageError};

#[derive(Debug, Clone)]
pub struct RowCursor {
    schema: Arc<TabletSchema>,
    /// Column ids this cursor carries, ascending.
    columns: Vec<u32>,
    /// Full schema width; columns not carried stay null.
    cells: Vec<CellValue>,
    /// Number of leading key fields present. Scan keys may carry fewer
    /// fields than the schema's key column count.
    field_count: usize,
}

impl RowCursor {
    pub fn new(schema: Arc<TabletSchema>, columns: Vec<u32>) -> RowCursor {
        let width = schema.num_columns();
        let field_count = schema.num_key_columns();
        RowCursor {
            schema,
            columns,
            cells: vec![CellValue::Null; width],
            field_count,
        }
    }

    /// Build a partial-key cursor from textual scan key values. Values bind
    /// to the leading key columns in schema order.
    pub fn scan_key(schema: Arc<TabletSchema>, values: &[String]) -> Result<RowCursor> {
        if values.len() > schema.num_key_columns() {
            return Err(StorageError::InvalidParameter(format!(
                "scan key has {} fields but the key prefix has only {}",
                values.len(),
                schema.num_key_columns()
            )));
        }
        let width = schema.num_columns();
        let mut cells = vec![CellValue::Null; width];
        for (i, value) in values.iter().enumerate() {
            let column = schema.column(i as u32);
            cells[i] = CellValue::parse(column.field_type, column.length, value)?;
        }
        Ok(RowCursor {
            schema,
            columns: (0..values.len() as u32).collect(),
            cells,
            field_count: values.len(),
        })
    }

    pub fn schema(&self) -> &Arc<TabletSchema> {
        &self.schema
    }

    pub fn columns(&self) -> &[u32] {
        &self.columns
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn get(&self, cid: u32) -> &CellValue {
        &self.cells[cid as usize]
    }

    pub fn set(&mut self, cid: u32, value: CellValue) {
        self.cells[cid as usize] = value;
    }

    /// Clone a cell into place, reusing the existing buffer.
    pub fn assign(&mut self, cid: u32, value: &CellValue) {
        self.cells[cid as usize].clone_from(value);
    }

    /// Copy the cells another cursor carries, reusing this cursor's buffers.
    pub fn copy_from(&mut self, src: &RowCursor) {
        for &cid in &src.columns {
            self.cells[cid as usize].clone_from(&src.cells[cid as usize]);
        }
    }

    /// Compare on every key column of the schema, ascending column order.
    pub fn cmp_full_key(&self, other: &RowCursor) -> Ordering {
        for cid in 0..self.schema.num_key_columns() {
            let ord = self.cells[cid].cmp(&other.cells[cid]);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two partial keys over their common leading prefix.
    pub fn cmp_prefix(&self, other: &RowCursor) -> Ordering {
        let fields = self.field_count.min(other.field_count);
        for cid in 0..fields {
            let ord = self.cells[cid].cmp(&other.cells[cid]);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// True when both rows agree on every listed column.
    pub fn columns_equal(cids: &[u32], a: &RowCursor, b: &RowCursor) -> bool {
        cids.iter()
            .all(|&cid| a.cells[cid as usize] == b.cells[cid as usize])
    }

    /// Start a new merge group from a source row.
    pub fn init_merge(&mut self, src: &RowCursor) {
        self.copy_from(src);
    }

    /// Fold a source row into this one, column by column, using each
    /// column's declared aggregation method. The merge yields newer rows
    /// first for equal keys, so `Replace` keeps the cell already present.
    pub fn fold(&mut self, cids: &[u32], src: &RowCursor) {
        for &cid in cids {
            let method = self.schema.column(cid).aggregation;
            let slot = cid as usize;
            match method {
                AggregationMethod::None | AggregationMethod::Replace => {}
                AggregationMethod::Sum => {
                    let folded = sum_cells(&self.cells[slot], &src.cells[slot]);
                    self.cells[slot] = folded;
                }
                AggregationMethod::Min => {
                    if src.cells[slot] < self.cells[slot] {
                        self.cells[slot].clone_from(&src.cells[slot]);
                    }
                }
                AggregationMethod::Max => {
                    if src.cells[slot] > self.cells[slot] {
                        self.cells[slot].clone_from(&src.cells[slot]);
                    }
                }
            }
        }
    }
}

fn sum_cells(dst: &CellValue, src: &CellValue) -> CellValue {
    use CellValue::*;
    match (dst, src) {
        (Null, other) => other.clone(),
        (_, Null) => dst.clone(),
        (TinyInt(a), TinyInt(b)) => TinyInt(a.wrapping_add(*b)),
        (SmallInt(a), SmallInt(b)) => SmallInt(a.wrapping_add(*b)),
        (Int(a), Int(b)) => Int(a.wrapping_add(*b)),
        (BigInt(a), BigInt(b)) => BigInt(a.wrapping_add(*b)),
        (LargeInt(a), LargeInt(b)) => LargeInt(a.wrapping_add(*b)),
        (Decimal(a), Decimal(b)) => {
            let mut integer = a.integer.wrapping_add(b.integer);
            let mut fraction = a.fraction + b.fraction;
            const SCALE: i32 = 1_000_000_000;
            if fraction >= SCALE {
                fraction -= SCALE;
                integer += 1;
            } else if fraction <= -SCALE {
                fraction += SCALE;
                integer -= 1;
            }
            Decimal(crate::data::Decimal12::new(integer, fraction))
        }
        // Non-summable or mismatched cells keep the current value.
        _ => dst.clone(),
    }
}

impl fmt::Display for RowCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, &cid) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", self.cells[cid as usize])?;
        }
        write!(f, ")")
    }
}
