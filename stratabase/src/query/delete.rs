//! Per-version delete predicates
//!
//! A delete is recorded in the tablet header as a conjunction of conditions
//! at a version; it suppresses matching rows of every version up to its own.
//! The handler compiles the records once per reader and answers the per-row
//! question the merge children ask while draining partially-deleted blocks.

use crate::data::row::RowCursor;
use crate::query::conditions::Cond;
use crate::table::Tablet;
use crate::{Result, StorageError};

/// One compiled delete record.
#[derive(Debug, Clone)]
pub struct DeleteCondition {
    pub version: i64,
    conds: Vec<(u32, Cond)>,
}

impl DeleteCondition {
    /// True iff the row satisfies every condition of the conjunction.
    pub fn matches_row(&self, row: &RowCursor) -> bool {
        self.conds.iter().all(|(cid, cond)| cond.matches(row.get(*cid)))
    }

    pub fn conds(&self) -> &[(u32, Cond)] {
        &self.conds
    }

    pub fn column_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.conds.iter().map(|(cid, _)| *cid)
    }
}

/// All delete predicates applicable to one read.
#[derive(Debug, Clone, Default)]
pub struct DeleteHandler {
    conditions: Vec<DeleteCondition>,
}

impl DeleteHandler {
    /// A handler with no conditions; used by cumulative compaction readers,
    /// which must carry deletes forward instead of applying them.
    pub fn empty() -> DeleteHandler {
        DeleteHandler::default()
    }

    /// Compile the tablet's delete records up to `version_end`. The tablet
    /// header read lock is held only while the records are copied out.
    pub fn build(tablet: &Tablet, version_end: i64) -> Result<DeleteHandler> {
        let schema = tablet.schema();
        let mut conditions = Vec::new();
        for record in tablet.delete_records_upto(version_end) {
            let mut conds = Vec::with_capacity(record.conditions.len());
            for condition in &record.conditions {
                let column = schema
                    .column_by_name(&condition.column_name)
                    .ok_or_else(|| StorageError::ColumnNotFound(condition.column_name.clone()))?;
                let cond = Cond::compile(column, &condition.op, &condition.values)?;
                conds.push((column.id, cond));
            }
            conditions.push(DeleteCondition {
                version: record.version,
                conds,
            });
        }
        Ok(DeleteHandler { conditions })
    }

    /// True iff a row of `version` is suppressed by an applicable delete.
    pub fn is_filter_data(&self, version: i64, row: &RowCursor) -> bool {
        self.conditions
            .iter()
            .any(|dc| version <= dc.version && dc.matches_row(row))
    }

    pub fn conditions_num(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[DeleteCondition] {
        &self.conditions
    }
}
