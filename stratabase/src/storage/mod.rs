//! Segment read contract
//!
//! Segments are immutable sorted runs owned by a tablet. The reader consumes
//! them through two traits: [`Segment`], the shared descriptor registered in
//! the tablet header, and [`SegmentData`], the per-reader handle that
//! actually decodes row blocks. Block reads return `Ok(None)` at end of
//! stream; errors are reserved for real failures.

pub mod mem_segment;

use std::fmt;
use std::sync::Arc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::data::row::RowCursor;
use crate::data::CellValue;
use crate::query::conditions::Conditions;
use crate::query::delete::DeleteHandler;
use crate::query::predicate::ColumnPredicate;
use crate::query::reader::ReadStats;
use crate::Result;

/// Inclusive version range of a segment; ordering on `end` defines newness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub begin: i64,
    pub end: i64,
}

impl Version {
    pub fn new(begin: i64, end: i64) -> Version {
        Version { begin, end }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.begin, self.end)
    }
}

/// How a delete predicate applies to a segment or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Every row is deleted.
    Satisfied,
    /// Some rows may be deleted; filter row by row.
    PartialSatisfied,
    /// No row is deleted.
    NotSatisfied,
}

/// A materialized batch of rows from one segment, projected to the reader's
/// seek columns, with a position cursor and the delete status stamped when
/// the block was opened.
pub struct RowBlock {
    columns: Arc<Vec<u32>>,
    rows: Vec<Vec<CellValue>>,
    pos: usize,
    status: DeleteStatus,
}

impl RowBlock {
    pub fn new(columns: Arc<Vec<u32>>, rows: Vec<Vec<CellValue>>, status: DeleteStatus) -> Self {
        RowBlock {
            columns,
            rows,
            pos: 0,
            status,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn pos_inc(&mut self) {
        self.pos += 1;
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.rows.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn status(&self) -> DeleteStatus {
        self.status
    }

    /// Copy the row at `pos` into a cursor.
    pub fn get_row(&self, pos: usize, cursor: &mut RowCursor) {
        let row = &self.rows[pos];
        for (slot, &cid) in self.columns.iter().enumerate() {
            cursor.assign(cid, &row[slot]);
        }
    }
}

/// Everything a segment needs to serve one reader: projections, pushed-down
/// filters, the delete handler, the shared statistics sink, and the cache
/// policy.
#[derive(Clone)]
pub struct SegmentReadOptions {
    pub return_columns: Vec<u32>,
    pub seek_columns: Vec<u32>,
    pub bloom_filter_columns: AHashSet<u32>,
    pub conditions: Arc<Conditions>,
    pub predicates: Arc<Vec<ColumnPredicate>>,
    pub delete_handler: Arc<DeleteHandler>,
    pub stats: Arc<ReadStats>,
    /// Index streams go through the LRU cache only for user queries.
    pub use_index_cache: bool,
}

/// Shared, immutable segment descriptor registered in a tablet header.
pub trait Segment: Send + Sync {
    fn version(&self) -> Version;

    fn num_rows(&self) -> u64;

    /// True iff this segment is a tombstone marker.
    fn delete_flag(&self) -> bool;

    /// Open a per-reader handle.
    fn open(self: Arc<Self>) -> Box<dyn SegmentData>;
}

/// Per-reader segment handle: carries reader-specific read options and the
/// scan position. One reader owns each handle exclusively.
pub trait SegmentData: Send {
    fn version(&self) -> Version;

    fn num_rows(&self) -> u64;

    fn empty(&self) -> bool;

    fn zero_num_rows(&self) -> bool {
        self.num_rows() == 0
    }

    fn delete_flag(&self) -> bool;

    fn set_read_options(&mut self, options: SegmentReadOptions) -> Result<()>;

    /// True iff column statistics prove no row can match the pushed-down
    /// conditions and predicates.
    fn delta_pruning_filter(&self) -> bool;

    /// Evaluate the applicable delete predicates against the whole segment.
    fn delete_pruning_filter(&self) -> DeleteStatus;

    /// Stamp the status later copied onto every block this handle produces.
    fn set_delete_status(&mut self, status: DeleteStatus);

    /// Position the handle on a key range and return the first block.
    /// `after_start` seeks strictly past `start_key`; `include_end` keeps
    /// rows equal to `end_key`. `Ok(None)` means the range holds no rows.
    fn prepare_block_read(
        &mut self,
        start_key: Option<&RowCursor>,
        after_start: bool,
        end_key: Option<&RowCursor>,
        include_end: bool,
    ) -> Result<Option<RowBlock>>;

    /// Next block of the prepared range; `Ok(None)` at end of stream.
    fn get_next_block(&mut self) -> Result<Option<RowBlock>>;
}
