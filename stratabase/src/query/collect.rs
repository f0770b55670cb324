//! K-way merge over per-segment row streams
//!
//! Each child wraps one segment's block stream as a single-row cursor that
//! can be peeked and advanced; per-version delete filtering happens inline
//! while a child refreshes. The iterator either merges the children through
//! a binary min-heap ordered by `(key ascending, version descending)` or,
//! when order does not matter, drains them one after another.
//!
//! The heap stores child indices into an arena. Children own their cursors;
//! the segment handles stay with the reader and are passed into every
//! advancing call, so nothing in the heap aliases mutable state.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::data::row::RowCursor;
use crate::query::delete::DeleteHandler;
use crate::query::reader::ReadStats;
use crate::storage::{DeleteStatus, RowBlock, SegmentData};
use crate::table::TabletSchema;
use crate::Result;

/// Single-row cursor over one segment's block stream.
struct ChildCtx {
    /// Index of the segment handle in the reader's source list.
    source: usize,
    block: RowBlock,
    cursor: RowCursor,
    valid: bool,
    is_delete: bool,
    version: i64,
    delete_handler: Arc<DeleteHandler>,
    stats: Arc<ReadStats>,
}

impl ChildCtx {
    /// Land the cursor on the next surviving row. Rows of partially-deleted
    /// blocks are checked against the delete handler and skipped when an
    /// applicable predicate matches. Returns false at end of stream.
    fn refresh(&mut self, source: &mut dyn SegmentData) -> Result<bool> {
        loop {
            if self.block.has_remaining() {
                let pos = self.block.pos();
                self.block.get_row(pos, &mut self.cursor);
                if self.block.status() == DeleteStatus::PartialSatisfied
                    && self.delete_handler.is_filter_data(self.version, &self.cursor)
                {
                    self.stats.inc_rows_del_filtered(1);
                    self.block.pos_inc();
                    continue;
                }
                self.valid = true;
                return Ok(true);
            }
            match source.get_next_block()? {
                Some(block) => self.block = block,
                None => {
                    self.valid = false;
                    return Ok(false);
                }
            }
        }
    }

    fn advance(&mut self, source: &mut dyn SegmentData) -> Result<bool> {
        self.block.pos_inc();
        self.refresh(source)
    }
}

pub(crate) struct CollectIterator {
    /// When true, children merge through the heap and output is key-ordered.
    merge: bool,
    children: Vec<ChildCtx>,
    /// Min-heap of child indices; only used in merge mode.
    heap: Vec<usize>,
    cur_child: Option<usize>,
    /// Position in `children` when draining in insertion order.
    child_idx: usize,
}

impl CollectIterator {
    pub fn new(merge: bool) -> CollectIterator {
        CollectIterator {
            merge,
            children: Vec::new(),
            heap: Vec::new(),
            cur_child: None,
            child_idx: 0,
        }
    }

    /// Wrap a prepared `(segment, first block)` pair into a child. Children
    /// that are already exhausted are dropped silently.
    #[allow(clippy::too_many_arguments)]
    pub fn add_child(
        &mut self,
        source_idx: usize,
        block: RowBlock,
        sources: &mut [Box<dyn SegmentData>],
        schema: &Arc<TabletSchema>,
        seek_columns: &[u32],
        delete_handler: &Arc<DeleteHandler>,
        stats: &Arc<ReadStats>,
    ) -> Result<()> {
        let source = sources[source_idx].as_mut();
        let mut child = ChildCtx {
            source: source_idx,
            version: source.version().end,
            is_delete: source.delete_flag(),
            block,
            cursor: RowCursor::new(schema.clone(), seek_columns.to_vec()),
            valid: false,
            delete_handler: delete_handler.clone(),
            stats: stats.clone(),
        };
        if !child.refresh(source)? {
            return Ok(());
        }

        let idx = self.children.len();
        self.children.push(child);
        if self.merge {
            self.heap_push(idx);
            self.cur_child = self.heap.first().copied();
        } else if self.cur_child.is_none() {
            self.cur_child = Some(idx);
        }
        Ok(())
    }

    /// Peek the smallest un-emitted row, or `None` at end of data.
    pub fn current_row(&self) -> Option<(&RowCursor, bool)> {
        let idx = self.cur_child?;
        let child = &self.children[idx];
        debug_assert!(child.valid);
        Some((&child.cursor, child.is_delete))
    }

    /// Advance past the current row. Returns whether a row remains.
    pub fn next(&mut self, sources: &mut [Box<dyn SegmentData>]) -> Result<bool> {
        if self.cur_child.is_none() {
            return Ok(false);
        }
        if self.merge {
            self.merge_next(sources)
        } else {
            self.normal_next(sources)
        }
    }

    fn merge_next(&mut self, sources: &mut [Box<dyn SegmentData>]) -> Result<bool> {
        let Some(cur) = self.heap_pop() else {
            self.cur_child = None;
            return Ok(false);
        };
        let source_idx = self.children[cur].source;
        let alive = self.children[cur].advance(sources[source_idx].as_mut())?;
        if alive {
            self.heap_push(cur);
        }
        self.cur_child = self.heap.first().copied();
        Ok(self.cur_child.is_some())
    }

    fn normal_next(&mut self, sources: &mut [Box<dyn SegmentData>]) -> Result<bool> {
        let Some(cur) = self.cur_child else {
            return Ok(false);
        };
        let source_idx = self.children[cur].source;
        if self.children[cur].advance(sources[source_idx].as_mut())? {
            return Ok(true);
        }
        // this child is drained, move to the next one
        self.child_idx += 1;
        if self.child_idx < self.children.len() {
            self.cur_child = Some(self.child_idx);
            Ok(true)
        } else {
            self.cur_child = None;
            Ok(false)
        }
    }

    /// Drop all children and reset; used between successive scan ranges.
    pub fn clear(&mut self) {
        self.children.clear();
        self.heap.clear();
        self.cur_child = None;
        self.child_idx = 0;
    }

    // Heap ordering: full primary key ascending; on equal keys the higher
    // version sorts first so the newest row of a key is emitted first.
    fn child_less(&self, a: usize, b: usize) -> bool {
        let ca = &self.children[a];
        let cb = &self.children[b];
        match ca.cursor.cmp_full_key(&cb.cursor) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => ca.version > cb.version,
        }
    }

    fn heap_push(&mut self, idx: usize) {
        self.heap.push(idx);
        self.sift_up(self.heap.len() - 1);
    }

    fn heap_pop(&mut self) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let top = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        top
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.child_less(self.heap[i], self.heap[parent]) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < self.heap.len() && self.child_less(self.heap[left], self.heap[smallest]) {
                smallest = left;
            }
            if right < self.heap.len() && self.child_less(self.heap[right], self.heap[smallest]) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
    }
}
