//! Tablet reader
//!
//! The reader is the read path's orchestrator: it compiles pushed-down
//! conditions, decides the bloom filter column set, builds the delete
//! handler, resolves return and seek projections, acquires and prunes the
//! segment handles, and then drives the merge iterator range by range,
//! emitting rows under the tablet's key semantics. A reader is a one-shot
//! object owned by a single scan thread: `new → next_row* → close`.

use std::cmp::Ordering;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use ahash::AHashSet;

use crate::data::row::RowCursor;
use crate::query::collect::CollectIterator;
use crate::query::conditions::{CondOp, Condition, Conditions, MAX_OP_IN_FIELD_NUM};
use crate::query::delete::DeleteHandler;
use crate::query::predicate::{parse_to_predicate, ColumnPredicate};
use crate::storage::{DeleteStatus, SegmentData, SegmentReadOptions, Version};
use crate::table::{KeysType, Tablet, TabletSchema};
use crate::{FieldType, Result, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderType {
    Query,
    AlterTable,
    BaseCompaction,
    CumulativeCompaction,
    Checksum,
}

/// Counters updated inline on the read path. Shared between the reader and
/// its segment handles through one `Arc`.
#[derive(Debug, Default)]
pub struct ReadStats {
    rows_stats_filtered: AtomicU64,
    rows_del_filtered: AtomicU64,
    rows_cond_filtered: AtomicU64,
    raw_rows_read: AtomicU64,
    merged_rows: AtomicU64,
}

impl ReadStats {
    pub fn inc_rows_stats_filtered(&self, n: u64) {
        self.rows_stats_filtered
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn inc_rows_del_filtered(&self, n: u64) {
        self.rows_del_filtered
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn inc_rows_cond_filtered(&self, n: u64) {
        self.rows_cond_filtered
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn inc_raw_rows_read(&self, n: u64) {
        self.raw_rows_read
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn inc_merged_rows(&self, n: u64) {
        self.merged_rows
            .fetch_add(n, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReadStatsSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        ReadStatsSnapshot {
            rows_stats_filtered: self.rows_stats_filtered.load(Relaxed),
            rows_del_filtered: self.rows_del_filtered.load(Relaxed),
            rows_cond_filtered: self.rows_cond_filtered.load(Relaxed),
            raw_rows_read: self.raw_rows_read.load(Relaxed),
            merged_rows: self.merged_rows.load(Relaxed),
        }
    }
}

/// Plain copy of the counters, returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStatsSnapshot {
    pub rows_stats_filtered: u64,
    pub rows_del_filtered: u64,
    pub rows_cond_filtered: u64,
    pub raw_rows_read: u64,
    pub merged_rows: u64,
}

/// Read request parameters.
///
/// `start_keys` and `end_keys` are parallel lists of partial key tuples as
/// text; `range` (`"gt" | "ge" | "eq"`) and `end_range` (`"lt" | "le"`)
/// give the inclusivity of every range. `segments` supplies the data
/// sources for compaction and schema-change readers, which resolve their
/// own version sets.
pub struct ReadParams {
    pub tablet: Arc<Tablet>,
    pub reader_type: ReaderType,
    pub aggregation: bool,
    pub version: Version,
    pub return_columns: Vec<u32>,
    pub conditions: Vec<Condition>,
    pub start_keys: Vec<Vec<String>>,
    pub end_keys: Vec<Vec<String>>,
    pub range: String,
    pub end_range: String,
    /// Cap on rows folded into one aggregated output row per call.
    pub agg_row_limit: usize,
    pub segments: Vec<Box<dyn SegmentData>>,
}

impl ReadParams {
    pub const DEFAULT_AGG_ROW_LIMIT: usize = 16 * 1024;

    pub fn new(tablet: Arc<Tablet>, reader_type: ReaderType, version: Version) -> ReadParams {
        ReadParams {
            tablet,
            reader_type,
            aggregation: false,
            version,
            return_columns: Vec::new(),
            conditions: Vec::new(),
            start_keys: Vec::new(),
            end_keys: Vec::new(),
            range: "ge".to_string(),
            end_range: "lt".to_string(),
            agg_row_limit: Self::DEFAULT_AGG_ROW_LIMIT,
            segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartRange {
    Gt,
    Ge,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndRange {
    Lt,
    Le,
}

struct KeysParam {
    start_keys: Vec<RowCursor>,
    end_keys: Vec<RowCursor>,
    range: StartRange,
    end_range: EndRange,
}

pub struct Reader {
    tablet: Arc<Tablet>,
    reader_type: ReaderType,
    aggregation: bool,
    version: Version,
    agg_row_limit: usize,
    stats: Arc<ReadStats>,
    conditions: Arc<Conditions>,
    col_predicates: Arc<Vec<ColumnPredicate>>,
    load_bf_columns: AHashSet<u32>,
    delete_handler: Arc<DeleteHandler>,
    return_columns: Vec<u32>,
    seek_columns: Vec<u32>,
    /// Key column ids of the return set, sorted descending.
    key_cids: Vec<u32>,
    value_cids: Vec<u32>,
    keys_param: KeysParam,
    next_key_index: usize,
    data_sources: Vec<Box<dyn SegmentData>>,
    collect_iter: CollectIterator,
    closed: bool,
}

impl Reader {
    pub fn new(params: ReadParams) -> Result<Reader> {
        let tablet = params.tablet.clone();
        let schema = tablet.schema().clone();

        if !params.end_keys.is_empty() && params.start_keys.len() != params.end_keys.len() {
            return Err(StorageError::InvalidParameter(format!(
                "{} start keys but {} end keys",
                params.start_keys.len(),
                params.end_keys.len()
            )));
        }

        let mut conditions = Conditions::new(schema.clone());
        let mut col_predicates = Vec::new();
        for condition in &params.conditions {
            conditions.append(condition)?;
            if let Some(predicate) = parse_to_predicate(&schema, condition)? {
                col_predicates.push(predicate);
            }
        }

        let load_bf_columns = init_load_bf_columns(&schema, &conditions, &params);

        let delete_handler = if params.reader_type != ReaderType::CumulativeCompaction {
            Arc::new(DeleteHandler::build(&tablet, params.version.end)?)
        } else {
            // cumulative compaction keeps deleted rows for the next stage
            Arc::new(DeleteHandler::empty())
        };

        let (return_columns, key_cids, value_cids) =
            init_return_columns(&schema, &delete_handler, &params)?;
        let keys_param = init_keys_param(&schema, &params)?;
        let seek_columns = init_seek_columns(&schema, &return_columns, &conditions, &keys_param);

        // merging is skipped only for user queries that either aggregate
        // upstream or read a duplicate-keys table
        let merge = !(params.reader_type == ReaderType::Query
            && (params.aggregation || schema.keys_type() == KeysType::DupKeys));

        let mut reader = Reader {
            tablet,
            reader_type: params.reader_type,
            aggregation: params.aggregation,
            version: params.version,
            agg_row_limit: params.agg_row_limit,
            stats: Arc::new(ReadStats::default()),
            conditions: Arc::new(conditions),
            col_predicates: Arc::new(col_predicates),
            load_bf_columns,
            delete_handler,
            return_columns,
            seek_columns,
            key_cids,
            value_cids,
            keys_param,
            next_key_index: 0,
            data_sources: Vec::new(),
            collect_iter: CollectIterator::new(merge),
            closed: false,
        };
        reader.acquire_data_sources(params.segments)?;

        let mut eof = false;
        reader.attach_data_to_merge_set(true, &mut eof)?;
        Ok(reader)
    }

    /// Emit the next output row into `row_cursor`. Sets `eof` instead of
    /// erroring when the scan is exhausted.
    pub fn next_row(&mut self, row_cursor: &mut RowCursor, eof: &mut bool) -> Result<()> {
        if self.closed {
            return Err(StorageError::InvalidParameter(
                "reader is already closed".into(),
            ));
        }
        match self.tablet.keys_type() {
            KeysType::DupKeys => self.dup_key_next_row(row_cursor, eof),
            KeysType::UniqueKeys => self.unique_key_next_row(row_cursor, eof),
            KeysType::AggKeys => self.agg_key_next_row(row_cursor, eof),
        }
    }

    /// A cursor shaped for this reader's output rows.
    pub fn new_row_cursor(&self) -> RowCursor {
        RowCursor::new(self.tablet.schema().clone(), self.seek_columns.clone())
    }

    pub fn stats(&self) -> ReadStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn return_columns(&self) -> &[u32] {
        &self.return_columns
    }

    pub fn seek_columns(&self) -> &[u32] {
        &self.seek_columns
    }

    /// Release segment handles and iterator state. Safe to call twice.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        log::debug!(
            "reader closed, tablet={} version={} merged_rows={}",
            self.tablet.name(),
            self.version,
            self.stats.snapshot().merged_rows
        );
        self.collect_iter.clear();
        self.data_sources.clear();
    }

    fn dup_key_next_row(&mut self, row_cursor: &mut RowCursor, eof: &mut bool) -> Result<()> {
        *eof = false;
        if self.collect_iter.current_row().is_none() {
            self.attach_data_to_merge_set(false, eof)?;
            if *eof {
                return Ok(());
            }
        }
        let Some((row, _)) = self.collect_iter.current_row() else {
            *eof = true;
            return Ok(());
        };
        row_cursor.copy_from(row);
        self.advance_collect()?;
        Ok(())
    }

    fn agg_key_next_row(&mut self, row_cursor: &mut RowCursor, eof: &mut bool) -> Result<()> {
        *eof = false;
        if self.collect_iter.current_row().is_none() {
            self.attach_data_to_merge_set(false, eof)?;
            if *eof {
                return Ok(());
            }
        }
        let Some((row, _)) = self.collect_iter.current_row() else {
            *eof = true;
            return Ok(());
        };
        row_cursor.init_merge(row);

        let mut merged: u64 = 0;
        loop {
            if !self.advance_collect()? {
                break;
            }
            if self.aggregation && merged as usize >= self.agg_row_limit {
                break;
            }
            let Some((next, _)) = self.collect_iter.current_row() else {
                break;
            };
            if !RowCursor::columns_equal(&self.key_cids, row_cursor, next) {
                break;
            }
            row_cursor.fold(&self.value_cids, next);
            merged += 1;
        }
        self.stats.inc_merged_rows(merged);
        Ok(())
    }

    fn unique_key_next_row(&mut self, row_cursor: &mut RowCursor, eof: &mut bool) -> Result<()> {
        *eof = false;
        loop {
            if self.collect_iter.current_row().is_none() {
                self.attach_data_to_merge_set(false, eof)?;
                if *eof {
                    return Ok(());
                }
            }
            let cur_delete;
            {
                let Some((row, delete_flag)) = self.collect_iter.current_row() else {
                    *eof = true;
                    return Ok(());
                };
                // the heap orders equal keys newest first, so this row
                // already carries the winning values
                cur_delete = delete_flag;
                row_cursor.init_merge(row);
            }

            let mut merged: u64 = 0;
            loop {
                if !self.advance_collect()? {
                    break;
                }
                if self.aggregation && merged as usize >= self.agg_row_limit {
                    break;
                }
                let Some((next, _)) = self.collect_iter.current_row() else {
                    break;
                };
                if !RowCursor::columns_equal(&self.key_cids, row_cursor, next) {
                    break;
                }
                merged += 1;
            }
            self.stats.inc_merged_rows(merged);

            if !cur_delete {
                return Ok(());
            }
            // the winning version is a tombstone; drop the whole group and
            // continue within the same range
            self.stats.inc_rows_del_filtered(1);
        }
    }

    fn advance_collect(&mut self) -> Result<bool> {
        let Reader {
            collect_iter,
            data_sources,
            ..
        } = self;
        collect_iter.next(data_sources)
    }

    fn acquire_data_sources(&mut self, external: Vec<Box<dyn SegmentData>>) -> Result<()> {
        let sources = match self.reader_type {
            ReaderType::AlterTable
            | ReaderType::BaseCompaction
            | ReaderType::CumulativeCompaction => external,
            ReaderType::Query | ReaderType::Checksum => {
                let acquired = self.tablet.acquire_data_sources(self.version);
                if acquired.is_empty() {
                    log::warn!(
                        "fail to acquire data sources, tablet={} version={}",
                        self.tablet.name(),
                        self.version
                    );
                    return Err(StorageError::VersionNotExist(format!(
                        "tablet {} has no segments covering version {}",
                        self.tablet.name(),
                        self.version
                    )));
                }
                acquired
            }
        };

        // compaction-style scans would thrash the index cache
        let use_index_cache = self.reader_type == ReaderType::Query;

        for mut source in sources {
            if source.empty() || source.zero_num_rows() {
                continue;
            }
            source.set_read_options(SegmentReadOptions {
                return_columns: self.return_columns.clone(),
                seek_columns: self.seek_columns.clone(),
                bloom_filter_columns: self.load_bf_columns.clone(),
                conditions: self.conditions.clone(),
                predicates: self.col_predicates.clone(),
                delete_handler: self.delete_handler.clone(),
                stats: self.stats.clone(),
                use_index_cache,
            })?;

            if source.delta_pruning_filter() {
                log::debug!(
                    "segment pruned by column statistics, tablet={} version={}",
                    self.tablet.name(),
                    source.version()
                );
                self.stats.inc_rows_stats_filtered(source.num_rows());
                continue;
            }
            match source.delete_pruning_filter() {
                DeleteStatus::Satisfied => {
                    log::debug!(
                        "segment pruned by delete predicate, tablet={} version={}",
                        self.tablet.name(),
                        source.version()
                    );
                    self.stats.inc_rows_del_filtered(source.num_rows());
                }
                status => {
                    source.set_delete_status(status);
                    self.data_sources.push(source);
                }
            }
        }
        Ok(())
    }

    /// Open the next scan range on the merge iterator. Loops past ranges
    /// that contain no rows; sets `eof` when none remain.
    fn attach_data_to_merge_set(&mut self, mut first: bool, eof: &mut bool) -> Result<()> {
        *eof = false;
        loop {
            self.collect_iter.clear();

            let mut start_key: Option<&RowCursor> = None;
            let mut end_key: Option<&RowCursor> = None;
            let mut after_start = false;
            let mut include_end = false;

            if !self.keys_param.start_keys.is_empty() {
                if self.next_key_index >= self.keys_param.start_keys.len() {
                    *eof = true;
                    return Ok(());
                }
                let cur_key_index = self.next_key_index;
                self.next_key_index += 1;

                let start = &self.keys_param.start_keys[cur_key_index];
                start_key = Some(start);
                if !self.keys_param.end_keys.is_empty() {
                    end_key = Some(&self.keys_param.end_keys[cur_key_index]);
                    include_end = self.keys_param.end_range == EndRange::Le;
                }

                match self.keys_param.range {
                    StartRange::Gt => {
                        if let Some(end) = end_key {
                            if start.cmp_prefix(end) != Ordering::Less {
                                log::debug!(
                                    "skip empty scan range, start={} end={}",
                                    start,
                                    end
                                );
                                continue;
                            }
                        }
                        after_start = true;
                    }
                    StartRange::Ge => {
                        if let Some(end) = end_key {
                            if start.cmp_prefix(end) == Ordering::Greater {
                                log::debug!(
                                    "skip empty scan range, start={} end={}",
                                    start,
                                    end
                                );
                                continue;
                            }
                        }
                    }
                    StartRange::Eq => {
                        end_key = start_key;
                        include_end = true;
                    }
                }
            } else if !first {
                *eof = true;
                return Ok(());
            }

            for idx in 0..self.data_sources.len() {
                let block = match self.data_sources[idx].prepare_block_read(
                    start_key,
                    after_start,
                    end_key,
                    include_end,
                )? {
                    Some(block) => block,
                    // this segment holds nothing in the range
                    None => continue,
                };
                self.collect_iter.add_child(
                    idx,
                    block,
                    &mut self.data_sources,
                    self.tablet.schema(),
                    &self.seek_columns,
                    &self.delete_handler,
                    &self.stats,
                )?;
            }

            if self.collect_iter.current_row().is_some() {
                return Ok(());
            }
            first = false;
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

fn init_return_columns(
    schema: &Arc<TabletSchema>,
    delete_handler: &DeleteHandler,
    params: &ReadParams,
) -> Result<(Vec<u32>, Vec<u32>, Vec<u32>)> {
    let (return_columns, split_source) = if params.return_columns.is_empty() {
        let all = schema.all_column_ids();
        (all.clone(), all)
    } else {
        match params.reader_type {
            ReaderType::Query => {
                let mut return_columns = params.return_columns.clone();
                if delete_handler.conditions_num() != 0 && params.aggregation {
                    // partially-aggregated rows must still be checkable
                    // against every delete predicate downstream
                    let mut seen: AHashSet<u32> = return_columns.iter().copied().collect();
                    for dc in delete_handler.conditions() {
                        for cid in dc.column_ids() {
                            if seen.insert(cid) {
                                return_columns.push(cid);
                            }
                        }
                    }
                }
                (return_columns, params.return_columns.clone())
            }
            ReaderType::Checksum => (params.return_columns.clone(), params.return_columns.clone()),
            other => {
                return Err(StorageError::InvalidParameter(format!(
                    "{:?} reader does not accept an explicit column list",
                    other
                )))
            }
        }
    };

    for &cid in &return_columns {
        if cid as usize >= schema.num_columns() {
            return Err(StorageError::ColumnNotFound(format!("column id {}", cid)));
        }
    }

    let mut key_cids = Vec::new();
    let mut value_cids = Vec::new();
    for &cid in &split_source {
        if schema.column(cid).is_key {
            key_cids.push(cid);
        } else {
            value_cids.push(cid);
        }
    }
    key_cids.sort_unstable_by(|a, b| b.cmp(a));

    Ok((return_columns, key_cids, value_cids))
}

/// Columns whose bloom filters are worth loading: equality or small-IN
/// conditions on bloom-enabled columns, minus the key prefix that every
/// scan range pins to a single value.
fn init_load_bf_columns(
    schema: &Arc<TabletSchema>,
    conditions: &Conditions,
    params: &ReadParams,
) -> AHashSet<u32> {
    let mut bf_columns = AHashSet::new();
    for (&cid, conds) in conditions.columns() {
        for cond in conds {
            match cond.op {
                CondOp::Eq => {
                    bf_columns.insert(cid);
                }
                CondOp::In if cond.operands.len() < MAX_OP_IN_FIELD_NUM => {
                    bf_columns.insert(cid);
                }
                _ => {}
            }
        }
    }
    bf_columns.retain(|&cid| schema.column(cid).is_bloom_filter);

    if params.start_keys.is_empty() || params.end_keys.is_empty() {
        return bf_columns;
    }

    // longest key prefix that is equal between the start and end of every
    // scan range; those columns carry a single value and their filters
    // cannot discriminate
    let mut min_scan_key_len = schema.num_columns();
    for key in params.start_keys.iter().chain(params.end_keys.iter()) {
        min_scan_key_len = min_scan_key_len.min(key.len());
    }
    let mut max_equal_index: isize = -1;
    for (start, end) in params.start_keys.iter().zip(params.end_keys.iter()) {
        let mut j = 0;
        while j < min_scan_key_len && start[j] == end[j] {
            j += 1;
        }
        max_equal_index = max_equal_index.max(j as isize - 1);
    }

    for cid in 0..max_equal_index.max(0) {
        bf_columns.remove(&(cid as u32));
    }
    if max_equal_index >= 0 {
        let column = schema.column(max_equal_index as u32);
        let keep = matches!(column.field_type, FieldType::Varchar | FieldType::Hll)
            && (max_equal_index as usize) < schema.num_short_key_columns();
        if !keep {
            bf_columns.remove(&(max_equal_index as u32));
        }
    }
    bf_columns
}

fn init_keys_param(schema: &Arc<TabletSchema>, params: &ReadParams) -> Result<KeysParam> {
    let range = match params.range.as_str() {
        "gt" => StartRange::Gt,
        "ge" => StartRange::Ge,
        "eq" => StartRange::Eq,
        other => {
            return Err(StorageError::GetIterator(format!(
                "invalid range op: {}",
                other
            )))
        }
    };
    let end_range = match params.end_range.as_str() {
        "lt" => EndRange::Lt,
        "le" => EndRange::Le,
        other => {
            return Err(StorageError::GetIterator(format!(
                "invalid end_range op: {}",
                other
            )))
        }
    };

    let start_keys = params
        .start_keys
        .iter()
        .map(|values| RowCursor::scan_key(schema.clone(), values))
        .collect::<Result<Vec<_>>>()?;
    let end_keys = params
        .end_keys
        .iter()
        .map(|values| RowCursor::scan_key(schema.clone(), values))
        .collect::<Result<Vec<_>>>()?;

    Ok(KeysParam {
        start_keys,
        end_keys,
        range,
        end_range,
    })
}

/// Seek columns: everything the scan must materialize per row — the return
/// set, every conditioned column, and the key prefix long enough for the
/// deepest scan key.
fn init_seek_columns(
    schema: &Arc<TabletSchema>,
    return_columns: &[u32],
    conditions: &Conditions,
    keys_param: &KeysParam,
) -> Vec<u32> {
    let mut column_set: AHashSet<u32> = return_columns.iter().copied().collect();
    for &cid in conditions.columns().keys() {
        column_set.insert(cid);
    }
    let max_key_fields = keys_param
        .start_keys
        .iter()
        .chain(keys_param.end_keys.iter())
        .map(|key| key.field_count())
        .max()
        .unwrap_or(0);

    (0..schema.num_columns() as u32)
        .filter(|&cid| (cid as usize) < max_key_fields || column_set.contains(&cid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{AggregationMethod, ColumnMeta};

    fn bf_schema(first_key_type: FieldType) -> Arc<TabletSchema> {
        Arc::new(
            TabletSchema::new(
                KeysType::DupKeys,
                vec![
                    ColumnMeta::key(0, "region", first_key_type).with_bloom_filter(),
                    ColumnMeta::key(1, "city", FieldType::Varchar).with_bloom_filter(),
                    ColumnMeta::value(2, "metric", FieldType::BigInt, AggregationMethod::None)
                        .with_bloom_filter(),
                ],
            )
            .unwrap(),
        )
    }

    fn bf_params(
        schema: &Arc<TabletSchema>,
        conditions: &[Condition],
        start: &[&str],
        end: &[&str],
    ) -> (Conditions, ReadParams) {
        let tablet = Arc::new(Tablet::new("bf", (**schema).clone()));
        let mut compiled = Conditions::new(schema.clone());
        for condition in conditions {
            compiled.append(condition).unwrap();
        }
        let mut params = ReadParams::new(tablet, ReaderType::Query, Version::new(0, 1));
        params.conditions = conditions.to_vec();
        if !start.is_empty() {
            params.start_keys = vec![start.iter().map(|s| s.to_string()).collect()];
            params.end_keys = vec![end.iter().map(|s| s.to_string()).collect()];
        }
        (compiled, params)
    }

    #[test]
    fn test_bf_columns_keep_equal_varchar_prefix() {
        let schema = bf_schema(FieldType::Varchar);
        let (conditions, params) = bf_params(
            &schema,
            &[
                Condition::new("region", "*=", &["eu"]),
                Condition::new("metric", "*=", &["5"]),
            ],
            &["eu", "a"],
            &["eu", "z"],
        );
        let bf = init_load_bf_columns(&schema, &conditions, &params);
        // "region" is pinned by the range but kept: a varchar inside the
        // short key prefix still discriminates within its stream
        assert!(bf.contains(&0));
        assert!(bf.contains(&2));
    }

    #[test]
    fn test_bf_columns_drop_equal_fixed_width_prefix() {
        let schema = bf_schema(FieldType::BigInt);
        let (conditions, params) = bf_params(
            &schema,
            &[
                Condition::new("region", "*=", &["7"]),
                Condition::new("metric", "*=", &["5"]),
            ],
            &["7", "a"],
            &["7", "z"],
        );
        let bf = init_load_bf_columns(&schema, &conditions, &params);
        assert!(!bf.contains(&0));
        assert!(bf.contains(&2));
    }

    #[test]
    fn test_bf_columns_require_bloom_enabled() {
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
        let (conditions, params) =
            bf_params(&schema, &[Condition::new("k", "*=", &["1"])], &[], &[]);
        let bf = init_load_bf_columns(&schema, &conditions, &params);
        assert!(bf.is_empty());
    }

    #[test]
    fn test_seek_columns_cover_scan_key_prefix() {
        let schema = bf_schema(FieldType::Varchar);
        let (conditions, mut params) = bf_params(
            &schema,
            &[Condition::new("city", "*=", &["rome"])],
            &["eu"],
            &["eu"],
        );
        params.return_columns = vec![2];
        let keys_param = init_keys_param(&schema, &params).unwrap();
        let seek = init_seek_columns(&schema, &params.return_columns, &conditions, &keys_param);
        // key prefix as deep as the scan key, plus condition and return sets
        assert_eq!(seek, vec![0, 1, 2]);
    }
}
