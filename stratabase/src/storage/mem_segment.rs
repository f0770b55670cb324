//! In-memory reference segment
//!
//! A complete [`Segment`]/[`SegmentData`] implementation over sorted
//! in-memory rows: per-column zone maps back column-statistics pruning,
//! per-column bloom filters answer equality probes, delete predicates
//! evaluate three-way against the zones, and block reads slice the run by
//! binary search on the scan key prefix. Tests and embedders without their
//! own block decoder read through this.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use bloomfilter::Bloom;

use crate::data::row::RowCursor;
use crate::data::CellValue;
use crate::query::conditions::{ZoneEval, ZoneMap};
use crate::storage::{DeleteStatus, RowBlock, Segment, SegmentData, SegmentReadOptions, Version};
use crate::table::TabletSchema;
use crate::{Result, StorageError};

/// Rows per materialized block.
pub const DEFAULT_BLOCK_ROWS: usize = 1024;

/// False positive rate of the per-column bloom filters (1%).
pub const BLOOM_FP_RATE: f64 = 0.01;

/// An immutable sorted run of full-width rows with one version range.
pub struct MemSegment {
    schema: Arc<TabletSchema>,
    version: Version,
    delete_flag: bool,
    rows: Vec<Vec<CellValue>>,
    zone_maps: Vec<ZoneMap>,
    blooms: AHashMap<u32, Bloom<[u8]>>,
    block_rows: usize,
}

impl MemSegment {
    /// Build a data segment. Rows are full schema width and get sorted by
    /// the key prefix.
    pub fn new(
        schema: Arc<TabletSchema>,
        version: Version,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Arc<MemSegment>> {
        Self::build(schema, version, rows, false, DEFAULT_BLOCK_ROWS)
    }

    /// Build a tombstone segment: its rows mark keys as deleted for the
    /// unique-keys merge.
    pub fn tombstone(
        schema: Arc<TabletSchema>,
        version: Version,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Arc<MemSegment>> {
        Self::build(schema, version, rows, true, DEFAULT_BLOCK_ROWS)
    }

    /// Build with an explicit block size; small blocks are useful in tests.
    pub fn with_block_rows(
        schema: Arc<TabletSchema>,
        version: Version,
        rows: Vec<Vec<CellValue>>,
        block_rows: usize,
    ) -> Result<Arc<MemSegment>> {
        Self::build(schema, version, rows, false, block_rows)
    }

    fn build(
        schema: Arc<TabletSchema>,
        version: Version,
        mut rows: Vec<Vec<CellValue>>,
        delete_flag: bool,
        block_rows: usize,
    ) -> Result<Arc<MemSegment>> {
        let width = schema.num_columns();
        for row in &rows {
            if row.len() != width {
                return Err(StorageError::InvalidParameter(format!(
                    "segment row has {} cells, schema has {} columns",
                    row.len(),
                    width
                )));
            }
        }
        let num_keys = schema.num_key_columns();
        rows.sort_by(|a, b| cmp_key_prefix(a, b, num_keys));

        let zone_maps = build_zone_maps(&schema, &rows);
        let blooms = build_blooms(&schema, &rows);

        Ok(Arc::new(MemSegment {
            schema,
            version,
            delete_flag,
            rows,
            zone_maps,
            blooms,
            block_rows: block_rows.max(1),
        }))
    }

    pub fn zone_map(&self, cid: u32) -> &ZoneMap {
        &self.zone_maps[cid as usize]
    }
}

fn cmp_key_prefix(a: &[CellValue], b: &[CellValue], num_keys: usize) -> Ordering {
    for i in 0..num_keys {
        let ord = a[i].cmp(&b[i]);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compare a stored row against a partial scan key over the key fields the
/// scan key carries.
fn cmp_row_to_key(row: &[CellValue], key: &RowCursor) -> Ordering {
    for cid in 0..key.field_count() {
        let ord = row[cid].cmp(key.get(cid as u32));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn build_zone_maps(schema: &TabletSchema, rows: &[Vec<CellValue>]) -> Vec<ZoneMap> {
    (0..schema.num_columns())
        .map(|slot| {
            let mut has_null = false;
            let mut range: Option<(CellValue, CellValue)> = None;
            for row in rows {
                let cell = &row[slot];
                if cell.is_null() {
                    has_null = true;
                    continue;
                }
                range = Some(match range.take() {
                    None => (cell.clone(), cell.clone()),
                    Some((min, max)) => (
                        if *cell < min { cell.clone() } else { min },
                        if *cell > max { cell.clone() } else { max },
                    ),
                });
            }
            ZoneMap { has_null, range }
        })
        .collect()
}

fn build_blooms(schema: &TabletSchema, rows: &[Vec<CellValue>]) -> AHashMap<u32, Bloom<[u8]>> {
    let mut blooms = AHashMap::new();
    for column in schema.columns() {
        if !column.is_bloom_filter {
            continue;
        }
        let mut filter: Bloom<[u8]> = Bloom::new_for_fp_rate(rows.len().max(1), BLOOM_FP_RATE);
        for row in rows {
            let cell = &row[column.id as usize];
            if !cell.is_null() {
                filter.set(&cell.key_bytes());
            }
        }
        blooms.insert(column.id, filter);
    }
    blooms
}

impl Segment for MemSegment {
    fn version(&self) -> Version {
        self.version
    }

    fn num_rows(&self) -> u64 {
        self.rows.len() as u64
    }

    fn delete_flag(&self) -> bool {
        self.delete_flag
    }

    fn open(self: Arc<Self>) -> Box<dyn SegmentData> {
        Box::new(MemSegmentData {
            segment: self,
            options: None,
            seek: Arc::new(Vec::new()),
            delete_status: DeleteStatus::NotSatisfied,
            next_row: 0,
            end_row: 0,
        })
    }
}

/// Per-reader handle over a [`MemSegment`].
pub struct MemSegmentData {
    segment: Arc<MemSegment>,
    options: Option<SegmentReadOptions>,
    seek: Arc<Vec<u32>>,
    delete_status: DeleteStatus,
    next_row: usize,
    end_row: usize,
}

impl MemSegmentData {
    fn options(&self) -> Result<&SegmentReadOptions> {
        self.options
            .as_ref()
            .ok_or_else(|| StorageError::Segment("read options not set".into()))
    }
}

impl SegmentData for MemSegmentData {
    fn version(&self) -> Version {
        self.segment.version
    }

    fn num_rows(&self) -> u64 {
        self.segment.rows.len() as u64
    }

    fn empty(&self) -> bool {
        self.segment.rows.is_empty()
    }

    fn delete_flag(&self) -> bool {
        self.segment.delete_flag
    }

    fn set_read_options(&mut self, options: SegmentReadOptions) -> Result<()> {
        let width = self.segment.schema.num_columns();
        for &cid in options.seek_columns.iter().chain(&options.return_columns) {
            if cid as usize >= width {
                return Err(StorageError::ColumnNotFound(format!("column id {}", cid)));
            }
        }
        self.seek = Arc::new(options.seek_columns.clone());
        self.options = Some(options);
        Ok(())
    }

    fn delta_pruning_filter(&self) -> bool {
        let Some(options) = self.options.as_ref() else {
            return false;
        };
        if self.segment.rows.is_empty() {
            return false;
        }

        // column statistics: any condition that matches nothing in the zone
        // proves the segment empty for this read
        for (&cid, conds) in options.conditions.columns() {
            let zone = self.segment.zone_map(cid);
            if conds.iter().any(|cond| cond.eval_zone(zone) == ZoneEval::None) {
                return true;
            }
        }

        // bloom filters: equality probes on bloom-enabled columns
        for predicate in options.predicates.iter() {
            if !options.bloom_filter_columns.contains(&predicate.column_id()) {
                continue;
            }
            let Some(filter) = self.segment.blooms.get(&predicate.column_id()) else {
                continue;
            };
            if let Some(probes) = predicate.bloom_probe_values() {
                if probes
                    .iter()
                    .all(|value| !filter.check(&value.key_bytes()))
                {
                    return true;
                }
            }
        }
        false
    }

    fn delete_pruning_filter(&self) -> DeleteStatus {
        let Some(options) = self.options.as_ref() else {
            return DeleteStatus::NotSatisfied;
        };
        if self.segment.rows.is_empty() {
            return DeleteStatus::NotSatisfied;
        }

        let mut partial = false;
        for dc in options.delete_handler.conditions() {
            if self.segment.version.end > dc.version {
                continue;
            }
            // conjunction over the zones: every sub-condition must cover the
            // whole segment for the delete to swallow it
            let mut covers_all = true;
            let mut covers_none = false;
            for (cid, cond) in dc.conds() {
                match cond.eval_zone(self.segment.zone_map(*cid)) {
                    ZoneEval::All => {}
                    ZoneEval::Some => covers_all = false,
                    ZoneEval::None => {
                        covers_none = true;
                        break;
                    }
                }
            }
            if covers_none {
                continue;
            }
            if covers_all {
                return DeleteStatus::Satisfied;
            }
            partial = true;
        }
        if partial {
            DeleteStatus::PartialSatisfied
        } else {
            DeleteStatus::NotSatisfied
        }
    }

    fn set_delete_status(&mut self, status: DeleteStatus) {
        self.delete_status = status;
    }

    fn prepare_block_read(
        &mut self,
        start_key: Option<&RowCursor>,
        after_start: bool,
        end_key: Option<&RowCursor>,
        include_end: bool,
    ) -> Result<Option<RowBlock>> {
        self.options()?;
        let rows = &self.segment.rows;
        let lo = match start_key {
            None => 0,
            Some(key) if after_start => {
                rows.partition_point(|row| cmp_row_to_key(row, key) != Ordering::Greater)
            }
            Some(key) => rows.partition_point(|row| cmp_row_to_key(row, key) == Ordering::Less),
        };
        let hi = match end_key {
            None => rows.len(),
            Some(key) if include_end => {
                rows.partition_point(|row| cmp_row_to_key(row, key) != Ordering::Greater)
            }
            Some(key) => rows.partition_point(|row| cmp_row_to_key(row, key) == Ordering::Less),
        };
        self.next_row = lo;
        self.end_row = hi.max(lo);
        self.get_next_block()
    }

    fn get_next_block(&mut self) -> Result<Option<RowBlock>> {
        let options = self
            .options
            .as_ref()
            .ok_or_else(|| StorageError::Segment("read options not set".into()))?;

        loop {
            if self.next_row >= self.end_row {
                return Ok(None);
            }
            let batch_end = (self.next_row + self.segment.block_rows).min(self.end_row);
            let candidates = &self.segment.rows[self.next_row..batch_end];
            self.next_row = batch_end;
            options.stats.inc_raw_rows_read(candidates.len() as u64);

            // pushed-down predicates narrow a selection bitmap per column
            let mut selection = vec![true; candidates.len()];
            for predicate in options.predicates.iter() {
                let slot = predicate.column_id() as usize;
                let column: Vec<CellValue> =
                    candidates.iter().map(|row| row[slot].clone()).collect();
                predicate.evaluate(&column, &mut selection);
            }

            let mut kept: Vec<Vec<CellValue>> = Vec::new();
            for (row, selected) in candidates.iter().zip(&selection) {
                if *selected {
                    kept.push(self.seek.iter().map(|&cid| row[cid as usize].clone()).collect());
                }
            }
            let dropped = candidates.len() - kept.len();
            if dropped > 0 {
                options.stats.inc_rows_cond_filtered(dropped as u64);
            }
            if !kept.is_empty() {
                return Ok(Some(RowBlock::new(
                    self.seek.clone(),
                    kept,
                    self.delete_status,
                )));
            }
            // whole batch filtered out, keep scanning the range
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FieldType;
    use crate::query::conditions::{Condition, Conditions};
    use crate::query::delete::DeleteHandler;
    use crate::query::predicate::parse_to_predicate;
    use crate::query::reader::ReadStats;
    use crate::table::{AggregationMethod, ColumnMeta, DeleteRecord, KeysType, Tablet};
    use ahash::AHashSet;

    fn test_schema() -> Arc<TabletSchema> {
        Arc::new(
            TabletSchema::new(
                KeysType::DupKeys,
                vec![
                    ColumnMeta::key(0, "k", FieldType::BigInt),
                    ColumnMeta::value(1, "name", FieldType::Varchar, AggregationMethod::None)
                        .with_bloom_filter(),
                ],
            )
            .unwrap(),
        )
    }

    fn rows(pairs: &[(i64, &str)]) -> Vec<Vec<CellValue>> {
        pairs
            .iter()
            .map(|(k, name)| {
                vec![
                    CellValue::BigInt(*k),
                    CellValue::Varchar(name.to_string()),
                ]
            })
            .collect()
    }

    fn options(
        conditions: Conditions,
        predicates: Vec<crate::query::predicate::ColumnPredicate>,
        bf_columns: AHashSet<u32>,
        delete_handler: DeleteHandler,
    ) -> SegmentReadOptions {
        SegmentReadOptions {
            return_columns: vec![0, 1],
            seek_columns: vec![0, 1],
            bloom_filter_columns: bf_columns,
            conditions: Arc::new(conditions),
            predicates: Arc::new(predicates),
            delete_handler: Arc::new(delete_handler),
            stats: Arc::new(ReadStats::default()),
            use_index_cache: false,
        }
    }

    fn plain_options(schema: &Arc<TabletSchema>) -> SegmentReadOptions {
        options(
            Conditions::new(schema.clone()),
            Vec::new(),
            AHashSet::new(),
            DeleteHandler::empty(),
        )
    }

    fn drain(data: &mut dyn SegmentData, first: Option<RowBlock>) -> Vec<i64> {
        let mut out = Vec::new();
        let mut block = first;
        while let Some(b) = block {
            for i in 0..b.num_rows() {
                let mut cursor = RowCursor::new(test_schema(), vec![0, 1]);
                b.get_row(i, &mut cursor);
                if let CellValue::BigInt(v) = cursor.get(0) {
                    out.push(*v);
                }
            }
            block = data.get_next_block().unwrap();
        }
        out
    }

    #[test]
    fn test_range_slicing() {
        let schema = test_schema();
        let segment = MemSegment::new(
            schema.clone(),
            Version::new(0, 1),
            rows(&[(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")]),
        )
        .unwrap();
        let mut data = segment.open();
        data.set_read_options(plain_options(&schema)).unwrap();

        let start = RowCursor::scan_key(schema.clone(), &["2".to_string()]).unwrap();
        let end = RowCursor::scan_key(schema.clone(), &["4".to_string()]).unwrap();

        let block = data
            .prepare_block_read(Some(&start), false, Some(&end), false)
            .unwrap();
        assert_eq!(drain(data.as_mut(), block), vec![2, 3]);

        let block = data
            .prepare_block_read(Some(&start), true, Some(&end), true)
            .unwrap();
        assert_eq!(drain(data.as_mut(), block), vec![3, 4]);

        let block = data.prepare_block_read(None, false, None, false).unwrap();
        assert_eq!(drain(data.as_mut(), block), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_range_is_eof() {
        let schema = test_schema();
        let segment =
            MemSegment::new(schema.clone(), Version::new(0, 1), rows(&[(1, "a")])).unwrap();
        let mut data = segment.open();
        data.set_read_options(plain_options(&schema)).unwrap();

        let start = RowCursor::scan_key(schema.clone(), &["9".to_string()]).unwrap();
        let block = data.prepare_block_read(Some(&start), false, None, false).unwrap();
        assert!(block.is_none());
    }

    #[test]
    fn test_zone_map_pruning() {
        let schema = test_schema();
        let segment = MemSegment::new(
            schema.clone(),
            Version::new(0, 1),
            rows(&[(1, "a"), (5, "b")]),
        )
        .unwrap();
        let mut data = segment.open();

        let mut conditions = Conditions::new(schema.clone());
        conditions
            .append(&Condition::new("k", ">>", &["100"]))
            .unwrap();
        data.set_read_options(options(
            conditions,
            Vec::new(),
            AHashSet::new(),
            DeleteHandler::empty(),
        ))
        .unwrap();
        assert!(data.delta_pruning_filter());
    }

    #[test]
    fn test_bloom_filter_pruning() {
        let schema = test_schema();
        let segment = MemSegment::new(
            schema.clone(),
            Version::new(0, 1),
            rows(&[(1, "alice"), (2, "carol")]),
        )
        .unwrap();
        let mut data = segment.open();

        // "bob" sits inside the zone range, so only the bloom filter can
        // prove it absent
        let condition = Condition::new("name", "*=", &["bob"]);
        let mut conditions = Conditions::new(schema.clone());
        conditions.append(&condition).unwrap();
        let predicate = parse_to_predicate(&schema, &condition).unwrap().unwrap();
        let mut bf_columns = AHashSet::new();
        bf_columns.insert(1);

        data.set_read_options(options(
            conditions,
            vec![predicate],
            bf_columns,
            DeleteHandler::empty(),
        ))
        .unwrap();
        // a false positive merely skips the pruning; the predicate still
        // leaves nothing to read
        if !data.delta_pruning_filter() {
            let block = data.prepare_block_read(None, false, None, false).unwrap();
            assert!(block.is_none());
        }
    }

    #[test]
    fn test_predicate_filters_rows_in_blocks() {
        let schema = test_schema();
        let segment = MemSegment::new(
            schema.clone(),
            Version::new(0, 1),
            rows(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]),
        )
        .unwrap();
        let mut data = segment.open();

        let condition = Condition::new("k", ">=", &["3"]);
        let mut conditions = Conditions::new(schema.clone());
        conditions.append(&condition).unwrap();
        let predicate = parse_to_predicate(&schema, &condition).unwrap().unwrap();
        let opts = options(
            conditions,
            vec![predicate],
            AHashSet::new(),
            DeleteHandler::empty(),
        );
        let stats = opts.stats.clone();
        data.set_read_options(opts).unwrap();

        let block = data.prepare_block_read(None, false, None, false).unwrap();
        assert_eq!(drain(data.as_mut(), block), vec![3, 4]);
        assert_eq!(stats.snapshot().rows_cond_filtered, 2);
        assert_eq!(stats.snapshot().raw_rows_read, 4);
    }

    #[test]
    fn test_delete_pruning_three_way() {
        let schema = test_schema();
        let tablet = Tablet::new("t", (*schema).clone());
        tablet.add_delete_record(DeleteRecord {
            version: 10,
            conditions: vec![Condition::new("k", "<=", &["100"])],
        });
        let full = DeleteHandler::build(&tablet, 10).unwrap();

        let segment = MemSegment::new(
            schema.clone(),
            Version::new(0, 1),
            rows(&[(1, "a"), (5, "b")]),
        )
        .unwrap();
        let mut data = segment.clone().open();
        data.set_read_options(options(
            Conditions::new(schema.clone()),
            Vec::new(),
            AHashSet::new(),
            full.clone(),
        ))
        .unwrap();
        assert_eq!(data.delete_pruning_filter(), DeleteStatus::Satisfied);

        // a delete recorded before this segment's version does not apply
        let newer = MemSegment::new(
            schema.clone(),
            Version::new(11, 20),
            rows(&[(1, "a")]),
        )
        .unwrap();
        let mut newer_data = newer.open();
        newer_data
            .set_read_options(options(
                Conditions::new(schema.clone()),
                Vec::new(),
                AHashSet::new(),
                full.clone(),
            ))
            .unwrap();
        assert_eq!(
            newer_data.delete_pruning_filter(),
            DeleteStatus::NotSatisfied
        );

        // partial coverage
        let tablet2 = Tablet::new("t2", (*schema).clone());
        tablet2.add_delete_record(DeleteRecord {
            version: 10,
            conditions: vec![Condition::new("k", "<=", &["3"])],
        });
        let partial = DeleteHandler::build(&tablet2, 10).unwrap();
        let mut partial_data = segment.clone().open();
        partial_data
            .set_read_options(options(
                Conditions::new(schema.clone()),
                Vec::new(),
                AHashSet::new(),
                partial,
            ))
            .unwrap();
        assert_eq!(
            partial_data.delete_pruning_filter(),
            DeleteStatus::PartialSatisfied
        );
    }
}
