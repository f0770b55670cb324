//! Tablet schema and tablet container
//!
//! A tablet is one shard of a table: an ordered column schema, a registry of
//! immutable versioned segments, and the history of delete predicates that
//! were applied to it. The segment and delete registries form the tablet
//! header, guarded by a reader-writer lock; readers take the shared side only
//! while acquiring data sources and building the delete handler.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::FieldType;
use crate::query::conditions::Condition;
use crate::storage::{Segment, SegmentData, Version};
use crate::{Result, StorageError};

/// Key semantics of a tablet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeysType {
    /// Every row is kept, duplicates included.
    DupKeys,
    /// One row per key; the newest version wins.
    UniqueKeys,
    /// One row per key; value columns fold by their aggregation method.
    AggKeys,
}

/// Aggregation method of a value column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationMethod {
    None,
    Sum,
    Min,
    Max,
    Replace,
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column id; equals the column's ordinal position in the schema.
    pub id: u32,
    pub name: String,
    pub field_type: FieldType,
    pub is_key: bool,
    pub aggregation: AggregationMethod,
    /// Schema length for fixed-length char columns.
    pub length: usize,
    /// Whether segments keep a bloom filter for this column.
    pub is_bloom_filter: bool,
}

impl ColumnMeta {
    /// Create a key column definition
    pub fn key(id: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            is_key: true,
            aggregation: AggregationMethod::None,
            length: 0,
            is_bloom_filter: false,
        }
    }

    /// Create a value column definition
    pub fn value(
        id: u32,
        name: impl Into<String>,
        field_type: FieldType,
        aggregation: AggregationMethod,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            is_key: false,
            aggregation,
            length: 0,
            is_bloom_filter: false,
        }
    }

    /// Set the char length
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Enable the per-segment bloom filter
    pub fn with_bloom_filter(mut self) -> Self {
        self.is_bloom_filter = true;
        self
    }
}

/// Ordered column schema of a tablet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabletSchema {
    columns: Vec<ColumnMeta>,
    keys_type: KeysType,
    num_key_columns: usize,
    num_short_key_columns: usize,
}

impl TabletSchema {
    /// Build a schema. Key columns must form a non-empty prefix and column
    /// ids must match ordinal positions.
    pub fn new(keys_type: KeysType, columns: Vec<ColumnMeta>) -> Result<TabletSchema> {
        if columns.is_empty() {
            return Err(StorageError::InvalidParameter(
                "schema has no columns".into(),
            ));
        }
        for (i, column) in columns.iter().enumerate() {
            if column.id as usize != i {
                return Err(StorageError::InvalidParameter(format!(
                    "column {} has id {} but position {}",
                    column.name, column.id, i
                )));
            }
        }
        let num_key_columns = columns.iter().take_while(|c| c.is_key).count();
        if num_key_columns == 0 {
            return Err(StorageError::InvalidParameter(
                "schema has no key columns".into(),
            ));
        }
        if columns[num_key_columns..].iter().any(|c| c.is_key) {
            return Err(StorageError::InvalidParameter(
                "key columns must form a schema prefix".into(),
            ));
        }
        Ok(TabletSchema {
            columns,
            keys_type,
            num_key_columns,
            num_short_key_columns: num_key_columns,
        })
    }

    /// Shrink the short key prefix used for index seeks.
    pub fn with_short_key_columns(mut self, n: usize) -> TabletSchema {
        self.num_short_key_columns = n.min(self.num_key_columns);
        self
    }

    pub fn keys_type(&self) -> KeysType {
        self.keys_type
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    pub fn num_short_key_columns(&self) -> usize {
        self.num_short_key_columns
    }

    pub fn column(&self, cid: u32) -> &ColumnMeta {
        &self.columns[cid as usize]
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn all_column_ids(&self) -> Vec<u32> {
        (0..self.columns.len() as u32).collect()
    }
}

/// One historical delete predicate: a conjunction of conditions recorded at
/// a version. It suppresses matching rows of all versions up to its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRecord {
    pub version: i64,
    pub conditions: Vec<Condition>,
}

/// Tablet header: the mutable registries behind the header lock.
#[derive(Default)]
struct TabletHeader {
    segments: Vec<Arc<dyn Segment>>,
    delete_records: Vec<DeleteRecord>,
}

/// A tablet: schema plus versioned segment and delete registries.
pub struct Tablet {
    name: String,
    schema: Arc<TabletSchema>,
    header: RwLock<TabletHeader>,
}

impl Tablet {
    pub fn new(name: impl Into<String>, schema: TabletSchema) -> Tablet {
        Tablet {
            name: name.into(),
            schema: Arc::new(schema),
            header: RwLock::new(TabletHeader::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<TabletSchema> {
        &self.schema
    }

    pub fn keys_type(&self) -> KeysType {
        self.schema.keys_type()
    }

    pub fn add_segment(&self, segment: Arc<dyn Segment>) {
        self.header.write().segments.push(segment);
    }

    pub fn add_delete_record(&self, record: DeleteRecord) {
        self.header.write().delete_records.push(record);
    }

    /// Open per-reader handles for every segment whose version range lies
    /// inside the requested inclusive range. Takes the header read lock for
    /// the duration of the resolution only.
    pub fn acquire_data_sources(&self, version: Version) -> Vec<Box<dyn SegmentData>> {
        let header = self.header.read();
        header
            .segments
            .iter()
            .filter(|s| {
                let v = s.version();
                v.begin >= version.begin && v.end <= version.end
            })
            .map(|s| s.clone().open())
            .collect()
    }

    /// Delete records with `version <= upto`, under the header read lock.
    pub fn delete_records_upto(&self, upto: i64) -> Vec<DeleteRecord> {
        let header = self.header.read();
        header
            .delete_records
            .iter()
            .filter(|r| r.version <= upto)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_validation() {
        assert!(TabletSchema::new(KeysType::DupKeys, vec![]).is_err());

        // value column before key column
        let columns = vec![
            ColumnMeta::value(0, "v", FieldType::BigInt, AggregationMethod::None),
            ColumnMeta::key(1, "k", FieldType::BigInt),
        ];
        assert!(TabletSchema::new(KeysType::DupKeys, columns).is_err());

        // id must match position
        let columns = vec![ColumnMeta::key(3, "k", FieldType::BigInt)];
        assert!(TabletSchema::new(KeysType::DupKeys, columns).is_err());

        let columns = vec![
            ColumnMeta::key(0, "k", FieldType::BigInt),
            ColumnMeta::value(1, "v", FieldType::BigInt, AggregationMethod::None),
        ];
        let schema = TabletSchema::new(KeysType::DupKeys, columns).unwrap();
        assert_eq!(schema.num_key_columns(), 1);
        assert_eq!(schema.num_short_key_columns(), 1);
    }

    #[test]
    fn test_delete_records_upto() {
        let schema = TabletSchema::new(
            KeysType::UniqueKeys,
            vec![
                ColumnMeta::key(0, "k", FieldType::BigInt),
                ColumnMeta::value(1, "v", FieldType::BigInt, AggregationMethod::Replace),
            ],
        )
        .unwrap();
        let tablet = Tablet::new("t", schema);
        tablet.add_delete_record(DeleteRecord {
            version: 3,
            conditions: vec![],
        });
        tablet.add_delete_record(DeleteRecord {
            version: 7,
            conditions: vec![],
        });

        assert_eq!(tablet.delete_records_upto(5).len(), 1);
        assert_eq!(tablet.delete_records_upto(7).len(), 2);
        assert_eq!(tablet.delete_records_upto(1).len(), 0);
    }
}
