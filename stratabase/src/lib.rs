//! StrataBase Tablet Read Core
//!
//! The versioned read path of a columnar tablet storage engine implemented in
//! Rust. A tablet is a sorted, versioned shard of a table; its data lives in
//! immutable segments, each covering a version range. This crate merges rows
//! out of those segments according to the table's key semantics (duplicate,
//! unique, or aggregating keys) while pushing range scans, typed column
//! predicates, and delete-version filters down to the segment layer.

pub mod data;
pub mod query;
pub mod storage;
pub mod table;

// Re-export main types
pub use data::row::RowCursor;
pub use data::{CellValue, Decimal12, FieldType};
pub use query::{
    Condition, Conditions, DeleteHandler, ReadParams, ReadStats, ReadStatsSnapshot, Reader,
    ReaderType,
};
pub use storage::mem_segment::MemSegment;
pub use storage::{DeleteStatus, RowBlock, Segment, SegmentData, SegmentReadOptions, Version};
pub use table::{AggregationMethod, ColumnMeta, DeleteRecord, KeysType, Tablet, TabletSchema};

/// Storage engine error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Version not exist: {0}")]
    VersionNotExist(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid input parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid value literal: {0}")]
    InvalidValue(String),

    #[error("Failed to build scan iterator: {0}")]
    GetIterator(String),

    #[error("Segment error: {0}")]
    Segment(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
