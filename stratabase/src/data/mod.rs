//! Physical value types for tablet columns
//!
//! Columns carry one of a closed set of physical types: signed integers of
//! 8/16/32/64/128 bits, a fixed-point decimal, fixed-length char,
//! variable-length strings, a packed 24-bit date and a packed 64-bit
//! datetime. Values compare with a total order inside one physical type;
//! nulls sort before every non-null value. Scan keys and pushed-down
//! predicate operands arrive as text and are parsed into the column's
//! physical type here.

pub mod row;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, StorageError};

/// Physical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    LargeInt,
    Decimal,
    Char,
    Varchar,
    Hll,
    Date,
    DateTime,
}

/// Fixed-point decimal: 64-bit integer part plus a fraction scaled to
/// nine decimal digits. Both parts carry the sign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Decimal12 {
    pub integer: i64,
    pub fraction: i32,
}

const FRAC_DIGITS: usize = 9;

impl Decimal12 {
    pub fn new(integer: i64, fraction: i32) -> Decimal12 {
        Decimal12 { integer, fraction }
    }
}

impl FromStr for Decimal12 {
    type Err = StorageError;

    fn from_str(text: &str) -> Result<Decimal12> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StorageError::InvalidValue("empty decimal literal".into()));
        }
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        let integer: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| StorageError::InvalidValue(format!("bad decimal literal: {}", text)))?
        };
        let mut fraction: i32 = 0;
        if !frac_part.is_empty() {
            let digits: &str = &frac_part[..frac_part.len().min(FRAC_DIGITS)];
            let parsed: i32 = digits
                .parse()
                .map_err(|_| StorageError::InvalidValue(format!("bad decimal literal: {}", text)))?;
            fraction = parsed * 10i32.pow((FRAC_DIGITS - digits.len()) as u32);
        }
        if negative {
            Ok(Decimal12::new(-integer, -fraction))
        } else {
            Ok(Decimal12::new(integer, fraction))
        }
    }
}

impl fmt::Display for Decimal12 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.integer < 0 || self.fraction < 0 {
            write!(
                f,
                "-{}.{:09}",
                self.integer.unsigned_abs(),
                self.fraction.unsigned_abs()
            )
        } else {
            write!(f, "{}.{:09}", self.integer, self.fraction)
        }
    }
}

/// Parse `YYYY-MM-DD` into the packed 24-bit date representation
/// (`year << 9 | month << 5 | day`).
pub fn parse_date(text: &str) -> Result<u32> {
    let bad = || StorageError::InvalidValue(format!("bad date literal: {}", text));
    let mut parts = text.trim().splitn(3, '-');
    let year: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let month: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let day: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    if year > 9999 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(bad());
    }
    Ok((year << 9) | (month << 5) | day)
}

/// Parse `YYYY-MM-DD HH:MM:SS` into the packed numeric datetime
/// representation (`YYYYMMDDHHMMSS`).
pub fn parse_datetime(text: &str) -> Result<u64> {
    let bad = || StorageError::InvalidValue(format!("bad datetime literal: {}", text));
    let (date_part, time_part) = text.trim().split_once(' ').ok_or_else(bad)?;
    let packed_date = parse_date(date_part)?;
    let year = (packed_date >> 9) as u64;
    let month = ((packed_date >> 5) & 0x0f) as u64;
    let day = (packed_date & 0x1f) as u64;

    let mut parts = time_part.splitn(3, ':');
    let hour: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minute: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let second: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(bad());
    }
    Ok(year * 10_000_000_000
        + month * 100_000_000
        + day * 1_000_000
        + hour * 10_000
        + minute * 100
        + second)
}

/// A single typed cell value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    LargeInt(i128),
    Decimal(Decimal12),
    Char(String),
    Varchar(String),
    Date(u32),
    DateTime(u64),
}

impl CellValue {
    /// Parse a textual operand into the physical type of a column.
    /// `length` is the schema length of fixed-length char columns; char
    /// values are null-padded to `max(length, value length)`.
    pub fn parse(field_type: FieldType, length: usize, text: &str) -> Result<CellValue> {
        let bad = |what: &str| StorageError::InvalidValue(format!("bad {} literal: {}", what, text));
        let value = match field_type {
            FieldType::TinyInt => {
                CellValue::TinyInt(text.trim().parse().map_err(|_| bad("tinyint"))?)
            }
            FieldType::SmallInt => {
                CellValue::SmallInt(text.trim().parse().map_err(|_| bad("smallint"))?)
            }
            FieldType::Int => CellValue::Int(text.trim().parse().map_err(|_| bad("int"))?),
            FieldType::BigInt => CellValue::BigInt(text.trim().parse().map_err(|_| bad("bigint"))?),
            FieldType::LargeInt => {
                CellValue::LargeInt(text.trim().parse().map_err(|_| bad("largeint"))?)
            }
            FieldType::Decimal => CellValue::Decimal(text.parse()?),
            FieldType::Char => {
                let target = length.max(text.len());
                let mut padded = String::with_capacity(target);
                padded.push_str(text);
                while padded.len() < target {
                    padded.push('\0');
                }
                CellValue::Char(padded)
            }
            FieldType::Varchar | FieldType::Hll => CellValue::Varchar(text.to_string()),
            FieldType::Date => CellValue::Date(parse_date(text)?),
            FieldType::DateTime => CellValue::DateTime(parse_datetime(text)?),
        };
        Ok(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Stable byte encoding used as the bloom filter key for this value.
    pub fn key_bytes(&self) -> Vec<u8> {
        match self {
            CellValue::Null => vec![0],
            CellValue::TinyInt(v) => v.to_be_bytes().to_vec(),
            CellValue::SmallInt(v) => v.to_be_bytes().to_vec(),
            CellValue::Int(v) => v.to_be_bytes().to_vec(),
            CellValue::BigInt(v) => v.to_be_bytes().to_vec(),
            CellValue::LargeInt(v) => v.to_be_bytes().to_vec(),
            CellValue::Decimal(d) => {
                let mut bytes = Vec::with_capacity(12);
                bytes.extend_from_slice(&d.integer.to_be_bytes());
                bytes.extend_from_slice(&d.fraction.to_be_bytes());
                bytes
            }
            CellValue::Char(s) | CellValue::Varchar(s) => s.as_bytes().to_vec(),
            CellValue::Date(v) => v.to_be_bytes().to_vec(),
            CellValue::DateTime(v) => v.to_be_bytes().to_vec(),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::TinyInt(_) => 1,
            CellValue::SmallInt(_) => 2,
            CellValue::Int(_) => 3,
            CellValue::BigInt(_) => 4,
            CellValue::LargeInt(_) => 5,
            CellValue::Decimal(_) => 6,
            CellValue::Char(_) => 7,
            CellValue::Varchar(_) => 8,
            CellValue::Date(_) => 9,
            CellValue::DateTime(_) => 10,
        }
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &CellValue) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (TinyInt(a), TinyInt(b)) => a.cmp(b),
            (SmallInt(a), SmallInt(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (BigInt(a), BigInt(b)) => a.cmp(b),
            (LargeInt(a), LargeInt(b)) => a.cmp(b),
            (Decimal(a), Decimal(b)) => a.cmp(b),
            (Char(a) | Varchar(a), Char(b) | Varchar(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            // Mixed physical types never occur within one column; keep the
            // order deterministic anyway.
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &CellValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::TinyInt(v) => write!(f, "{}", v),
            CellValue::SmallInt(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::BigInt(v) => write!(f, "{}", v),
            CellValue::LargeInt(v) => write!(f, "{}", v),
            CellValue::Decimal(v) => write!(f, "{}", v),
            CellValue::Char(s) | CellValue::Varchar(s) => write!(f, "{}", s.trim_end_matches('\0')),
            CellValue::Date(v) => write!(f, "{}-{:02}-{:02}", v >> 9, (v >> 5) & 0x0f, v & 0x1f),
            CellValue::DateTime(v) => write!(f, "{}", v),
        }
    }
}
