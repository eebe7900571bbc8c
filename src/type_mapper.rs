//! Maps logical frame column types to the column types used when a write creates a table.
//!
//! The mapping is an ordered rule list evaluated top to bottom; the first matching rule wins and
//! anything unmatched becomes a bounded string.

use crate::frame::Column;
use crate::types::DType;

/// Length used for every string column created by a write.
pub const STRING_LENGTH: u32 = 255;

/// Column type declared when a write creates its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetColumnType {
    SmallInteger,
    BigInteger,
    Float,
    Boolean,
    DateTime,
    String { length: u32 },
}

/// Column name paired with the type to declare for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDecl {
    pub name: String,
    pub column_type: TargetColumnType,
}

type Rule = (fn(DType) -> bool, TargetColumnType);

const RULES: &[Rule] = &[
    (DType::is_small_integer, TargetColumnType::SmallInteger),
    (DType::is_integer, TargetColumnType::BigInteger),
    (DType::is_float, TargetColumnType::Float),
    (DType::is_bool, TargetColumnType::Boolean),
    (DType::is_temporal, TargetColumnType::DateTime),
    (
        DType::is_textual,
        TargetColumnType::String {
            length: STRING_LENGTH,
        },
    ),
];

const FALLBACK: TargetColumnType = TargetColumnType::String {
    length: STRING_LENGTH,
};

#[must_use]
pub fn target_type(dtype: DType) -> TargetColumnType {
    RULES
        .iter()
        .find(|(matches, _)| matches(dtype))
        .map_or(FALLBACK, |(_, target)| *target)
}

/// Declarations for every column, in column order.
#[must_use]
pub fn map_columns(columns: &[Column]) -> Vec<ColumnDecl> {
    columns
        .iter()
        .map(|column| ColumnDecl {
            name: column.name.clone(),
            column_type: target_type(column.dtype),
        })
        .collect()
}
