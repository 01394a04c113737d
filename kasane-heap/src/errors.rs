//! ヒープアクセスのエラー型

use crate::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeapError {
    #[error("Address 0x{address:x} (+{size} bytes) is not in any memory segment")]
    Unmapped { address: Address, size: usize },

    #[error("Failed to convert {actual} bytes to {type_name} (expected {expected} bytes)")]
    ShortRead {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown method table 0x{0:x}")]
    UnknownType(Address),

    #[error("Type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("Type '{0}' is not an array type")]
    NotAnArray(String),

    #[error("Array index {index} out of range (length {length})")]
    IndexOutOfRange { index: u64, length: u64 },

    #[error("Unsupported pointer size {0}")]
    UnsupportedPointerSize(u64),

    #[error("Segments at 0x{0:x} overlap")]
    OverlappingSegments(Address),

    #[error("Invalid snapshot file: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
}
