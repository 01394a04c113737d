//! 解析のエラー型

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Unable to examine the heap.")]
    HeapNotWalkable,

    #[error("Unable to find required type '{0}'.")]
    MissingType(String),

    #[error("Operation cancelled.")]
    Cancelled,
}
