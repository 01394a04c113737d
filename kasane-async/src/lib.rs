//! Kasane 非同期オペレーション解析
//!
//! このクレートは、ヒープスナップショットから非同期オペレーション（タスク、ステートマシンボックス）を
//! 見つけ出し、継続（continuation）をたどって「次に何が実行されるか」のグラフを構築します。
//! オブジェクトの分類、継続の展開、awaiter フィールドの推定などを行います。

pub mod awaiter;
pub mod cancel;
pub mod classifier;
pub mod continuation;
pub mod corelib;
pub mod describe;
pub mod errors;
pub mod filter;
pub mod flags;
pub mod graph;
pub mod schema;

pub use awaiter::{guess_awaited_object, AwaitedObject};
pub use cancel::CancellationToken;
pub use classifier::{AsyncClassifier, NodeKind, MIN_TASK_SIZE};
pub use continuation::ContinuationResolver;
pub use corelib::{AsyncMethodSpec, AsyncMethodTypes, AwaiterKind, CoreLib};
pub use describe::Describer;
pub use errors::AnalysisError;
pub use filter::ObjectFilter;
pub use flags::TaskStateFlags;
pub use graph::{AsyncGraph, AsyncNode, BuildOptions, GraphBuilder};
pub use schema::{TaskSchema, TaskShape};

/// async解析の結果型
pub type Result<T> = anyhow::Result<T>;
