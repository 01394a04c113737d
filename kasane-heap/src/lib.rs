//! Kasane ヒープスナップショットアクセス
//!
//! このクレートは、マネージドランタイムのヒープスナップショットを読み取るための機能を提供します。
//! オブジェクトの列挙、型情報（フィールド、メソッド、基底型）の参照、
//! フィールド名による型付き読み取り、スナップショットファイルの読み書きなどを行います。

pub mod builder;
pub mod errors;
pub mod file;
pub mod heap;
pub mod memory;
pub mod snapshot;
pub mod types;
pub mod value;

pub use builder::{HeapBuilder, TypeSpec};
pub use errors::HeapError;
pub use file::{load_snapshot, save_snapshot, SnapshotFile};
pub use heap::InMemoryHeap;
pub use memory::{MemoryImage, MemoryReadable, Segment};
pub use snapshot::{inherits_from, HeapSnapshot};
pub use types::{ElementType, FieldDef, HeapType, MethodDef, StaticFieldDef};
pub use value::HeapValue;

/// ヒープ上のアドレス
pub type Address = u64;

/// ヒープアクセスの結果型
pub type Result<T> = anyhow::Result<T>;
