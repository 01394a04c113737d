//! スナップショットファイル（JSON）の読み書き

use crate::{Address, HeapError, HeapType, InMemoryHeap, MemoryImage, Result, Segment};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// 現在のファイル形式バージョン
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// スナップショットファイルの内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub pointer_size: u64,
    #[serde(default = "default_can_walk_heap")]
    pub can_walk_heap: bool,
    pub types: Vec<HeapType>,
    pub segments: Vec<Segment>,
    /// ヒープ列挙順のオブジェクトアドレス
    pub objects: Vec<Address>,
}

fn default_can_walk_heap() -> bool {
    true
}

impl SnapshotFile {
    /// スナップショットからファイル内容を作成する
    pub fn from_heap(heap: &InMemoryHeap) -> Self {
        use crate::HeapSnapshot;

        let mut types: Vec<HeapType> = heap.types().cloned().collect();
        types.sort_by_key(|t| t.method_table);
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            pointer_size: heap.pointer_size(),
            can_walk_heap: heap.can_walk_heap(),
            types,
            segments: heap.memory().segments().to_vec(),
            objects: heap.object_list().to_vec(),
        }
    }

    /// ファイル内容からスナップショットを作成する
    pub fn into_heap(self) -> Result<InMemoryHeap> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(HeapError::InvalidSnapshot(format!(
                "unsupported format version {}",
                self.version
            ))
            .into());
        }
        if !matches!(self.pointer_size, 4 | 8) {
            return Err(HeapError::UnsupportedPointerSize(self.pointer_size).into());
        }
        let memory = MemoryImage::from_segments(self.segments)?;
        Ok(InMemoryHeap::new(
            self.pointer_size,
            self.can_walk_heap,
            self.types,
            memory,
            self.objects,
        ))
    }
}

/// スナップショットファイルを読み込む
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<InMemoryHeap> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read snapshot {:?}: {}", path, e))?;
    let file: SnapshotFile = serde_json::from_str(&text).map_err(HeapError::from)?;
    debug!("Loaded snapshot {:?}: {} types", path, file.types.len());
    file.into_heap()
}

/// スナップショットファイルを書き出す
pub fn save_snapshot<P: AsRef<Path>>(heap: &InMemoryHeap, path: P) -> Result<()> {
    let path = path.as_ref();
    let text = serde_json::to_string_pretty(&SnapshotFile::from_heap(heap)).map_err(HeapError::from)?;
    fs::write(path, text).map_err(|e| anyhow::anyhow!("Failed to write snapshot {:?}: {}", path, e))?;
    Ok(())
}
