//! 開いているヒープスナップショット

use crate::output::OutputSink;
use crate::{dump_async, DumpAsyncOptions, Result};
use anyhow::Context;
use kasane_async::CancellationToken;
use kasane_heap::{load_snapshot, HeapSnapshot, InMemoryHeap};
use std::path::{Path, PathBuf};
use tracing::info;

/// 解析セッション
///
/// スナップショットを1つ保持し、コマンドごとに同じキャンセルトークンを使い回します。
pub struct Session {
    heap: InMemoryHeap,
    path: Option<PathBuf>,
    cancel: CancellationToken,
}

impl Session {
    /// スナップショットファイルを開く
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let heap = load_snapshot(path)
            .with_context(|| format!("Failed to load heap snapshot '{}'", path.display()))?;
        info!(
            "Loaded {} ({} types, {}-bit)",
            path.display(),
            heap.types().count(),
            heap.pointer_size() * 8
        );
        Ok(Self {
            heap,
            path: Some(path.to_path_buf()),
            cancel: CancellationToken::new(),
        })
    }

    /// 構築済みのヒープからセッションを作る
    pub fn from_heap(heap: InMemoryHeap) -> Self {
        Self {
            heap,
            path: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn heap(&self) -> &InMemoryHeap {
        &self.heap
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Ctrl-C ハンドラなどからキャンセルするためのトークン
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// dumpasync を実行する
    pub fn dump_async(&self, options: &DumpAsyncOptions, sink: &mut dyn OutputSink) -> Result<()> {
        self.cancel.reset();
        dump_async(&self.heap, options, sink, &self.cancel)
    }
}
