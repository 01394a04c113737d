//! 非同期グラフの描画
//!
//! 3つの描画方法があります。
//!
//! - [`stacks`]: トップレベルのノードごとにスタックを木として表示（既定）
//! - [`stats`]: 説明文字列ごとの件数（`--stats`）
//! - [`coalesce`]: 同じ説明のフレームをまとめた木（`--coalesce`）
//!
//! どれもネイティブの再帰を使わず、明示的なワークスタックでグラフをたどります。

pub mod coalesce;
pub mod fields;
pub mod stacks;
pub mod stats;

use crate::output::{OutputSink, Printer};
use crate::{DumpAsyncOptions, Result};
use kasane_async::{AsyncClassifier, AsyncGraph, AsyncNode, CancellationToken, Describer};
use kasane_heap::HeapValue;
use std::collections::HashSet;

/// インデント1段の幅（空白数）
pub const TAB_WIDTH: usize = 2;

/// 木をたどる深さの上限
pub const MAX_RENDER_DEPTH: usize = 1024;

/// 深さに応じたインデント
pub fn tabs(depth: usize) -> String {
    " ".repeat(depth * TAB_WIDTH)
}

/// 描画に必要な情報一式
pub struct RenderContext<'a, 'h> {
    pub graph: &'a AsyncGraph<'h>,
    pub classifier: &'a AsyncClassifier<'h>,
    pub describer: &'a Describer<'a, 'h>,
    pub options: &'a DumpAsyncOptions,
    pub cancel: &'a CancellationToken,
}

impl<'a, 'h> RenderContext<'a, 'h> {
    pub fn printer<'s>(&self, sink: &'s mut dyn OutputSink) -> Printer<'s> {
        Printer::new(sink, self.classifier.heap().pointer_size(), self.options)
    }

    pub fn describe(&self, value: &HeapValue<'h>) -> String {
        self.describer.describe(value)
    }

    /// フレーム行の括弧内（ステートマシンなら await 位置、それ以外は状態フラグ）
    pub fn state_label(&self, node: &AsyncNode<'h>) -> String {
        if node.is_state_machine() {
            node.await_state.unwrap_or_default().to_string()
        } else {
            node.state_flags.describe()
        }
    }

    /// 描画対象のトップレベルノード（列挙順）
    pub fn included_roots(&self) -> Result<Vec<&'a AsyncNode<'h>>> {
        let mut roots = Vec::new();
        for node in self.graph.nodes() {
            self.cancel.check()?;
            if node.top_level && self.should_include_stack(node) {
                roots.push(node);
            }
        }
        Ok(roots)
    }

    /// ノードから始まるスタックを表示すべきか
    ///
    /// 連鎖のどこかで絞り込み条件に合うノードが見つかり、かつ（`--tasks` 指定時を除き）
    /// ステートマシンが見つかった時点で true です。
    pub fn should_include_stack(&self, root: &AsyncNode<'h>) -> bool {
        let mut saw_match = false;
        let mut saw_state_machine = self.options.include_tasks;
        let mut visited = HashSet::new();
        let mut pending = vec![root];

        while let Some(node) = pending.pop() {
            if !visited.insert(node.address()) {
                continue;
            }
            saw_match |= node.matches_filter;
            saw_state_machine |= node.is_state_machine();
            if saw_match && saw_state_machine {
                return true;
            }
            pending.extend(node.continuations.iter().filter_map(|&c| self.graph.get(c)));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_async::{AsyncMethodSpec, BuildOptions, CoreLib, GraphBuilder, ObjectFilter};
    use kasane_heap::HeapBuilder;

    #[test]
    fn test_tabs() {
        assert_eq!(tabs(0), "");
        assert_eq!(tabs(3), "      ");
    }

    #[test]
    fn test_gate_requires_state_machine_unless_tasks() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        let method = core
            .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Main>d__0"))
            .unwrap();
        let lone = core.alloc_task(&mut b, 0).unwrap();
        let head = core.alloc_task(&mut b, 0).unwrap();
        let frame = core.alloc_frame(&mut b, &method, 0, 0).unwrap();
        core.set_continuation(&mut b, head, frame).unwrap();
        let heap = b.build();

        let classifier = AsyncClassifier::new(&heap).unwrap();
        let describer = Describer::new(&classifier);
        let cancel = CancellationToken::new();
        let filter = ObjectFilter::new();
        let graph = GraphBuilder::new(&classifier, &filter, BuildOptions::default(), &cancel)
            .build()
            .unwrap();

        let options = DumpAsyncOptions::default();
        let ctx = RenderContext {
            graph: &graph,
            classifier: &classifier,
            describer: &describer,
            options: &options,
            cancel: &cancel,
        };
        let roots: Vec<_> = ctx.included_roots().unwrap().iter().map(|n| n.address()).collect();
        assert_eq!(roots, vec![head]);

        let options = DumpAsyncOptions {
            include_tasks: true,
            ..DumpAsyncOptions::default()
        };
        let ctx = RenderContext { options: &options, ..ctx };
        let roots: Vec<_> = ctx.included_roots().unwrap().iter().map(|n| n.address()).collect();
        assert_eq!(roots, vec![lone, head]);
    }
}
