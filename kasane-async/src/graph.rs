//! 非同期オペレーションのグラフ構築
//!
//! ヒープ全体を1回走査してタスクとステートマシンボックスを集め、各ノードの継続を解決します。
//! 2回目の走査で、他のノードの継続になっているノードをトップレベルから外します。

use crate::{
    AsyncClassifier, CancellationToken, ContinuationResolver, NodeKind, ObjectFilter, Result,
    TaskStateFlags,
};
use kasane_heap::{Address, HeapValue};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// 非同期オペレーション（グラフのノード）
#[derive(Debug, Clone)]
pub struct AsyncNode<'h> {
    pub object: HeapValue<'h>,
    pub kind: NodeKind,
    pub state_flags: TaskStateFlags,
    /// ステートマシンの `<>1__state`（ボックスのみ）
    pub await_state: Option<i32>,
    /// ステートマシン本体（インライン値型またはオブジェクト）
    pub state_machine: Option<HeapValue<'h>>,
    /// グラフ内のノードを指す継続
    pub continuations: Vec<Address>,
    /// ノードにならなかった継続先
    pub raw_continuations: Vec<HeapValue<'h>>,
    /// 解決順の全継続先（ノードと生の継続が混在する）
    pub targets: Vec<HeapValue<'h>>,
    /// ユーザーの絞り込み条件を満たすか
    pub matches_filter: bool,
    /// 他のノードの継続になっていないか
    pub top_level: bool,
    /// 再開時に実行されるコードのアドレス
    pub native_code: Option<Address>,
}

impl<'h> AsyncNode<'h> {
    pub fn address(&self) -> Address {
        self.object.address()
    }

    pub fn is_state_machine(&self) -> bool {
        self.kind == NodeKind::CoroutineFrame
    }

    pub fn is_completed(&self) -> bool {
        self.state_flags.is_completed()
    }
}

/// グラフ構築のオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// ボックス以外のタスクも含める（`--tasks`）
    pub include_tasks: bool,
    /// 完了済みのものも含める（`--completed`）
    pub include_completed: bool,
    /// 統計表示のみ（`--stats`）
    pub stats_only: bool,
}

/// 非同期オペレーションのグラフ
///
/// ノードはヒープの列挙順に並びます。
#[derive(Debug, Default)]
pub struct AsyncGraph<'h> {
    nodes: Vec<AsyncNode<'h>>,
    index: HashMap<Address, usize>,
}

impl<'h> AsyncGraph<'h> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.index.contains_key(&address)
    }

    pub fn get(&self, address: Address) -> Option<&AsyncNode<'h>> {
        self.index.get(&address).map(|&i| &self.nodes[i])
    }

    /// 列挙順のノード
    pub fn nodes(&self) -> &[AsyncNode<'h>] {
        &self.nodes
    }

    /// トップレベルのノード
    pub fn roots(&self) -> impl Iterator<Item = &AsyncNode<'h>> {
        self.nodes.iter().filter(|n| n.top_level)
    }

    /// ノードを追加する（既にあれば何もせず false）
    pub fn insert(&mut self, node: AsyncNode<'h>) -> bool {
        let address = node.address();
        if self.index.contains_key(&address) {
            return false;
        }
        self.index.insert(address, self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// 継続先をノード間の辺と生の継続に振り分け、参照されたノードをトップレベルから外す
    fn link(&mut self, resolved: Vec<Vec<HeapValue<'h>>>, cancel: &CancellationToken) -> Result<()> {
        for (source, targets) in resolved.into_iter().enumerate() {
            cancel.check()?;
            for target in &targets {
                match self.index.get(&target.address()).copied() {
                    Some(t) => {
                        self.nodes[source].continuations.push(target.address());
                        self.nodes[t].top_level = false;
                    }
                    None => self.nodes[source].raw_continuations.push(*target),
                }
            }
            self.nodes[source].targets = targets;
        }
        Ok(())
    }
}

/// グラフのビルダー
pub struct GraphBuilder<'a, 'h> {
    classifier: &'a AsyncClassifier<'h>,
    filter: &'a ObjectFilter,
    options: BuildOptions,
    cancel: &'a CancellationToken,
}

impl<'a, 'h> GraphBuilder<'a, 'h> {
    pub fn new(
        classifier: &'a AsyncClassifier<'h>,
        filter: &'a ObjectFilter,
        options: BuildOptions,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            classifier,
            filter,
            options,
            cancel,
        }
    }

    /// ヒープを走査してグラフを構築する
    pub fn build(&self) -> Result<AsyncGraph<'h>> {
        let heap = self.classifier.heap();
        let resolver = ContinuationResolver::new(self.classifier, self.cancel);
        let mut graph = AsyncGraph::new();
        let mut resolved = Vec::new();
        let mut scanned = 0usize;

        for address in heap.enumerate_objects() {
            self.cancel.check()?;
            scanned += 1;

            let object = HeapValue::object(heap, address);
            if !object.is_valid() {
                trace!("Skipping invalid object 0x{:x}", address);
                continue;
            }
            let Some(kind) = self.classifier.classify(&object) else {
                continue;
            };
            // ランタイムによってはセグメントが重複して列挙される
            if graph.contains(address) {
                continue;
            }
            let matches_filter = self.filter.matches(&object);
            if self.options.stats_only
                && (!matches_filter || (!self.options.include_tasks && kind != NodeKind::CoroutineFrame))
            {
                continue;
            }
            let Some(state_flags) = self.classifier.state_flags(&object) else {
                continue;
            };
            if !self.options.include_completed && state_flags.is_completed() {
                continue;
            }

            let mut node = AsyncNode {
                object,
                kind,
                state_flags,
                await_state: None,
                state_machine: None,
                continuations: Vec::new(),
                raw_continuations: Vec::new(),
                targets: Vec::new(),
                matches_filter,
                top_level: true,
                native_code: None,
            };
            if kind == NodeKind::CoroutineFrame {
                self.read_state_machine(&mut node);
            }

            resolved.push(resolver.resolve(&object)?);
            graph.insert(node);
        }

        graph.link(resolved, self.cancel)?;
        debug!(
            "Scanned {} objects, found {} async objects ({} top level)",
            scanned,
            graph.len(),
            graph.roots().count()
        );
        Ok(graph)
    }

    /// ボックスからステートマシン本体と状態、再開コードを読み取る
    fn read_state_machine(&self, node: &mut AsyncNode<'h>) {
        let schema = self.classifier.schema();
        let Some(field) = node.object.field(schema.state_machine_field) else {
            return;
        };
        let state_machine = if field.is_value_type() {
            node.object.read_value_type_field_def(field)
        } else {
            node.object.read_object_field_def(field)
        };
        let Some(state_machine) = state_machine.filter(HeapValue::is_valid) else {
            return;
        };

        node.await_state = state_machine.read_field::<i32>(schema.await_state_field);
        if node.await_state.is_none() {
            warn!(
                "State machine of 0x{:x} has no readable {}",
                node.address(),
                schema.await_state_field
            );
        }

        if let Some(ty) = state_machine.ty() {
            for method in &ty.methods {
                if let Some(code) = method.native_code {
                    node.native_code = Some(code);
                    if method.name == schema.move_next_method {
                        break;
                    }
                }
            }
        }
        node.state_machine = Some(state_machine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corelib::{AsyncMethodSpec, CoreLib};
    use crate::AnalysisError;
    use kasane_heap::HeapBuilder;

    fn build<'h>(
        classifier: &AsyncClassifier<'h>,
        filter: &ObjectFilter,
        options: BuildOptions,
    ) -> AsyncGraph<'h> {
        let cancel = CancellationToken::new();
        GraphBuilder::new(classifier, filter, options, &cancel)
            .build()
            .unwrap()
    }

    #[test]
    fn test_chain_marks_top_level() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        let outer = core
            .define_async_method(
                &mut b,
                &AsyncMethodSpec::new("Program+<Outer>d__0").move_next_at(0x7ff0_1000),
            )
            .unwrap();
        let inner = core
            .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Inner>d__1"))
            .unwrap();
        let parent = core.alloc_frame(&mut b, &outer, 0, 0).unwrap();
        let child = core.alloc_frame(&mut b, &inner, 2, 0).unwrap();
        core.set_continuation(&mut b, child, parent).unwrap();
        let heap = b.build();

        let classifier = AsyncClassifier::new(&heap).unwrap();
        let graph = build(&classifier, &ObjectFilter::new(), BuildOptions::default());

        assert_eq!(graph.len(), 2);
        let child_node = graph.get(child).unwrap();
        assert!(child_node.top_level);
        assert_eq!(child_node.continuations, vec![parent]);
        assert_eq!(child_node.await_state, Some(2));
        assert!(child_node.native_code.is_none());

        let parent_node = graph.get(parent).unwrap();
        assert!(!parent_node.top_level);
        assert_eq!(parent_node.native_code, Some(0x7ff0_1000));
        assert_eq!(graph.roots().map(|n| n.address()).collect::<Vec<_>>(), vec![child]);
    }

    #[test]
    fn test_tasks_and_completed_are_kept_for_rendering() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        let running = core.alloc_task(&mut b, TaskStateFlags::STARTED).unwrap();
        let done = core.alloc_task(&mut b, TaskStateFlags::RAN_TO_COMPLETION).unwrap();
        let heap = b.build();
        let classifier = AsyncClassifier::new(&heap).unwrap();

        // 通常モードではタスクもノードになる（表示の可否は描画側で決める）
        let graph = build(&classifier, &ObjectFilter::new(), BuildOptions::default());
        assert!(graph.contains(running));
        assert!(!graph.contains(done));

        let options = BuildOptions {
            include_completed: true,
            ..BuildOptions::default()
        };
        let graph = build(&classifier, &ObjectFilter::new(), options);
        assert!(graph.contains(done));

        // 統計モードではフィルタとタスクの除外を走査時に適用する
        let options = BuildOptions {
            stats_only: true,
            ..BuildOptions::default()
        };
        assert!(build(&classifier, &ObjectFilter::new(), options).is_empty());
        let options = BuildOptions {
            stats_only: true,
            include_tasks: true,
            ..BuildOptions::default()
        };
        let filter = ObjectFilter::new().with_address(running);
        let graph = build(&classifier, &filter, options);
        assert_eq!(graph.len(), 1);
        assert!(graph.get(running).unwrap().matches_filter);
    }

    #[test]
    fn test_duplicates_and_invalid_objects_are_skipped() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        let task = core.alloc_task(&mut b, 0).unwrap();
        b.enumerate_again(task);
        b.enumerate_again(0xdead_0000);
        let heap = b.build();

        let classifier = AsyncClassifier::new(&heap).unwrap();
        let graph = build(&classifier, &ObjectFilter::new(), BuildOptions::default());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.nodes()[0].address(), task);
    }

    #[test]
    fn test_unresolved_continuation_becomes_raw() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        let done = core.alloc_task(&mut b, TaskStateFlags::RAN_TO_COMPLETION).unwrap();
        let plain = b.alloc(b.object_type()).unwrap();
        let list = core.alloc_continuation_list(&mut b, &[done, plain], 2).unwrap();
        let task = core.alloc_task(&mut b, 0).unwrap();
        core.set_continuation(&mut b, task, list).unwrap();
        let heap = b.build();

        let classifier = AsyncClassifier::new(&heap).unwrap();
        let graph = build(&classifier, &ObjectFilter::new(), BuildOptions::default());
        let node = graph.get(task).unwrap();
        assert!(node.continuations.is_empty());
        assert_eq!(
            node.raw_continuations.iter().map(|v| v.address()).collect::<Vec<_>>(),
            vec![done, plain]
        );
        assert_eq!(node.targets, node.raw_continuations);
    }

    #[test]
    fn test_cycle_leaves_no_roots() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        let first = core.alloc_task(&mut b, 0).unwrap();
        let second = core.alloc_task(&mut b, 0).unwrap();
        core.set_continuation(&mut b, first, second).unwrap();
        core.set_continuation(&mut b, second, first).unwrap();
        let heap = b.build();

        let classifier = AsyncClassifier::new(&heap).unwrap();
        let graph = build(&classifier, &ObjectFilter::new(), BuildOptions::default());
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.roots().count(), 0);
    }

    #[test]
    fn test_build_is_cancellable() {
        let mut b = HeapBuilder::new();
        let core = CoreLib::install(&mut b).unwrap();
        core.alloc_task(&mut b, 0).unwrap();
        let heap = b.build();

        let classifier = AsyncClassifier::new(&heap).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let filter = ObjectFilter::new();
        let err = GraphBuilder::new(&classifier, &filter, BuildOptions::default(), &cancel)
            .build()
            .unwrap_err();
        assert_eq!(err.downcast_ref::<AnalysisError>(), Some(&AnalysisError::Cancelled));
    }
}
