//! dumpasync コマンドの実行

use crate::output::OutputSink;
use crate::render::{coalesce, stacks, stats, RenderContext};
use crate::{DumpAsyncOptions, Result};
use kasane_async::{AnalysisError, AsyncClassifier, CancellationToken, Describer, GraphBuilder};
use kasane_heap::HeapSnapshot;
use tracing::debug;

/// ヒープの非同期オペレーションを解析して出力する
///
/// ヒープを走査できない場合や、タスク型が見つからない場合は何も出力せずにエラーを返します。
/// キャンセルされた場合は、それまでに出力した内容はそのまま残ります。
pub fn dump_async(
    heap: &dyn HeapSnapshot,
    options: &DumpAsyncOptions,
    sink: &mut dyn OutputSink,
    cancel: &CancellationToken,
) -> Result<()> {
    if !heap.can_walk_heap() {
        return Err(AnalysisError::HeapNotWalkable.into());
    }
    let classifier = AsyncClassifier::new(heap)?;
    let describer = Describer::new(&classifier);
    let filter = options.filter();

    let graph = GraphBuilder::new(&classifier, &filter, options.build_options(), cancel).build()?;
    debug!("Built async graph with {} nodes", graph.len());

    let ctx = RenderContext {
        graph: &graph,
        classifier: &classifier,
        describer: &describer,
        options,
        cancel,
    };
    if options.summarize {
        stats::render_stats(&ctx, sink)
    } else if options.coalesce {
        coalesce::render_coalesced(&ctx, sink)
    } else {
        stacks::render_stacks(&ctx, sink)
    }
}
