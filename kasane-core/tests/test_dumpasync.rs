//! dumpasync の出力テスト

use kasane_async::{
    AsyncClassifier, AsyncMethodSpec, AsyncMethodTypes, AwaiterKind, CancellationToken, CoreLib,
    Describer, GraphBuilder, TaskStateFlags,
};
use kasane_core::render::coalesce::{collect_coalesced, CoalesceEvent};
use kasane_core::render::stats::collect_stats;
use kasane_core::render::RenderContext;
use kasane_core::{dump_async, AnalysisError, BufferSink, DumpAsyncOptions};
use kasane_heap::{Address, HeapBuilder, HeapSnapshot, HeapValue, InMemoryHeap};

fn hex(address: Address) -> String {
    format!("{:016x}", address)
}

fn run_with(heap: &InMemoryHeap, args: &[&str], mut sink: BufferSink) -> BufferSink {
    let options = DumpAsyncOptions::from_args(args).unwrap();
    dump_async(heap, &options, &mut sink, &CancellationToken::new()).unwrap();
    sink
}

fn run(heap: &InMemoryHeap, args: &[&str]) -> Vec<String> {
    run_with(heap, args, BufferSink::new())
        .lines()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// `Outer` が `Inner` を待っている2段のチェーン
struct Chain {
    heap: InMemoryHeap,
    outer: AsyncMethodTypes,
    inner: AsyncMethodTypes,
    parent: Address,
    child: Address,
}

fn two_frame_chain() -> Chain {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let outer = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Outer>d__0"))
        .unwrap();
    let inner = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Inner>d__1"))
        .unwrap();
    let parent = core.alloc_frame(&mut b, &outer, 0, 0).unwrap();
    let child = core.alloc_frame(&mut b, &inner, 2, 0).unwrap();
    core.set_continuation(&mut b, child, parent).unwrap();
    Chain {
        heap: b.build(),
        outer,
        inner,
        parent,
        child,
    }
}

#[test]
fn test_completed_task_needs_completed_and_tasks() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let task = core.alloc_task(&mut b, TaskStateFlags::RAN_TO_COMPLETION).unwrap();
    let heap = b.build();

    assert!(run(&heap, &[]).is_empty());
    assert!(run(&heap, &["--completed"]).is_empty());
    assert!(run(&heap, &["--tasks"]).is_empty());
    assert_eq!(
        run(&heap, &["--completed", "--tasks"]),
        vec![
            "STACK 1".to_string(),
            format!("{} {} (RanToCompletion) System.Threading.Tasks.Task", hex(task), hex(core.task)),
            String::new(),
        ]
    );
}

#[test]
fn test_two_frame_stack() {
    let chain = two_frame_chain();
    assert_eq!(
        run(&chain.heap, &[]),
        vec![
            "STACK 1".to_string(),
            format!("{} {} (2) Program+<Inner>d__1", hex(chain.child), hex(chain.inner.frame)),
            format!("  {} {} (0) Program+<Outer>d__0", hex(chain.parent), hex(chain.outer.frame)),
            String::new(),
        ]
    );
}

#[test]
fn test_two_frame_coalesced() {
    let chain = two_frame_chain();
    assert_eq!(
        run(&chain.heap, &["--coalesce"]),
        vec![
            "STACKS 1".to_string(),
            format!("[1] {} (2) Program+<Inner>d__1", hex(chain.inner.frame)),
            format!("  [1] {} (0) Program+<Outer>d__0", hex(chain.outer.frame)),
            String::new(),
        ]
    );
}

#[test]
fn test_stats_wins_over_coalesce() {
    let chain = two_frame_chain();
    let lines = run(&chain.heap, &["--stats", "--coalesce"]);
    assert_eq!(lines[0], format!("{:<16} {:<8} Type", "MT", "Count"));
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], format!("{} {:<8} Program+<Outer>d__0", hex(chain.outer.frame), "1"));
    assert_eq!(lines[2], format!("{} {:<8} Program+<Inner>d__1", hex(chain.inner.frame), "1"));
}

#[test]
fn test_filters_select_whole_stacks() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let outer = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Outer>d__0"))
        .unwrap();
    let inner = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<ReadAsync>d__1"))
        .unwrap();
    let other = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Idle>d__2"))
        .unwrap();
    let parent = core.alloc_frame(&mut b, &outer, 0, 0).unwrap();
    let child = core.alloc_frame(&mut b, &inner, 0, 0).unwrap();
    core.set_continuation(&mut b, child, parent).unwrap();
    let idle = core.alloc_frame(&mut b, &other, 0, 0).unwrap();
    let heap = b.build();

    let all = run(&heap, &[]);
    assert_eq!(all.iter().filter(|l| l.starts_with("STACK ")).count(), 2);

    // 下流のフレームが条件に合えばスタック全体を表示する
    let by_type = run(&heap, &["--type", "Outer"]);
    assert_eq!(by_type[0], "STACK 1");
    assert!(by_type[1].starts_with(&hex(child)));
    assert!(by_type[2].trim_start().starts_with(&hex(parent)));
    assert_eq!(by_type.len(), 4);

    let by_address = run(&heap, &["--address", &format!("0x{:x}", idle)]);
    assert_eq!(by_address.len(), 3);
    assert!(by_address[1].starts_with(&hex(idle)));

    let by_mt = run(&heap, &["-mt", &format!("{:x}", other.frame)]);
    assert_eq!(by_mt[1], format!("{} {} (0) Program+<Idle>d__2", hex(idle), hex(other.frame)));

    assert!(run(&heap, &["--type", "NoSuchType"]).is_empty());
}

#[test]
fn test_list_continuation_fans_out() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let head = core.alloc_task(&mut b, TaskStateFlags::STARTED).unwrap();
    let first = core.alloc_task(&mut b, 0).unwrap();
    let second = core.alloc_task(&mut b, 0).unwrap();
    let third = core.alloc_task(&mut b, 0).unwrap();
    let list = core
        .alloc_continuation_list(&mut b, &[first, second, third], 4)
        .unwrap();
    core.set_continuation(&mut b, head, list).unwrap();
    let heap = b.build();

    let task_mt = hex(core.task);
    // 継続はワークスタックに積まれるので逆順に出力される
    assert_eq!(
        run(&heap, &["--tasks"]),
        vec![
            "STACK 1".to_string(),
            format!("{} {} (Started) System.Threading.Tasks.Task", hex(head), task_mt),
            format!("  {} {} ( ) System.Threading.Tasks.Task", hex(third), task_mt),
            format!("  {} {} ( ) System.Threading.Tasks.Task", hex(second), task_mt),
            format!("  {} {} ( ) System.Threading.Tasks.Task", hex(first), task_mt),
            String::new(),
        ]
    );
    assert_eq!(
        run(&heap, &["--tasks", "--coalesce"]),
        vec![
            "STACKS 1".to_string(),
            format!("[1] {} System.Threading.Tasks.Task", task_mt),
            format!("  [3] {} System.Threading.Tasks.Task", task_mt),
            String::new(),
        ]
    );
}

#[test]
fn test_raw_continuation_leaf() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let method = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Main>d__0"))
        .unwrap();
    let frame = core.alloc_frame(&mut b, &method, 0, 0).unwrap();
    let done = core.alloc_task(&mut b, TaskStateFlags::RAN_TO_COMPLETION).unwrap();
    let plain = b.alloc(b.object_type()).unwrap();
    let list = core.alloc_continuation_list(&mut b, &[done, plain], 2).unwrap();
    core.set_continuation(&mut b, frame, list).unwrap();
    let object_mt = b.object_type();
    let heap = b.build();

    assert_eq!(
        run(&heap, &[]),
        vec![
            "STACK 1".to_string(),
            format!("{} {} (0) Program+<Main>d__0", hex(frame), hex(method.frame)),
            format!(
                "  {} {} (RanToCompletion) System.Threading.Tasks.Task",
                hex(done),
                hex(core.task)
            ),
            format!("  {} {} () System.Object", hex(plain), hex(object_mt)),
            String::new(),
        ]
    );
}

#[test]
fn test_cycle_terminates() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let a = core.alloc_task(&mut b, 0).unwrap();
    let bb = core.alloc_task(&mut b, 0).unwrap();
    core.set_continuation(&mut b, a, bb).unwrap();
    core.set_continuation(&mut b, bb, a).unwrap();
    let isolated = b.build();

    // 閉じた循環にはトップレベルのノードが無い
    assert!(run(&isolated, &["--tasks"]).is_empty());
    assert!(run(&isolated, &["--tasks", "--coalesce"]).is_empty());

    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let entry = core.alloc_task(&mut b, 0).unwrap();
    let a = core.alloc_task(&mut b, 0).unwrap();
    let bb = core.alloc_task(&mut b, 0).unwrap();
    core.set_continuation(&mut b, entry, a).unwrap();
    core.set_continuation(&mut b, a, bb).unwrap();
    core.set_continuation(&mut b, bb, a).unwrap();
    let heap = b.build();

    let lines = run(&heap, &["--tasks"]);
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with(&hex(entry)));
    assert!(lines[2].starts_with(&format!("  {}", hex(a))));
    assert!(lines[3].starts_with(&format!("    {}", hex(bb))));
    assert_eq!(lines[4], "");

    let coalesced = run(&heap, &["--tasks", "--coalesce"]);
    assert_eq!(coalesced.len(), 5);
    assert!(coalesced[3].starts_with("    [1] "));
}

#[test]
fn test_awaiting_pseudo_frame() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let types = core
        .define_async_method(
            &mut b,
            &AsyncMethodSpec::new("Program+<Pair>d__3")
                .awaiter(AwaiterKind::TaskAwaiter)
                .awaiter(AwaiterKind::TaskAwaiter),
        )
        .unwrap();
    let frame = core.alloc_frame(&mut b, &types, 1, 0).unwrap();
    let awaited = core.alloc_task(&mut b, 0).unwrap();
    core.set_awaited(&mut b, &types, frame, 2, awaited).unwrap();
    let heap = b.build();

    let awaiter_address = HeapValue::object(&heap, frame)
        .read_value_type_field("StateMachine")
        .and_then(|sm| sm.read_value_type_field("<>u__2"))
        .unwrap()
        .address();

    assert_eq!(
        run(&heap, &[]),
        vec![
            "STACK 1".to_string(),
            format!(
                "<< Awaiting: {} {} System.Runtime.CompilerServices.TaskAwaiter >>",
                hex(awaiter_address),
                hex(core.task_awaiter)
            ),
            format!("  {} {} (1) Program+<Pair>d__3", hex(frame), hex(types.frame)),
            String::new(),
        ]
    );
}

#[test]
fn test_reference_awaiter_pseudo_frame() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let types = core
        .define_async_method(
            &mut b,
            &AsyncMethodSpec::new("Program+<Wait>d__4").awaiter(AwaiterKind::Reference),
        )
        .unwrap();
    let frame = core.alloc_frame(&mut b, &types, 0, 0).unwrap();
    let awaited = core.alloc_task(&mut b, TaskStateFlags::STARTED).unwrap();
    core.set_awaited(&mut b, &types, frame, 1, awaited).unwrap();
    let heap = b.build();

    let lines = run(&heap, &[]);
    assert_eq!(
        lines[1],
        format!(
            "<< Awaiting: {} {} System.Threading.Tasks.Task >>",
            hex(awaited),
            hex(core.task)
        )
    );
    assert!(lines[2].starts_with("  "));

    // 完了済みのステートマシンには疑似フレームを付けない
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let types = core
        .define_async_method(
            &mut b,
            &AsyncMethodSpec::new("Program+<Wait>d__4").awaiter(AwaiterKind::Reference),
        )
        .unwrap();
    let frame = core
        .alloc_frame(&mut b, &types, 0, TaskStateFlags::RAN_TO_COMPLETION)
        .unwrap();
    let awaited = core.alloc_task(&mut b, 0).unwrap();
    core.set_awaited(&mut b, &types, frame, 1, awaited).unwrap();
    let heap = b.build();

    let lines = run(&heap, &["--completed"]);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with(&hex(frame)));
}

#[test]
fn test_fields_are_listed_under_frame() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let types = core
        .define_async_method(
            &mut b,
            &AsyncMethodSpec::new("Program+<Count>d__5").local("i", kasane_heap::ElementType::Int32),
        )
        .unwrap();
    let frame = core.alloc_frame(&mut b, &types, 0, 0).unwrap();
    b.set(frame, "StateMachine.i", 7i32).unwrap();
    let heap = b.build();

    let lines = run(&heap, &["--fields"]);
    let indent = " ".repeat(8);
    assert_eq!(
        lines[2],
        format!("{}{:>16} {:>16} {:<32} {:>16} Name", indent, "Address", "MT", "Type", "Value")
    );
    assert!(lines[3].ends_with(&format!("{:<32} {:>16} <>1__state", "System.Int32", "0")));
    assert!(lines[4].ends_with(&format!("{:<32} {:>16} i", "System.Int32", "7")));
    assert_eq!(lines[5], "");
}

#[test]
fn test_markup_output() {
    let chain = two_frame_chain();
    let sink = run_with(&chain.heap, &["--tasks"], BufferSink::with_markup());
    let lines = sink.lines();

    assert_eq!(lines[0], "<b>STACK 1</b>");
    assert_eq!(
        lines[1],
        format!(
            concat!(
                "<exec cmd=\"!dumpasync --address 0x{0} --tasks --fields\">{0}</exec> ",
                "<exec cmd=\"!dumpasync --methodtable 0x{1} --tasks\">{1}</exec> ",
                "(2) Program+<Inner>d__1"
            ),
            hex(chain.child),
            hex(chain.inner.frame)
        )
    );
}

#[test]
fn test_code_link_in_markup() {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let types = core
        .define_async_method(
            &mut b,
            &AsyncMethodSpec::new("Program+<Main>d__0").move_next_at(0x7ff0_4000),
        )
        .unwrap();
    core.alloc_frame(&mut b, &types, 0, 0).unwrap();
    let heap = b.build();

    let plain = run(&heap, &[]);
    assert!(!plain[1].contains("Source link"));

    let sink = run_with(&heap, &[], BufferSink::with_markup());
    assert!(sink.lines()[1]
        .ends_with(" <link cmd=\".open -a 0x7ff04000\" alt=\"Source link\">@ 7ff04000</link>"));
}

#[test]
fn test_cancellation_reports_cancelled() {
    let chain = two_frame_chain();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut sink = BufferSink::new();
    let err = dump_async(&chain.heap, &DumpAsyncOptions::default(), &mut sink, &cancel).unwrap_err();
    assert_eq!(err.downcast_ref::<AnalysisError>(), Some(&AnalysisError::Cancelled));
}

/// ステートマシン、タスク、完了済みタスクが混在するヒープ
fn mixed_heap() -> InMemoryHeap {
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let inner = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Inner>d__1"))
        .unwrap();
    let outer = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Outer>d__0"))
        .unwrap();

    let shared = core.alloc_frame(&mut b, &outer, 0, 0).unwrap();
    for state in [2, 2, 1] {
        let child = core.alloc_frame(&mut b, &inner, state, 0).unwrap();
        let task = core.alloc_task(&mut b, TaskStateFlags::STARTED).unwrap();
        core.set_continuation(&mut b, task, child).unwrap();
        core.set_continuation(&mut b, child, shared).unwrap();
    }
    core.alloc_task(&mut b, TaskStateFlags::RAN_TO_COMPLETION).unwrap();
    core.alloc_task(&mut b, 0).unwrap();
    b.build()
}

#[test]
fn test_stats_counts_sum_to_nodes() {
    let heap = mixed_heap();
    let classifier = AsyncClassifier::new(&heap).unwrap();
    let describer = Describer::new(&classifier);
    let cancel = CancellationToken::new();

    for args in [&["--stats"][..], &["--stats", "--tasks"], &["--stats", "--tasks", "--completed"]] {
        let options = DumpAsyncOptions::from_args(args).unwrap();
        let filter = options.filter();
        let graph = GraphBuilder::new(&classifier, &filter, options.build_options(), &cancel)
            .build()
            .unwrap();
        let ctx = RenderContext {
            graph: &graph,
            classifier: &classifier,
            describer: &describer,
            options: &options,
            cancel: &cancel,
        };
        let rows = collect_stats(&ctx).unwrap();
        assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), graph.len());
        assert!(rows.windows(2).all(|w| w[0].count >= w[1].count));
    }

    let lines = run(&heap, &["--stats"]);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with(&format!(" {:<8} Program+<Inner>d__1", "3")));
    assert!(lines[2].ends_with(&format!(" {:<8} Program+<Outer>d__0", "1")));
}

#[test]
fn test_top_level_matches_incoming_edges() {
    let heap = mixed_heap();
    let classifier = AsyncClassifier::new(&heap).unwrap();
    let cancel = CancellationToken::new();
    let options = DumpAsyncOptions::from_args(["--tasks", "--completed"]).unwrap();
    let filter = options.filter();
    let graph = GraphBuilder::new(&classifier, &filter, options.build_options(), &cancel)
        .build()
        .unwrap();

    for node in graph.nodes() {
        let referenced = graph
            .nodes()
            .iter()
            .any(|other| other.continuations.contains(&node.address()));
        assert_eq!(node.top_level, !referenced);
    }
}

#[test]
fn test_coalesced_levels_sum_to_incoming_edges() {
    let heap = mixed_heap();
    let classifier = AsyncClassifier::new(&heap).unwrap();
    let describer = Describer::new(&classifier);
    let cancel = CancellationToken::new();
    let options = DumpAsyncOptions::from_args(["--tasks", "--coalesce"]).unwrap();
    let filter = options.filter();
    let graph = GraphBuilder::new(&classifier, &filter, options.build_options(), &cancel)
        .build()
        .unwrap();
    let ctx = RenderContext {
        graph: &graph,
        classifier: &classifier,
        describer: &describer,
        options: &options,
        cancel: &cancel,
    };

    let events = collect_coalesced(&ctx).unwrap();
    let mut per_level = [0usize; 3];
    for event in &events {
        if let CoalesceEvent::Group { depth, count, .. } = event {
            per_level[*depth] += count;
        }
    }
    // 4つのタスク（1つは継続なし） → 3つの Inner → 共有された Outer（3本の辺が入る）
    assert_eq!(per_level, [4, 3, 3]);

    let lines = run(&heap, &["--tasks", "--coalesce"]);
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], "STACKS 1");
    assert!(lines[1].starts_with("[4] ") && lines[1].ends_with(" System.Threading.Tasks.Task"));
    assert!(lines[2].starts_with("  [2] ") && lines[2].ends_with(" (2) Program+<Inner>d__1"));
    assert!(lines[3].starts_with("    [2] ") && lines[3].ends_with(" (0) Program+<Outer>d__0"));
    assert!(lines[4].starts_with("  [1] ") && lines[4].ends_with(" (1) Program+<Inner>d__1"));
    assert!(lines[5].starts_with("    [1] ") && lines[5].ends_with(" (0) Program+<Outer>d__0"));
    assert_eq!(lines[6], "");
}

/// まとめた表示の段ごとの件数の合計
fn coalesced_levels(heap: &InMemoryHeap, args: &[&str]) -> Vec<usize> {
    let classifier = AsyncClassifier::new(heap).unwrap();
    let describer = Describer::new(&classifier);
    let cancel = CancellationToken::new();
    let options = DumpAsyncOptions::from_args(args).unwrap();
    let filter = options.filter();
    let graph = GraphBuilder::new(&classifier, &filter, options.build_options(), &cancel)
        .build()
        .unwrap();
    let ctx = RenderContext {
        graph: &graph,
        classifier: &classifier,
        describer: &describer,
        options: &options,
        cancel: &cancel,
    };

    let mut per_level = Vec::new();
    for event in collect_coalesced(&ctx).unwrap() {
        if let CoalesceEvent::Group { depth, count, .. } = event {
            if per_level.len() <= depth {
                per_level.resize(depth + 1, 0);
            }
            per_level[depth] += count;
        }
    }
    per_level
}

#[test]
fn test_coalesced_keeps_edges_between_siblings() {
    // A -> [X, Y] で、さらに X -> Y
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let a = core.alloc_task(&mut b, 0).unwrap();
    let x = core.alloc_task(&mut b, 0).unwrap();
    let y = core.alloc_task(&mut b, 0).unwrap();
    let list = core.alloc_continuation_list(&mut b, &[x, y], 2).unwrap();
    core.set_continuation(&mut b, a, list).unwrap();
    core.set_continuation(&mut b, x, y).unwrap();
    let heap = b.build();

    // A から2本、X から1本の辺が入る
    assert_eq!(coalesced_levels(&heap, &["--tasks", "--coalesce"]), vec![1, 2, 1]);

    let task = format!("{} System.Threading.Tasks.Task", hex(core.task));
    assert_eq!(
        run(&heap, &["--tasks", "--coalesce"]),
        vec![
            "STACKS 1".to_string(),
            format!("[1] {}", task),
            format!("  [2] {}", task),
            format!("    [1] {}", task),
            String::new(),
        ]
    );

    // スタック表示でも Y は X の下に現れる
    let stacks = run(&heap, &["--tasks"]);
    assert_eq!(stacks.len(), 6);
    assert!(stacks[3].starts_with(&format!("  {}", hex(x))));
    assert!(stacks[4].starts_with(&format!("    {}", hex(y))));
}

#[test]
fn test_coalesced_cycle_terminates() {
    // R -> A -> B -> A
    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b).unwrap();
    let root = core.alloc_task(&mut b, 0).unwrap();
    let first = core.alloc_task(&mut b, 0).unwrap();
    let second = core.alloc_task(&mut b, 0).unwrap();
    core.set_continuation(&mut b, root, first).unwrap();
    core.set_continuation(&mut b, first, second).unwrap();
    core.set_continuation(&mut b, second, first).unwrap();
    let heap = b.build();

    assert_eq!(coalesced_levels(&heap, &["--tasks", "--coalesce"]), vec![1, 1, 1]);
    assert_eq!(run(&heap, &["--tasks", "--coalesce"]).len(), 5);
}

#[test]
fn test_pointer_size_four() {
    let mut b = HeapBuilder::with_pointer_size(4);
    let core = CoreLib::install(&mut b).unwrap();
    let method = core
        .define_async_method(&mut b, &AsyncMethodSpec::new("Program+<Main>d__0"))
        .unwrap();
    let frame = core.alloc_frame(&mut b, &method, 0, 0).unwrap();
    let heap = b.build();
    assert_eq!(heap.pointer_size(), 4);

    let lines = run(&heap, &[]);
    assert_eq!(
        lines[1],
        format!(
            "{:>16} {:>16} (0) Program+<Main>d__0",
            format!("{:08x}", frame),
            format!("{:08x}", method.frame)
        )
    );
}
