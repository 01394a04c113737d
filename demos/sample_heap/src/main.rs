//! サンプルのヒープスナップショットを生成するプログラム
//!
//! 生成したファイルを kasane で開くことで、非同期スタックの再構築と
//! 各種表示モード（スタック、--coalesce、--stats）を試せます。
//!
//! ```text
//! cargo run -p sample_heap -- sample_heap.json
//! kasane dumpasync sample_heap.json --coalesce
//! ```

use anyhow::Result;
use kasane_async::{AsyncMethodSpec, AwaiterKind, CoreLib, TaskStateFlags};
use kasane_heap::{save_snapshot, ElementType, HeapBuilder};

/// 待機中のタスクのフラグ（表示対象のビットは立っていない）
const PENDING: i32 = 0;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_heap.json".to_string());

    let mut b = HeapBuilder::new();
    let core = CoreLib::install(&mut b)?;
    core.alloc_sentinel(&mut b)?;

    // Program.Main -> Server.AcceptLoopAsync -> Server.HandleRequestAsync x3 -> Stream.ReadAsync
    let main = core.define_async_method(
        &mut b,
        &AsyncMethodSpec::new("Program+<Main>d__0")
            .awaiter(AwaiterKind::TaskAwaiter)
            .move_next_at(0x7ffb_1000_0100),
    )?;
    let accept = core.define_async_method(
        &mut b,
        &AsyncMethodSpec::new("Server+<AcceptLoopAsync>d__3")
            .local("<connections>5__2", ElementType::Int32)
            .awaiter(AwaiterKind::TaskAwaiter)
            .move_next_at(0x7ffb_1000_0200),
    )?;
    let handle = core.define_async_method(
        &mut b,
        &AsyncMethodSpec::new("Server+<HandleRequestAsync>d__4")
            .returning("System.Int32")
            .local("<bytesRead>5__1", ElementType::Int32)
            .awaiter(AwaiterKind::TaskAwaiter)
            .move_next_at(0x7ffb_1000_0300),
    )?;
    let read = core.define_async_method(
        &mut b,
        &AsyncMethodSpec::new("NetworkStream+<ReadAsync>d__12")
            .returning("System.Int32")
            .awaiter(AwaiterKind::Reference)
            .class_state_machine()
            .move_next_at(0x7ffb_1000_0400),
    )?;

    let main_frame = core.alloc_frame(&mut b, &main, 0, PENDING)?;
    let accept_frame = core.alloc_frame(&mut b, &accept, 0, PENDING)?;
    core.set_awaited(&mut b, &main, main_frame, 1, accept_frame)?;
    core.set_continuation(&mut b, accept_frame, main_frame)?;
    b.set(accept_frame, "StateMachine.<connections>5__2", 3i32)?;

    // 3つのリクエストが同じ AcceptLoop を継続として持つ
    let mut handlers = Vec::new();
    for (index, state) in [0, 0, 1].into_iter().enumerate() {
        let handler = core.alloc_frame(&mut b, &handle, state, PENDING)?;
        b.set(handler, "StateMachine.<bytesRead>5__1", (index as i32 + 1) * 512)?;
        let reader = core.alloc_frame(&mut b, &read, 0, PENDING)?;
        let io = core.alloc_task(&mut b, PENDING)?;
        core.set_awaited(&mut b, &read, reader, 1, io)?;
        core.set_continuation(&mut b, io, reader)?;
        core.set_awaited(&mut b, &handle, handler, 1, reader)?;
        core.set_continuation(&mut b, reader, handler)?;
        handlers.push(handler);
    }
    let list = core.alloc_continuation_list(&mut b, &handlers, 4)?;
    let fan_in = core.alloc_task(&mut b, PENDING)?;
    core.set_continuation(&mut b, fan_in, list)?;
    for &handler in &handlers {
        core.set_continuation(&mut b, handler, accept_frame)?;
    }
    core.set_awaited(&mut b, &accept, accept_frame, 1, handlers[0])?;

    // デリゲート経由の継続
    let timer = core.define_async_method(
        &mut b,
        &AsyncMethodSpec::new("Cache+<RefreshAsync>d__7").awaiter(AwaiterKind::TaskAwaiter),
    )?;
    let refresh = core.alloc_frame(&mut b, &timer, 0, PENDING)?;
    let delay = core.alloc_task(&mut b, PENDING)?;
    let action = core.alloc_action(&mut b, refresh, 0x7ffb_1000_0500)?;
    core.set_continuation(&mut b, delay, action)?;
    core.set_awaited(&mut b, &timer, refresh, 1, delay)?;

    // 完了済みのタスク（--completed で表示される）
    core.alloc_frame(&mut b, &handle, -2, TaskStateFlags::RAN_TO_COMPLETION)?;
    core.alloc_task(&mut b, TaskStateFlags::RAN_TO_COMPLETION)?;

    let heap = b.build();
    save_snapshot(&heap, &path)?;
    println!("Wrote heap snapshot to {}", path);
    Ok(())
}
