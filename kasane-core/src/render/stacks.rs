//! トップレベルのノードごとのスタック表示（既定）

use super::fields::render_fields;
use super::{tabs, RenderContext, MAX_RENDER_DEPTH};
use crate::output::{OutputSink, Printer};
use crate::Result;
use kasane_async::{guess_awaited_object, AsyncNode};
use kasane_heap::{Address, HeapValue};
use tracing::warn;

/// 1本のスタックを描画する間の状態
struct StackWalk<'a, 'h> {
    /// `(ノード, 深さ)` のワークスタック
    pending: Vec<(&'a AsyncNode<'h>, usize)>,
    /// 現在のノードに至るまでの祖先
    path: Vec<Address>,
    /// ルートの深さ（awaiter の疑似フレームがあれば1）
    base_depth: usize,
}

/// 全てのスタックを出力する
pub fn render_stacks(ctx: &RenderContext<'_, '_>, sink: &mut dyn OutputSink) -> Result<()> {
    let roots = ctx.included_roots()?;
    let mut printer = ctx.printer(sink);

    for (i, root) in roots.into_iter().enumerate() {
        ctx.cancel.check()?;
        printer.write_header_line(&format!("STACK {}", i + 1))?;

        let base_depth = usize::from(write_awaiting_frame(ctx, &mut printer, root)?);
        let mut walk = StackWalk {
            pending: vec![(root, base_depth)],
            path: Vec::new(),
            base_depth,
        };
        walk_stack(ctx, &mut printer, &mut walk)?;
        printer.write_line("")?;
    }
    Ok(())
}

fn walk_stack<'a, 'h>(
    ctx: &RenderContext<'a, 'h>,
    printer: &mut Printer<'_>,
    walk: &mut StackWalk<'a, 'h>,
) -> Result<()> {
    let mut truncated = false;

    while let Some((node, depth)) = walk.pending.pop() {
        ctx.cancel.check()?;
        walk.path.truncate(depth - walk.base_depth);
        if walk.path.contains(&node.address()) {
            continue;
        }
        walk.path.push(node.address());

        write_frame(ctx, printer, node, depth)?;
        if ctx.options.display_fields {
            let target = node.state_machine.as_ref().unwrap_or(&node.object);
            render_fields(printer, target, depth + 4)?;
        }

        for raw in &node.raw_continuations {
            write_raw_continuation(ctx, printer, raw, depth + 1)?;
        }
        if depth + 1 - walk.base_depth >= MAX_RENDER_DEPTH {
            truncated |= !node.continuations.is_empty();
            continue;
        }
        walk.pending.extend(
            node.continuations
                .iter()
                .filter_map(|&address| ctx.graph.get(address))
                .map(|next| (next, depth + 1)),
        );
    }

    if truncated {
        warn!("Stack exceeds {} frames; truncating", MAX_RENDER_DEPTH);
    }
    Ok(())
}

/// フレーム1行: `アドレス MT (状態) 説明 [コードリンク]`
fn write_frame<'h>(
    ctx: &RenderContext<'_, 'h>,
    printer: &mut Printer<'_>,
    node: &AsyncNode<'h>,
    depth: usize,
) -> Result<()> {
    printer.write(&tabs(depth))?;
    printer.write_address(node.address(), true)?;
    printer.write(" ")?;
    printer.write_method_table(node.object.method_table(), true)?;
    printer.write(&format!(" ({}) {}", ctx.state_label(node), ctx.describe(&node.object)))?;
    printer.write_code_link(node.native_code)?;
    printer.write_line("")
}

/// グラフに無い継続先を葉として出力する
fn write_raw_continuation<'h>(
    ctx: &RenderContext<'_, 'h>,
    printer: &mut Printer<'_>,
    continuation: &HeapValue<'h>,
    depth: usize,
) -> Result<()> {
    let state = ctx
        .classifier
        .state_flags(continuation)
        .map(|flags| flags.describe())
        .unwrap_or_default();
    printer.write(&tabs(depth))?;
    printer.write_address(continuation.address(), true)?;
    printer.write(" ")?;
    printer.write_method_table(continuation.method_table(), true)?;
    printer.write_line(&format!(" ({}) {}", state, ctx.describe(continuation)))
}

/// 中断中のステートマシンが待っているものを疑似フレームとして出力する
///
/// 出力した場合は true を返します。
fn write_awaiting_frame<'h>(
    ctx: &RenderContext<'_, 'h>,
    printer: &mut Printer<'_>,
    root: &AsyncNode<'h>,
) -> Result<bool> {
    let Some(await_state) = root.await_state.filter(|&s| s >= 0) else {
        return Ok(false);
    };
    if !root.is_state_machine() || root.is_completed() {
        return Ok(false);
    }
    let Some(state_machine) = root.state_machine.as_ref().filter(|sm| sm.ty().is_some()) else {
        return Ok(false);
    };
    let Some(awaited) = guess_awaited_object(state_machine, await_state, ctx.classifier.schema()) else {
        return Ok(false);
    };
    let Some(ty) = awaited.value.ty() else {
        return Ok(false);
    };

    printer.write("<< Awaiting: ")?;
    if awaited.is_inline() {
        printer.write_value_type_address(awaited.value.address(), ty.method_table)?;
    } else {
        printer.write_address(awaited.value.address(), false)?;
    }
    printer.write(" ")?;
    printer.write_method_table(ty.method_table, false)?;
    printer.write_line(&format!(" {} >>", ty.name))?;
    Ok(true)
}
