//! 同じフレームをまとめたスタック表示（`--coalesce`）
//!
//! 各段のフレームを説明文字列（ステートマシンは `(await位置) ` 付き）でまとめ、
//! グループごとに件数を表示してから、メンバー全員の継続を次の段としてたどります。
//! メンバーはそれぞれルートからの祖先を持ち、自分の祖先へ戻る継続だけを循環として捨てます。

use super::{tabs, RenderContext, MAX_RENDER_DEPTH};
use crate::output::OutputSink;
use crate::Result;
use kasane_heap::{Address, HeapValue};
use std::collections::HashMap;
use tracing::warn;

/// まとめた結果の出力イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoalesceEvent {
    /// トップレベルのグループの見出し（`STACKS n`）
    StackHeader(usize),
    /// グループ1行
    Group {
        depth: usize,
        count: usize,
        method_table: Address,
        key: String,
    },
    /// トップレベルのグループの終わり
    EndStack,
}

/// グループの1メンバー
struct Member<'h> {
    frame: HeapValue<'h>,
    /// ルートからこのフレームの親までのアドレス
    ancestors: Vec<Address>,
}

struct FrameGroup<'h> {
    key: String,
    members: Vec<Member<'h>>,
}

/// 描画途中の段
struct Level<'h> {
    depth: usize,
    groups: std::vec::IntoIter<FrameGroup<'h>>,
}

enum WorkItem<'h> {
    Level(Level<'h>),
    EndStack,
}

/// まとめたスタックをイベント列として求める
pub fn collect_coalesced<'h>(ctx: &RenderContext<'_, 'h>) -> Result<Vec<CoalesceEvent>> {
    let mut events = Vec::new();
    let frontier: Vec<Member<'h>> = ctx
        .included_roots()?
        .iter()
        .map(|node| Member {
            frame: node.object,
            ancestors: Vec::new(),
        })
        .collect();
    if frontier.is_empty() {
        return Ok(events);
    }

    let mut work = vec![WorkItem::Level(Level {
        depth: 0,
        groups: group_frames(ctx, frontier)?.into_iter(),
    })];
    let mut stack_id = 0;

    while let Some(item) = work.pop() {
        ctx.cancel.check()?;
        let mut level = match item {
            WorkItem::Level(level) => level,
            WorkItem::EndStack => {
                events.push(CoalesceEvent::EndStack);
                continue;
            }
        };
        let Some(group) = level.groups.next() else {
            continue;
        };
        let depth = level.depth;

        if depth == 0 {
            stack_id += 1;
            events.push(CoalesceEvent::StackHeader(stack_id));
        }
        events.push(CoalesceEvent::Group {
            depth,
            count: group.members.len(),
            method_table: group.members.first().map_or(0, |m| m.frame.method_table()),
            key: group.key,
        });

        let next = next_frontier(ctx, group.members);

        work.push(WorkItem::Level(level));
        if depth == 0 {
            work.push(WorkItem::EndStack);
        }
        if next.is_empty() {
            continue;
        }
        if depth + 1 >= MAX_RENDER_DEPTH {
            warn!("Coalesced stack exceeds {} levels; truncating", MAX_RENDER_DEPTH);
            continue;
        }
        work.push(WorkItem::Level(Level {
            depth: depth + 1,
            groups: group_frames(ctx, next)?.into_iter(),
        }));
    }

    Ok(events)
}

/// メンバー全員の継続（リンク済みと生の両方、解決順）
///
/// 継続先がそのメンバー自身か祖先であれば循環なので捨てます。
fn next_frontier<'h>(ctx: &RenderContext<'_, 'h>, members: Vec<Member<'h>>) -> Vec<Member<'h>> {
    let mut next = Vec::new();
    for member in members {
        let Some(node) = ctx.graph.get(member.frame.address()) else {
            continue;
        };
        let mut chain = member.ancestors;
        chain.push(member.frame.address());
        for target in &node.targets {
            if chain.contains(&target.address()) {
                continue;
            }
            next.push(Member {
                frame: *target,
                ancestors: chain.clone(),
            });
        }
    }
    next
}

/// フレームを説明文字列でまとめる（件数の降順、同数なら最初に現れた順）
fn group_frames<'h>(ctx: &RenderContext<'_, 'h>, frames: Vec<Member<'h>>) -> Result<Vec<FrameGroup<'h>>> {
    let mut groups: Vec<FrameGroup<'h>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for member in frames {
        ctx.cancel.check()?;
        let key = group_key(ctx, &member.frame);
        match index.get(&key) {
            Some(&i) => groups[i].members.push(member),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(FrameGroup {
                    key,
                    members: vec![member],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
    Ok(groups)
}

fn group_key<'h>(ctx: &RenderContext<'_, 'h>, frame: &HeapValue<'h>) -> String {
    let description = ctx.describe(frame);
    match ctx.graph.get(frame.address()) {
        Some(node) if node.is_state_machine() => {
            format!("({}) {}", node.await_state.unwrap_or_default(), description)
        }
        _ => description,
    }
}

/// まとめたスタックを出力する
pub fn render_coalesced(ctx: &RenderContext<'_, '_>, sink: &mut dyn OutputSink) -> Result<()> {
    let events = collect_coalesced(ctx)?;
    let mut printer = ctx.printer(sink);

    for event in events {
        match event {
            CoalesceEvent::StackHeader(id) => printer.write_header_line(&format!("STACKS {}", id))?,
            CoalesceEvent::Group {
                depth,
                count,
                method_table,
                key,
            } => {
                printer.write(&format!("{}[{}] ", tabs(depth), count))?;
                printer.write_method_table(method_table, true)?;
                printer.write_line(&format!(" {}", key))?;
            }
            CoalesceEvent::EndStack => printer.write_line("")?,
        }
    }
    Ok(())
}
