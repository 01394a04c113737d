//! 説明文字列ごとの件数表示（`--stats`）

use super::RenderContext;
use crate::output::OutputSink;
use crate::Result;
use kasane_heap::Address;
use std::collections::HashMap;

/// 統計の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRow {
    /// 最初に見つかったオブジェクトのメソッドテーブル
    pub method_table: Address,
    pub count: usize,
    pub description: String,
}

/// グラフ内のノードを説明文字列でまとめる
///
/// 行は件数の降順で、同数の場合は最初に現れた順です。
pub fn collect_stats(ctx: &RenderContext<'_, '_>) -> Result<Vec<StatsRow>> {
    let mut rows: Vec<StatsRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for node in ctx.graph.nodes() {
        ctx.cancel.check()?;
        let Some(ty) = node.object.ty() else {
            continue;
        };
        let description = ctx.describe(&node.object);
        match index.get(&description) {
            Some(&i) => rows[i].count += 1,
            None => {
                index.insert(description.clone(), rows.len());
                rows.push(StatsRow {
                    method_table: ty.method_table,
                    count: 1,
                    description,
                });
            }
        }
    }

    rows.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(rows)
}

/// 統計表を出力する
pub fn render_stats(ctx: &RenderContext<'_, '_>, sink: &mut dyn OutputSink) -> Result<()> {
    let rows = collect_stats(ctx)?;
    let mut printer = ctx.printer(sink);

    printer.write_header_line(&format!("{:<16} {:<8} Type", "MT", "Count"))?;
    for row in rows {
        ctx.cancel.check()?;
        printer.write_method_table(row.method_table, true)?;
        printer.write_line(&format!(" {:<8} {}", group_thousands(row.count), row.description))?;
    }
    Ok(())
}

/// 件数を3桁区切りで表す
///
/// .NET の `N0` 書式（`1,234,567`）と同じ表記です。先頭のグループだけが1〜3桁になります。
fn group_thousands(n: usize) -> String {
    let digits = format!("{}", n);
    let head = match digits.len() % 3 {
        0 => 3.min(digits.len()),
        rest => rest,
    };
    let mut groups = vec![&digits[..head]];
    groups.extend((head..digits.len()).step_by(3).map(|i| &digits[i..i + 3]));
    groups.join(",")
}
