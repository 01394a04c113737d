//! dumpasync コマンドとREPLコマンド

use crate::errors::CommandError;
use crate::parse::parse_address;
use crate::Result;
use clap::Parser;
use kasane_async::{BuildOptions, ObjectFilter};
use kasane_heap::Address;

/// コマンド名
pub const COMMAND_NAME: &str = "dumpasync";

/// `dumpasync` の詳細なヘルプ
pub const HELP_TEXT: &str = "\
Usage: dumpasync [--stats] [--coalesce] [--address <object address>] [--methodtable <mt address>] [--type <partial type name>] [--tasks] [--completed] [--fields]

Displays async \"stacks\" found on the garbage-collected heap. Stacks are built
by collecting every task object (async state machine boxes included) in the
heap snapshot and chaining them together through their continuations.

Options:
  --stats        Summarize all async frames found instead of printing each stack.
  --coalesce     Merge stacks and stack portions that are identical.
  --address      Only show stacks that include the object at the given address.
  --methodtable  Only show stacks that include objects with the given method table.
  --type         Only show stacks that include objects whose type name contains the given text.
  --tasks        Include stacks made only of tasks that are not state machines.
  --completed    Include completed tasks in stacks.
  --fields       Show the fields of each async stack frame.

Examples:
  Summarize async frames of one method table:  dumpasync --stats --methodtable 0x00007ffbcfbe0970
  Show all stacks merged by common frames:     dumpasync --coalesce
  Show every stack that includes \"ReadAsync\":  dumpasync --type ReadAsync
  Show the stack of one object with fields:    dumpasync --address 0x000001264adce778 --fields";

/// `dumpasync` のオプション
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "dumpasync", about = "Displays async stacks found on the heap")]
pub struct DumpAsyncOptions {
    /// Only show stacks that include the object with the specified address.
    #[arg(long = "address", value_name = "ADDRESS", value_parser = parse_address)]
    pub address: Option<Address>,

    /// Only show stacks that include objects with the specified method table.
    #[arg(long = "methodtable", value_name = "MT", value_parser = parse_address)]
    pub method_table: Option<Address>,

    /// Only show stacks that include objects whose type includes the specified name in its name.
    #[arg(long = "type", value_name = "NAME")]
    pub type_name: Option<String>,

    /// Include stacks that contain only non-state machine task objects.
    #[arg(short = 't', long = "tasks")]
    pub include_tasks: bool,

    /// Include completed tasks in stacks.
    #[arg(short = 'c', long = "completed")]
    pub include_completed: bool,

    /// Show fields for each async stack frame.
    #[arg(short = 'f', long = "fields")]
    pub display_fields: bool,

    /// Summarize all async frames found rather than showing detailed stacks.
    #[arg(long = "stats")]
    pub summarize: bool,

    /// Coalesce stacks and portions of stacks that are the same.
    #[arg(long = "coalesce")]
    pub coalesce: bool,
}

impl DumpAsyncOptions {
    /// 引数列（コマンド名を含まない）からオプションを作る
    ///
    /// 単一ダッシュの別名 `-addr`、`-mt` も受け付けます。
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let argv = std::iter::once(COMMAND_NAME.to_string()).chain(
            args.into_iter().map(|arg| match arg.as_ref() {
                "-addr" => "--address".to_string(),
                "-mt" => "--methodtable".to_string(),
                other => other.to_string(),
            }),
        );
        Self::try_parse_from(argv)
            .map_err(|e| CommandError::InvalidArguments(e.to_string().trim_end().to_string()).into())
    }

    /// 絞り込み条件
    pub fn filter(&self) -> ObjectFilter {
        ObjectFilter {
            address: self.address,
            method_table: self.method_table,
            type_substring: self.type_name.clone(),
        }
    }

    /// グラフ構築のオプション
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            include_tasks: self.include_tasks,
            include_completed: self.include_completed,
            stats_only: self.summarize,
        }
    }
}

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 非同期スタックの表示
    DumpAsync(DumpAsyncOptions),
    /// ヘルプ表示（`help dumpasync` なら詳細）
    Help(Option<String>),
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 空行の場合は `Ok(None)` を返します。
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((&name, args)) = parts.split_first() else {
            return Ok(None);
        };

        let command = match name {
            "dumpasync" | "DumpAsync" | "!dumpasync" => {
                if args.iter().any(|a| matches!(*a, "-?" | "-h" | "--help")) {
                    Command::Help(Some(COMMAND_NAME.to_string()))
                } else {
                    Command::DumpAsync(DumpAsyncOptions::from_args(args)?)
                }
            }
            "help" | "h" | "?" => Command::Help(args.first().map(|topic| topic.to_string())),
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(CommandError::UnknownCommand(other.to_string()).into()),
        };
        Ok(Some(command))
    }
}
