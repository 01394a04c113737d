//! Kasane のコア機能
//!
//! このクレートは、dumpasync コマンドの中核となるロジックを提供します。
//! コマンドのパース、非同期グラフの構築と描画、出力先の抽象化を統合します。

pub mod command;
pub mod dumpasync;
pub mod errors;
pub mod output;
pub mod parse;
pub mod render;
pub mod session;

pub use command::{Command, DumpAsyncOptions, HELP_TEXT};
pub use dumpasync::dump_async;
pub use errors::CommandError;
pub use output::{BufferSink, ConsoleSink, OutputSink, Printer};
pub use session::Session;

// 他のクレートから使用するために再エクスポート
pub use kasane_async::{AnalysisError, CancellationToken};

/// コアの結果型
pub type Result<T> = anyhow::Result<T>;
