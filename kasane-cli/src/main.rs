//! Kasane CLI - コマンドラインインターフェース
//!
//! ヒープスナップショットから非同期スタックを再構築する kasane のREPLインターフェース

use anyhow::Result;
use clap::{Parser, Subcommand};
use kasane_core::{
    AnalysisError, CancellationToken, Command, ConsoleSink, DumpAsyncOptions, Session, HELP_TEXT,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// 履歴ファイル名（ホームディレクトリ直下）
const HISTORY_FILE: &str = ".kasane_history";

/// Kasane - Async Stack Inspector for .NET heap snapshots
#[derive(Parser)]
#[command(name = "kasane")]
#[command(version = "0.1.0")]
#[command(about = "Reconstructs async continuation stacks from .NET heap snapshots", long_about = None)]
struct Cli {
    /// Emit hyperlink markup (<exec cmd="...">) for addresses and method tables
    #[arg(long, global = true)]
    dml: bool,

    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Open a heap snapshot and start an interactive session
    Repl {
        /// Path to the heap snapshot file
        snapshot: PathBuf,
    },

    /// Run dumpasync once against a heap snapshot
    Dumpasync {
        /// Path to the heap snapshot file
        snapshot: PathBuf,

        #[command(flatten)]
        options: DumpAsyncOptions,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        SessionCommand::Repl { snapshot } => {
            println!("Kasane - Async Stack Inspector");
            println!("Version 0.1.0");
            println!();

            let session = Session::open(&snapshot)?;
            println!("Loaded heap snapshot: {}", snapshot.display());
            println!();

            spawn_interrupt_listener(session.cancel_token());
            run_repl(&session, cli.dml)?;
        }
        SessionCommand::Dumpasync { snapshot, options } => {
            let session = Session::open(&snapshot)?;
            spawn_interrupt_listener(session.cancel_token());
            run_dump_async(&session, &options, cli.dml)?;
        }
    }

    Ok(())
}

/// ログ出力を初期化する（`RUST_LOG` で上書き可能、既定は warn）
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Ctrl-C を受けたら実行中のコマンドをキャンセルする
///
/// 専用スレッドで小さなランタイムを回し、シグナルのたびにトークンを立てます。
fn spawn_interrupt_listener(token: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("kasane-interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Failed to start interrupt listener: {}", e);
                    return;
                }
            };
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    debug!("Interrupt received, cancelling current command");
                    token.cancel();
                }
            });
        });

    if let Err(e) = spawned {
        warn!("Failed to spawn interrupt listener thread: {}", e);
    }
}

/// REPLループを実行する
fn run_repl(session: &Session, dml: bool) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history = home::home_dir().map(|dir| dir.join(HISTORY_FILE));
    if let Some(path) = &history {
        // 初回起動時は履歴ファイルが存在しない
        let _ = rl.load_history(path);
    }

    loop {
        let readline = rl.readline("(kasane) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, line, dml) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => report_error(&e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Err(e) = rl.save_history(path) {
            warn!("Failed to save history to {}: {}", path.display(), e);
        }
    }

    Ok(())
}

/// 1行分のコマンドを処理する
///
/// REPLを続ける場合は `true` を返します。
fn handle_command(session: &Session, line: &str, dml: bool) -> Result<bool> {
    match Command::parse(line)? {
        Some(Command::DumpAsync(options)) => run_dump_async(session, &options, dml)?,
        Some(Command::Help(topic)) => print_help(topic.as_deref()),
        Some(Command::Quit) => {
            println!("Goodbye!");
            return Ok(false);
        }
        None => {}
    }

    Ok(true)
}

/// dumpasync を実行して標準出力へ書き出す
fn run_dump_async(session: &Session, options: &DumpAsyncOptions, dml: bool) -> Result<()> {
    let mut sink = ConsoleSink::stdout(dml);
    match session.dump_async(options, &mut sink) {
        Err(e) if matches!(e.downcast_ref::<AnalysisError>(), Some(AnalysisError::Cancelled)) => {
            println!();
            println!("Cancelled.");
            Ok(())
        }
        other => other,
    }
}

fn report_error(e: &anyhow::Error) {
    eprintln!("Error: {:#}", e);
}

fn print_help(topic: Option<&str>) {
    if matches!(topic, Some(t) if t.eq_ignore_ascii_case("dumpasync")) {
        println!("{}", HELP_TEXT);
        return;
    }

    println!("Available commands:");
    println!();
    println!("  help [command] - Show this help message, or detailed help for a command");
    println!("  quit/exit/q    - Exit kasane");
    println!();
    println!("Async commands:");
    println!("  dumpasync      - Display async stacks found on the heap");
    println!();
    println!("Examples:");
    println!("  dumpasync");
    println!("  dumpasync --coalesce");
    println!("  dumpasync --stats");
    println!("  dumpasync --type ReadAsync --fields");
    println!("  help dumpasync");
}
