//! 出力先とマークアップ付きの書き出し
//!
//! マークアップ（`--dml`）が有効な場合、アドレスやメソッドテーブルはデバッガのコマンドへのリンクとして出力されます。

use crate::{DumpAsyncOptions, Result};
use kasane_heap::Address;
use std::io::Write;

/// 出力先
pub trait OutputSink {
    /// プレーンテキストを書き出す
    fn write(&mut self, text: &str) -> Result<()>;

    /// マークアップを書き出す（`supports_markup` が true の場合のみ呼ばれる）
    fn write_markup(&mut self, markup: &str) -> Result<()>;

    /// マークアップを解釈できるか
    fn supports_markup(&self) -> bool;

    fn write_line(&mut self, text: &str) -> Result<()> {
        self.write(text)?;
        self.write("\n")
    }
}

/// `std::io::Write` への出力
pub struct ConsoleSink<W: Write> {
    writer: W,
    markup: bool,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W, markup: bool) -> Self {
        Self { writer, markup }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl ConsoleSink<std::io::Stdout> {
    /// 標準出力への出力先を作成する
    pub fn stdout(markup: bool) -> Self {
        Self::new(std::io::stdout(), markup)
    }
}

impl<W: Write> OutputSink for ConsoleSink<W> {
    fn write(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn write_markup(&mut self, markup: &str) -> Result<()> {
        self.writer.write_all(markup.as_bytes())?;
        Ok(())
    }

    fn supports_markup(&self) -> bool {
        self.markup
    }
}

/// メモリ上に出力を溜める出力先
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    buffer: String,
    markup: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// マークアップを受け付ける出力先を作成する
    pub fn with_markup() -> Self {
        Self {
            buffer: String::new(),
            markup: true,
        }
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn lines(&self) -> Vec<&str> {
        self.buffer.lines().collect()
    }
}

impl OutputSink for BufferSink {
    fn write(&mut self, text: &str) -> Result<()> {
        self.buffer.push_str(text);
        Ok(())
    }

    fn write_markup(&mut self, markup: &str) -> Result<()> {
        self.buffer.push_str(markup);
        Ok(())
    }

    fn supports_markup(&self) -> bool {
        self.markup
    }
}

/// リンク先コマンドの名前
const COMMAND_INVOKE: &str = "!dumpasync";

/// アドレスの書式とリンクを扱う書き出し器
pub struct Printer<'s> {
    sink: &'s mut dyn OutputSink,
    pointer_size: u64,
    /// リンク先の dumpasync に引き継ぐオプション
    carried_flags: String,
}

impl<'s> Printer<'s> {
    pub fn new(sink: &'s mut dyn OutputSink, pointer_size: u64, options: &DumpAsyncOptions) -> Self {
        let mut flags = Vec::new();
        if options.include_tasks {
            flags.push("--tasks");
        }
        if options.include_completed {
            flags.push("--completed");
        }
        Self {
            sink,
            pointer_size,
            carried_flags: flags.iter().map(|f| format!(" {}", f)).collect(),
        }
    }

    pub fn markup(&self) -> bool {
        self.sink.supports_markup()
    }

    pub fn write(&mut self, text: &str) -> Result<()> {
        self.sink.write(text)
    }

    pub fn write_line(&mut self, text: &str) -> Result<()> {
        self.sink.write_line(text)
    }

    /// ポインタ幅に合わせたアドレス表記（常に16桁幅）
    pub fn format_address(&self, address: Address) -> String {
        if self.pointer_size == 4 {
            format!("{:>16}", format!("{:08x}", address))
        } else {
            format!("{:016x}", address)
        }
    }

    /// リンク内のアドレス表記
    fn hex(&self, address: Address) -> String {
        if self.pointer_size == 4 {
            format!("0x{:08x}", address)
        } else {
            format!("0x{:016x}", address)
        }
    }

    fn write_link(&mut self, command: &str, text: &str) -> Result<()> {
        let markup = format!("<exec cmd=\"{}\">{}</exec>", command, text);
        self.sink.write_markup(&markup)
    }

    /// 見出し行（マークアップでは太字）
    pub fn write_header_line(&mut self, text: &str) -> Result<()> {
        if self.markup() {
            self.sink.write_markup(&format!("<b>{}</b>\n", text))
        } else {
            self.sink.write_line(text)
        }
    }

    /// オブジェクトのアドレス
    ///
    /// 非同期オブジェクトは dumpasync の詳細表示へ、それ以外は DumpObj へリンクします。
    pub fn write_address(&mut self, address: Address, async_object: bool) -> Result<()> {
        let text = self.format_address(address);
        if !self.markup() {
            return self.sink.write(&text);
        }
        let command = if async_object {
            format!(
                "{} --address {}{} --fields",
                COMMAND_INVOKE,
                self.hex(address),
                self.carried_flags
            )
        } else {
            format!("!DumpObj /d {}", self.hex(address))
        };
        self.write_link(&command, &text)
    }

    /// メソッドテーブルのアドレス
    pub fn write_method_table(&mut self, method_table: Address, async_object: bool) -> Result<()> {
        let text = self.format_address(method_table);
        if !self.markup() {
            return self.sink.write(&text);
        }
        let command = if async_object {
            format!(
                "{} --methodtable {}{}",
                COMMAND_INVOKE,
                self.hex(method_table),
                self.carried_flags
            )
        } else {
            format!("!DumpMT /d {}", self.hex(method_table))
        };
        self.write_link(&command, &text)
    }

    /// インライン値型のアドレス（DumpVC へのリンク）
    pub fn write_value_type_address(&mut self, address: Address, method_table: Address) -> Result<()> {
        let text = self.format_address(address);
        if !self.markup() {
            return self.sink.write(&text);
        }
        let command = format!("!DumpVC /d {} {}", self.hex(method_table), self.hex(address));
        self.write_link(&command, &text)
    }

    /// 再開コードへのリンク（マークアップ時のみ）
    pub fn write_code_link(&mut self, code: Option<Address>) -> Result<()> {
        match code {
            Some(address) if self.markup() && address != 0 && address != u64::MAX => {
                let markup = format!(
                    " <link cmd=\".open -a 0x{:x}\" alt=\"Source link\">@ {:x}</link>",
                    address, address
                );
                self.sink.write_markup(&markup)
            }
            _ => Ok(()),
        }
    }
}
