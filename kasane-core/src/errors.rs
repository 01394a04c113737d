//! コマンド処理のエラー型

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: '{0}'. Type 'help' for available commands.")]
    UnknownCommand(String),

    #[error("{0}")]
    InvalidArguments(String),
}
