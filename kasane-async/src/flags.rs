//! タスク状態フラグ

use std::fmt;

/// タスクの `m_stateFlags` の値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskStateFlags(pub i32);

impl TaskStateFlags {
    pub const STARTED: i32 = 0x10000;
    pub const DELEGATE_INVOKED: i32 = 0x20000;
    pub const DISPOSED: i32 = 0x40000;
    pub const EXCEPTION_OBSERVED_BY_PARENT: i32 = 0x80000;
    pub const CANCELLATION_ACKNOWLEDGED: i32 = 0x100000;
    pub const FAULTED: i32 = 0x200000;
    pub const CANCELED: i32 = 0x400000;
    pub const WAITING_ON_CHILDREN: i32 = 0x800000;
    pub const RAN_TO_COMPLETION: i32 = 0x1000000;
    pub const COMPLETION_RESERVED: i32 = 0x4000000;

    /// 終了状態（Faulted | Canceled | RanToCompletion）のマスク
    pub const COMPLETED_MASK: i32 = Self::FAULTED | Self::CANCELED | Self::RAN_TO_COMPLETION;

    /// 表示対象のフラグと名前（WaitingForActivation などスタック上で自明なものは含まない）
    const NAMED: [(i32, &'static str); 10] = [
        (Self::STARTED, "Started"),
        (Self::DELEGATE_INVOKED, "DelegateInvoked"),
        (Self::DISPOSED, "Disposed"),
        (Self::EXCEPTION_OBSERVED_BY_PARENT, "ExceptionObservedByParent"),
        (Self::CANCELLATION_ACKNOWLEDGED, "CancellationAcknowledged"),
        (Self::FAULTED, "Faulted"),
        (Self::CANCELED, "Canceled"),
        (Self::WAITING_ON_CHILDREN, "WaitingOnChildren"),
        (Self::RAN_TO_COMPLETION, "RanToCompletion"),
        (Self::COMPLETION_RESERVED, "CompletionReserved"),
    ];

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn contains(self, flag: i32) -> bool {
        self.0 & flag != 0
    }

    /// 完了しているか（いずれかの終了ビットが立っている）
    pub fn is_completed(self) -> bool {
        self.contains(Self::COMPLETED_MASK)
    }

    /// 興味のあるフラグを `|` 区切りで表す
    ///
    /// 該当するフラグが無い場合は空白1文字を返します。
    pub fn describe(self) -> String {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            " ".to_string()
        } else {
            names.join("|")
        }
    }
}

impl fmt::Display for TaskStateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
