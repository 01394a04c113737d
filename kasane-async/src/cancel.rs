//! 協調的キャンセル

use crate::{AnalysisError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// キャンセルトークン
///
/// 解析・描画の各ループは反復の境界で [`CancellationToken::check`] を呼び出します。
/// クローンは同じフラグを共有します。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求する
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// キャンセル要求を取り消す（次のコマンドの開始時に使う）
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// キャンセルされていれば `AnalysisError::Cancelled` を返す
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(AnalysisError::Cancelled.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        let err = token.check().unwrap_err();
        assert_eq!(err.downcast_ref::<AnalysisError>(), Some(&AnalysisError::Cancelled));

        token.reset();
        assert!(!clone.is_cancelled());
    }
}
