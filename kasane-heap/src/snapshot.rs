//! ヒープスナップショットの抽象インターフェース
//!
//! ダンプファイルやライブプロセスなど、スナップショットの提供元はこのトレイトを実装します。
//! 解析側は読み取り専用でこのインターフェースのみを利用します。

use crate::{Address, HeapError, HeapType, MethodDef, Result};

/// 基底型チェーンをたどる上限（壊れた型情報での無限ループ防止）
const MAX_BASE_TYPE_DEPTH: usize = 64;

/// ヒープスナップショット
pub trait HeapSnapshot {
    /// ヒープを走査できる状態か
    fn can_walk_heap(&self) -> bool;

    /// ターゲットのポインタサイズ（バイト）
    fn pointer_size(&self) -> u64;

    /// ヒープ上の全オブジェクトのアドレスを列挙する
    ///
    /// 実装によっては同じオブジェクトが複数回報告されることがあります。
    fn enumerate_objects(&self) -> Box<dyn Iterator<Item = Address> + '_>;

    /// メソッドテーブルから型情報を取得する
    fn get_type(&self, method_table: Address) -> Option<&HeapType>;

    /// 名前から型情報を取得する
    fn type_by_name(&self, name: &str) -> Option<&HeapType>;

    /// メモリからデータを読み取る
    fn read(&self, address: Address, size: usize) -> Result<Vec<u8>>;

    /// 命令ポインタからメソッドを解決する
    fn method_by_ip(&self, ip: Address) -> Option<&MethodDef>;

    /// ポインタサイズの値を読み取る
    fn read_pointer(&self, address: Address) -> Result<Address> {
        let bytes = self.read(address, self.pointer_size() as usize)?;
        match bytes.as_slice() {
            [a, b, c, d] => Ok(u32::from_le_bytes([*a, *b, *c, *d]) as u64),
            slice => {
                let array: [u8; 8] = slice
                    .try_into()
                    .map_err(|_| HeapError::UnsupportedPointerSize(self.pointer_size()))?;
                Ok(u64::from_le_bytes(array))
            }
        }
    }
}

/// 型が基底型と同じか、基底型から派生しているか判定する
///
/// 型の同一性はモジュールとメタデータトークンの組で比較します。
pub fn inherits_from(heap: &dyn HeapSnapshot, ty: &HeapType, base: &HeapType) -> bool {
    let mut current = Some(ty);
    for _ in 0..MAX_BASE_TYPE_DEPTH {
        let Some(t) = current else {
            return false;
        };
        if t.metadata_token == base.metadata_token && t.module == base.module {
            return true;
        }
        current = t.base_type.and_then(|mt| heap.get_type(mt));
    }
    false
}
