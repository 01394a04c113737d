//! 表示用の説明文字列

use crate::AsyncClassifier;
use kasane_heap::{Address, HeapValue, MethodDef};

/// オブジェクトの説明を作る
pub struct Describer<'a, 'h> {
    classifier: &'a AsyncClassifier<'h>,
    sentinel: Option<Address>,
}

impl<'a, 'h> Describer<'a, 'h> {
    pub fn new(classifier: &'a AsyncClassifier<'h>) -> Self {
        let schema = classifier.schema();
        let sentinel = classifier
            .task_type()
            .static_field_by_name(schema.completion_sentinel_field)
            .filter(|f| f.element_type.is_object_reference() && f.value != 0)
            .map(|f| f.value);
        Self {
            classifier,
            sentinel,
        }
    }

    /// 完了済みを示す番兵オブジェクトのアドレス
    pub fn sentinel(&self) -> Option<Address> {
        self.sentinel
    }

    /// オブジェクトの説明
    ///
    /// - ステートマシンボックス: `StateMachineBox<...>` の中身
    /// - デリゲートを持つタスク: 型名 + ` {シグネチャ}`（メソッドが分かる場合）
    /// - 完了の番兵: `TaskCompletionSentinel`
    /// - それ以外: 型名（型が分からなければ空文字列）
    pub fn describe(&self, value: &HeapValue<'h>) -> String {
        let schema = self.classifier.schema();
        let Some(name) = value.type_name() else {
            return String::new();
        };

        if self.classifier.is_state_machine_box(value) {
            return strip_box_name(name, schema.box_name_marker).to_string();
        }
        if let Some(action) = value.valid_object_field(schema.action_field) {
            return match self.delegate_method(&action) {
                Some(method) => format!("{} {{{}}}", name, method.display_signature()),
                None => name.to_string(),
            };
        }
        if !value.is_null() && self.sentinel == Some(value.address()) {
            return schema.completion_sentinel_name.to_string();
        }
        name.to_string()
    }

    /// デリゲートが呼び出すメソッド
    ///
    /// `_methodPtr` で見つからなければ `_methodPtrAux` を試します。
    pub fn delegate_method(&self, delegate: &HeapValue<'h>) -> Option<&'h MethodDef> {
        let schema = self.classifier.schema();
        let heap = self.classifier.heap();
        delegate.field(schema.delegate_method_ptr_aux_field)?;
        let method_ptr = delegate.read_pointer_field(schema.delegate_method_ptr_field)?;
        if method_ptr == 0 {
            return None;
        }
        heap.method_by_ip(method_ptr).or_else(|| {
            delegate
                .read_pointer_field(schema.delegate_method_ptr_aux_field)
                .filter(|&ip| ip != 0)
                .and_then(|ip| heap.method_by_ip(ip))
        })
    }
}

/// ボックス型名から中のステートマシン名を取り出す
fn strip_box_name<'n>(name: &'n str, marker: &str) -> &'n str {
    match name.find(marker) {
        Some(pos) => {
            let inner = &name[pos + marker.len()..];
            inner.strip_suffix('>').unwrap_or(inner)
        }
        None => name,
    }
}
