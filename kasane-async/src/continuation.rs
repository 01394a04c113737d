//! 継続（continuation）の解決
//!
//! タスクの `m_continuationObject` は、ボックス、別のタスク、デリゲート、ラッパー、
//! あるいは継続のリストを指します。ここではそれを「次に実行されるオブジェクト」まで展開します。

use crate::{AsyncClassifier, CancellationToken, Result};
use kasane_heap::HeapValue;
use tracing::trace;

/// 展開ルールの結果
enum Unwrap<'h> {
    /// このオブジェクトで確定
    Done(HeapValue<'h>),
    /// このオブジェクトから次のルールを続ける
    Next(HeapValue<'h>),
}

/// 継続の解決器
pub struct ContinuationResolver<'a, 'h> {
    classifier: &'a AsyncClassifier<'h>,
    cancel: &'a CancellationToken,
}

impl<'a, 'h> ContinuationResolver<'a, 'h> {
    pub fn new(classifier: &'a AsyncClassifier<'h>, cancel: &'a CancellationToken) -> Self {
        Self { classifier, cancel }
    }

    /// `m_continuationObject` の生の値（無い、null、無効ならNone）
    pub fn raw_continuation(&self, task: &HeapValue<'h>) -> Option<HeapValue<'h>> {
        task.valid_object_field(self.classifier.schema().continuation_field)
    }

    /// タスクの継続を解決する
    ///
    /// 継続のリストであれば有効な要素それぞれを解決します。
    pub fn resolve(&self, task: &HeapValue<'h>) -> Result<Vec<HeapValue<'h>>> {
        let Some(raw) = self.raw_continuation(task) else {
            return Ok(Vec::new());
        };

        if let Some(items) = self.list_items(&raw) {
            let length = items.array_length().unwrap_or(0);
            trace!("continuation list at 0x{:x} with {} slots", raw.address(), length);
            let mut resolved = Vec::new();
            for index in 0..length {
                self.cancel.check()?;
                if let Some(entry) = items.array_element(index).filter(HeapValue::is_valid) {
                    resolved.push(self.unwrap(entry));
                }
            }
            return Ok(resolved);
        }

        Ok(vec![self.unwrap(raw)])
    }

    /// 継続リストの `_items` 配列（リストでなければNone）
    fn list_items(&self, value: &HeapValue<'h>) -> Option<HeapValue<'h>> {
        let schema = self.classifier.schema();
        if !value.type_name()?.starts_with(schema.list_type_prefix) {
            return None;
        }
        value
            .valid_object_field(schema.list_items_field)
            .filter(|items| items.array_rank() == Some(1))
    }

    /// 展開ルール（上から順に適用する）
    fn unwrap_rules() -> [fn(&Self, HeapValue<'h>) -> Option<Unwrap<'h>>; 4] {
        [
            Self::state_machine_box,
            Self::task_continuation,
            Self::action_delegate,
            Self::delegate_target,
        ]
    }

    /// 1つの継続エントリを展開する
    ///
    /// どのルールも当てはまらなければエントリ自身を返します。
    pub fn unwrap(&self, entry: HeapValue<'h>) -> HeapValue<'h> {
        let mut current = entry;
        for rule in Self::unwrap_rules() {
            match rule(self, current) {
                Some(Unwrap::Done(value)) => return value,
                Some(Unwrap::Next(value)) => current = value,
                None => {}
            }
        }
        current
    }

    /// ステートマシンボックスはそれ自体が継続
    fn state_machine_box(&self, value: HeapValue<'h>) -> Option<Unwrap<'h>> {
        self.classifier
            .is_state_machine_box(&value)
            .then_some(Unwrap::Done(value))
    }

    /// ContinueWith などのタスク継続は `m_task` が継続
    fn task_continuation(&self, value: HeapValue<'h>) -> Option<Unwrap<'h>> {
        value
            .valid_object_field(self.classifier.schema().task_field)
            .map(Unwrap::Done)
    }

    /// 継続オブジェクトが保持するデリゲート
    fn action_delegate(&self, value: HeapValue<'h>) -> Option<Unwrap<'h>> {
        value
            .valid_object_field(self.classifier.schema().action_field)
            .map(Unwrap::Next)
    }

    /// デリゲートのターゲット（ラッパーであれば中の継続まで進む）
    fn delegate_target(&self, value: HeapValue<'h>) -> Option<Unwrap<'h>> {
        let schema = self.classifier.schema();
        let target = value.valid_object_field(schema.delegate_target_field)?;
        if target.type_name() != Some(schema.continuation_wrapper_type) {
            return Some(Unwrap::Done(target));
        }
        let Some(inner) = target.valid_object_field(schema.wrapper_continuation_field) else {
            return Some(Unwrap::Done(target));
        };
        let resolved = inner
            .valid_object_field(schema.delegate_target_field)
            .unwrap_or(inner);
        Some(Unwrap::Done(resolved))
    }
}
