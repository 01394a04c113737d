//! 非同期ランタイムの既知レイアウト
//!
//! ランタイムのバージョンによって変わり得る型名・フィールド名を一か所にまとめ、
//! 型ごとの形状（[`TaskShape`]）は一度だけ調べてキャッシュします。

use kasane_heap::{FieldDef, HeapType};

/// 型名・フィールド名の表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchema {
    /// 非同期オペレーションの基底型
    pub task_type: &'static str,
    pub state_flags_field: &'static str,
    pub continuation_field: &'static str,
    pub action_field: &'static str,
    pub task_field: &'static str,
    /// ステートマシンボックスの型名の接頭辞
    pub box_builder_prefix: &'static str,
    /// 接頭辞の後に現れるボックス型の目印
    pub box_marker: &'static str,
    /// 表示名を切り出す目印
    pub box_name_marker: &'static str,
    pub state_machine_field: &'static str,
    pub await_state_field: &'static str,
    pub awaiter_prefix: &'static str,
    pub first_awaiter_field: &'static str,
    pub move_next_method: &'static str,
    pub list_type_prefix: &'static str,
    pub list_items_field: &'static str,
    pub delegate_target_field: &'static str,
    pub delegate_method_ptr_field: &'static str,
    pub delegate_method_ptr_aux_field: &'static str,
    pub continuation_wrapper_type: &'static str,
    pub wrapper_continuation_field: &'static str,
    pub completion_sentinel_field: &'static str,
    pub completion_sentinel_name: &'static str,
}

impl TaskSchema {
    /// .NET Core 系ランタイムのレイアウト
    pub const CORECLR: TaskSchema = TaskSchema {
        task_type: "System.Threading.Tasks.Task",
        state_flags_field: "m_stateFlags",
        continuation_field: "m_continuationObject",
        action_field: "m_action",
        task_field: "m_task",
        box_builder_prefix: "System.Runtime.CompilerServices.AsyncTaskMethodBuilder<",
        box_marker: "AsyncStateMachineBox",
        box_name_marker: "StateMachineBox<",
        state_machine_field: "StateMachine",
        await_state_field: "<>1__state",
        awaiter_prefix: "<>u__",
        first_awaiter_field: "<>u__1",
        move_next_method: "MoveNext",
        list_type_prefix: "System.Collections.Generic.List<",
        list_items_field: "_items",
        delegate_target_field: "_target",
        delegate_method_ptr_field: "_methodPtr",
        delegate_method_ptr_aux_field: "_methodPtrAux",
        continuation_wrapper_type: "System.Runtime.CompilerServices.AsyncMethodBuilderCore+ContinuationWrapper",
        wrapper_continuation_field: "_continuation",
        completion_sentinel_field: "s_taskCompletionSentinel",
        completion_sentinel_name: "TaskCompletionSentinel",
    };

    /// フィールド名が awaiter のものか（名前の無いフィールドも awaiter とみなす）
    pub fn is_awaiter_field(&self, field: &FieldDef) -> bool {
        match &field.name {
            Some(name) => name.starts_with(self.awaiter_prefix),
            None => true,
        }
    }
}

impl Default for TaskSchema {
    fn default() -> Self {
        Self::CORECLR
    }
}

/// 型ごとに調べたタスクのフィールド配置
#[derive(Debug, Clone, Copy)]
pub struct TaskShape<'h> {
    pub state_flags: &'h FieldDef,
    pub continuation: Option<&'h FieldDef>,
    pub action: Option<&'h FieldDef>,
    pub state_machine: Option<&'h FieldDef>,
}

impl<'h> TaskShape<'h> {
    /// 型の形状を調べる（状態フラグを持たない型はNone）
    pub fn probe(ty: &'h HeapType, schema: &TaskSchema) -> Option<Self> {
        Some(Self {
            state_flags: ty.field_by_name(schema.state_flags_field)?,
            continuation: ty.field_by_name(schema.continuation_field),
            action: ty.field_by_name(schema.action_field),
            state_machine: ty.field_by_name(schema.state_machine_field),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_heap::{ElementType, HeapBuilder, HeapSnapshot, TypeSpec};

    #[test]
    fn test_probe_requires_state_flags() {
        let mut b = HeapBuilder::new();
        let task = b
            .define_type(
                TypeSpec::class("System.Threading.Tasks.Task")
                    .field("m_stateFlags", ElementType::Int32)
                    .field("m_continuationObject", ElementType::Object),
            )
            .unwrap();
        let plain = b
            .define_type(TypeSpec::class("Plain").field("m_action", ElementType::Object))
            .unwrap();
        let heap = b.build();

        let shape = TaskShape::probe(heap.get_type(task).unwrap(), &TaskSchema::CORECLR).unwrap();
        assert_eq!(shape.state_flags.offset, 0);
        assert!(shape.continuation.is_some());
        assert!(shape.action.is_none());
        assert!(TaskShape::probe(heap.get_type(plain).unwrap(), &TaskSchema::CORECLR).is_none());
    }

    #[test]
    fn test_awaiter_field_names() {
        let schema = TaskSchema::default();
        let field = |name: Option<&str>| FieldDef {
            name: name.map(str::to_string),
            element_type: ElementType::Object,
            offset: 0,
            size: 8,
            field_type: None,
        };
        assert!(schema.is_awaiter_field(&field(Some("<>u__1"))));
        assert!(schema.is_awaiter_field(&field(None)));
        assert!(!schema.is_awaiter_field(&field(Some("<>1__state"))));
    }
}
