//! ランタイムの非同期関連型をスナップショットに定義するヘルパー
//!
//! テストやデモ用のスナップショットを [`HeapBuilder`] で組み立てる際に、
//! `Task`、継続オブジェクト、ステートマシンボックスなどの型を実際のランタイムと同じ名前・フィールドで定義します。

use crate::schema::TaskSchema;
use crate::{Result, TaskStateFlags};
use kasane_heap::{Address, ElementType, HeapBuilder, HeapError, TypeSpec};

/// awaiter フィールドの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaiterKind {
    /// `TaskAwaiter`（`m_task` を持つ値型）
    TaskAwaiter,
    /// 参照型の awaiter
    Reference,
    /// 任意の値型の awaiter
    ValueType(Address),
}

/// async メソッドの定義内容
#[derive(Debug, Clone)]
pub struct AsyncMethodSpec {
    /// ステートマシンの型名（例: `Program+<Run>d__1`）
    pub name: String,
    pub result_type: String,
    pub awaiters: Vec<AwaiterKind>,
    pub locals: Vec<(String, ElementType)>,
    /// ステートマシンがクラス（デバッグビルド）か
    pub class_state_machine: bool,
    pub move_next_code: Option<Address>,
}

impl AsyncMethodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result_type: "System.Threading.Tasks.VoidTaskResult".to_string(),
            awaiters: Vec::new(),
            locals: Vec::new(),
            class_state_machine: false,
            move_next_code: None,
        }
    }

    pub fn returning(mut self, result_type: impl Into<String>) -> Self {
        self.result_type = result_type.into();
        self
    }

    /// awaiter フィールドを追加する（`<>u__1`, `<>u__2`, ... の順）
    pub fn awaiter(mut self, kind: AwaiterKind) -> Self {
        self.awaiters.push(kind);
        self
    }

    /// ローカル変数（ステートマシンのフィールド）を追加する
    pub fn local(mut self, name: impl Into<String>, element_type: ElementType) -> Self {
        self.locals.push((name.into(), element_type));
        self
    }

    pub fn class_state_machine(mut self) -> Self {
        self.class_state_machine = true;
        self
    }

    /// `MoveNext` のネイティブコードアドレス
    pub fn move_next_at(mut self, address: Address) -> Self {
        self.move_next_code = Some(address);
        self
    }
}

/// 定義された async メソッドの型
#[derive(Debug, Clone)]
pub struct AsyncMethodTypes {
    pub state_machine: Address,
    /// ステートマシンボックス（`AsyncStateMachineBox<...>`）
    pub frame: Address,
    pub class_state_machine: bool,
    pub awaiters: Vec<AwaiterKind>,
}

/// 定義済みのランタイム型
#[derive(Debug, Clone)]
pub struct CoreLib {
    pub task: Address,
    pub object_array: Address,
    pub continuation_list: Address,
    pub action: Address,
    pub continue_with_continuation: Address,
    pub await_continuation: Address,
    pub continuation_wrapper: Address,
    pub task_awaiter: Address,
}

impl CoreLib {
    /// ランタイム型を定義する
    pub fn install(b: &mut HeapBuilder) -> Result<Self> {
        let schema = TaskSchema::CORECLR;
        let object_array = b.object_array_type();

        let task = b.define_type(
            TypeSpec::class(schema.task_type)
                .field("m_taskId", ElementType::Int32)
                .field(schema.state_flags_field, ElementType::Int32)
                .field(schema.action_field, ElementType::Object)
                .field("m_stateObject", ElementType::Object)
                .field(schema.continuation_field, ElementType::Object)
                .field("m_contingentProperties", ElementType::Object),
        )?;
        let continuation_list = b.define_type(
            TypeSpec::class("System.Collections.Generic.List<System.Object>")
                .typed_field(schema.list_items_field, ElementType::SZArray, object_array)
                .field("_size", ElementType::Int32)
                .field("_version", ElementType::Int32),
        )?;
        let action = b.define_type(
            TypeSpec::class("System.Action")
                .field(schema.delegate_target_field, ElementType::Object)
                .field("_methodBase", ElementType::Object)
                .field(schema.delegate_method_ptr_field, ElementType::NativeInt)
                .field(schema.delegate_method_ptr_aux_field, ElementType::NativeInt),
        )?;
        let continue_with_continuation = b.define_type(
            TypeSpec::class("System.Threading.Tasks.ContinueWithTaskContinuation")
                .field(schema.task_field, ElementType::Object)
                .field("m_options", ElementType::Int32),
        )?;
        let await_continuation = b.define_type(
            TypeSpec::class("System.Threading.Tasks.AwaitTaskContinuation")
                .field("m_capturedContext", ElementType::Object)
                .field(schema.action_field, ElementType::Object),
        )?;
        let continuation_wrapper = b.define_type(
            TypeSpec::class(schema.continuation_wrapper_type)
                .field("_invokeAction", ElementType::Object)
                .field(schema.wrapper_continuation_field, ElementType::Object)
                .field("_innerTask", ElementType::Object),
        )?;
        let task_awaiter = b.define_type(
            TypeSpec::value_type("System.Runtime.CompilerServices.TaskAwaiter")
                .field(schema.task_field, ElementType::Class),
        )?;

        Ok(Self {
            task,
            object_array,
            continuation_list,
            action,
            continue_with_continuation,
            await_continuation,
            continuation_wrapper,
            task_awaiter,
        })
    }

    /// async メソッドのステートマシンとボックスの型を定義する
    pub fn define_async_method(
        &self,
        b: &mut HeapBuilder,
        spec: &AsyncMethodSpec,
    ) -> Result<AsyncMethodTypes> {
        let schema = TaskSchema::CORECLR;
        let mut sm = if spec.class_state_machine {
            TypeSpec::class(spec.name.clone())
        } else {
            TypeSpec::value_type(spec.name.clone())
        };
        sm = sm.field(schema.await_state_field, ElementType::Int32);
        for (name, element_type) in &spec.locals {
            sm = sm.field(name.clone(), *element_type);
        }
        for (index, kind) in spec.awaiters.iter().enumerate() {
            let name = format!("{}{}", schema.awaiter_prefix, index + 1);
            sm = match kind {
                AwaiterKind::TaskAwaiter => {
                    sm.typed_field(name, ElementType::Struct, self.task_awaiter)
                }
                AwaiterKind::Reference => sm.field(name, ElementType::Object),
                AwaiterKind::ValueType(mt) => sm.typed_field(name, ElementType::Struct, *mt),
            };
        }
        sm = sm
            .method("SetStateMachine", None)
            .method(schema.move_next_method, spec.move_next_code);
        let state_machine = b.define_type(sm)?;

        let frame_name = format!(
            "System.Runtime.CompilerServices.AsyncTaskMethodBuilder<{}>+AsyncStateMachineBox<{}>",
            spec.result_type, spec.name
        );
        let frame_spec = TypeSpec::class(frame_name).extends(self.task);
        let frame_spec = if spec.class_state_machine {
            frame_spec.typed_field(schema.state_machine_field, ElementType::Class, state_machine)
        } else {
            frame_spec.typed_field(schema.state_machine_field, ElementType::Struct, state_machine)
        };
        let frame = b.define_type(frame_spec.field("m_context", ElementType::Object))?;

        Ok(AsyncMethodTypes {
            state_machine,
            frame,
            class_state_machine: spec.class_state_machine,
            awaiters: spec.awaiters.clone(),
        })
    }

    /// タスクを割り当てる
    pub fn alloc_task(&self, b: &mut HeapBuilder, state_flags: i32) -> Result<Address> {
        let task = b.alloc(self.task)?;
        b.set(task, TaskSchema::CORECLR.state_flags_field, state_flags)?;
        Ok(task)
    }

    /// ステートマシンボックスを割り当てる
    pub fn alloc_frame(
        &self,
        b: &mut HeapBuilder,
        types: &AsyncMethodTypes,
        await_state: i32,
        state_flags: i32,
    ) -> Result<Address> {
        let schema = TaskSchema::CORECLR;
        let frame = b.alloc(types.frame)?;
        b.set(frame, schema.state_flags_field, state_flags)?;
        if types.class_state_machine {
            let sm = b.alloc(types.state_machine)?;
            b.set(sm, schema.await_state_field, await_state)?;
            b.set_ref(frame, schema.state_machine_field, sm)?;
        } else {
            let path = format!("{}.{}", schema.state_machine_field, schema.await_state_field);
            b.set(frame, &path, await_state)?;
        }
        Ok(frame)
    }

    /// ステートマシンの awaiter が待っている対象を設定する（`index` は1から）
    ///
    /// `TaskAwaiter` なら `m_task`、参照型の awaiter ならフィールドそのものに書き込みます。
    pub fn set_awaited(
        &self,
        b: &mut HeapBuilder,
        types: &AsyncMethodTypes,
        frame: Address,
        index: usize,
        target: Address,
    ) -> Result<()> {
        let schema = TaskSchema::CORECLR;
        let kind = index
            .checked_sub(1)
            .and_then(|i| types.awaiters.get(i))
            .ok_or_else(|| HeapError::UnknownField {
                type_name: "state machine".to_string(),
                field: format!("{}{}", schema.awaiter_prefix, index),
            })?;
        let field = format!("{}{}", schema.awaiter_prefix, index);
        let (object, prefix) = if types.class_state_machine {
            (b.get_ref(frame, schema.state_machine_field)?, String::new())
        } else {
            (frame, format!("{}.", schema.state_machine_field))
        };
        match kind {
            AwaiterKind::TaskAwaiter => {
                b.set_ref(object, &format!("{}{}.{}", prefix, field, schema.task_field), target)
            }
            AwaiterKind::Reference => b.set_ref(object, &format!("{}{}", prefix, field), target),
            AwaiterKind::ValueType(_) => Err(HeapError::InvalidSnapshot(format!(
                "awaiter '{}' is a custom value type; write it with set_bytes",
                field
            ))
            .into()),
        }
    }

    /// 完了の番兵（`Task.s_taskCompletionSentinel`）を割り当てる
    pub fn alloc_sentinel(&self, b: &mut HeapBuilder) -> Result<Address> {
        let sentinel = self.alloc_task(b, TaskStateFlags::RAN_TO_COMPLETION)?;
        b.set_static(
            self.task,
            TaskSchema::CORECLR.completion_sentinel_field,
            ElementType::Class,
            sentinel,
        )?;
        Ok(sentinel)
    }

    /// タスクの継続を設定する
    pub fn set_continuation(&self, b: &mut HeapBuilder, task: Address, continuation: Address) -> Result<()> {
        b.set_ref(task, TaskSchema::CORECLR.continuation_field, continuation)
    }

    /// 継続のリスト（`List<object>`）を割り当てる
    ///
    /// `capacity` が要素数より大きい場合、残りのスロットはnullのままです。
    pub fn alloc_continuation_list(
        &self,
        b: &mut HeapBuilder,
        entries: &[Address],
        capacity: u32,
    ) -> Result<Address> {
        let schema = TaskSchema::CORECLR;
        let capacity = capacity.max(entries.len() as u32);
        let items = b.alloc_array(self.object_array, capacity)?;
        for (index, &entry) in entries.iter().enumerate() {
            b.set_element(items, index as u32, entry)?;
        }
        let list = b.alloc(self.continuation_list)?;
        b.set_ref(list, schema.list_items_field, items)?;
        b.set(list, "_size", entries.len() as i32)?;
        Ok(list)
    }

    /// デリゲート（`System.Action`）を割り当てる
    pub fn alloc_action(&self, b: &mut HeapBuilder, target: Address, method_ptr: Address) -> Result<Address> {
        let schema = TaskSchema::CORECLR;
        let action = b.alloc(self.action)?;
        b.set_ref(action, schema.delegate_target_field, target)?;
        b.set_ref(action, schema.delegate_method_ptr_field, method_ptr)?;
        Ok(action)
    }
}
