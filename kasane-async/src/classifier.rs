//! 非同期オペレーションの分類

use crate::schema::{TaskSchema, TaskShape};
use crate::{AnalysisError, Result, TaskStateFlags};
use kasane_heap::{inherits_from, Address, HeapSnapshot, HeapType, HeapValue};
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

/// これ以下のサイズのオブジェクトはタスクとみなさない
pub const MIN_TASK_SIZE: u64 = 24;

/// ノードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// 通常のタスク
    PlainOperation,
    /// async メソッドのステートマシンボックス
    CoroutineFrame,
}

/// タスク型の判定器
///
/// 型ごとの判定結果と形状は1回の解析の間キャッシュされます。
pub struct AsyncClassifier<'h> {
    heap: &'h dyn HeapSnapshot,
    schema: TaskSchema,
    task_type: &'h HeapType,
    box_pattern: Regex,
    shapes: RefCell<HashMap<Address, Option<TaskShape<'h>>>>,
}

impl<'h> AsyncClassifier<'h> {
    /// 既定のレイアウトで判定器を作成する
    pub fn new(heap: &'h dyn HeapSnapshot) -> Result<Self> {
        Self::with_schema(heap, TaskSchema::CORECLR)
    }

    /// レイアウトを指定して判定器を作成する
    ///
    /// 基底のタスク型がスナップショットに無い場合は `AnalysisError::MissingType` を返します。
    pub fn with_schema(heap: &'h dyn HeapSnapshot, schema: TaskSchema) -> Result<Self> {
        let task_type = heap
            .type_by_name(schema.task_type)
            .ok_or_else(|| AnalysisError::MissingType(schema.task_type.to_string()))?;

        // 例: System.Runtime.CompilerServices.AsyncTaskMethodBuilder<System.Int32>+AsyncStateMachineBox<Program+<Run>d__1>
        let box_pattern = Regex::new(&format!(
            "^{}.*{}",
            regex::escape(schema.box_builder_prefix),
            regex::escape(schema.box_marker)
        ))?;

        Ok(Self {
            heap,
            schema,
            task_type,
            box_pattern,
            shapes: RefCell::new(HashMap::new()),
        })
    }

    pub fn heap(&self) -> &'h dyn HeapSnapshot {
        self.heap
    }

    pub fn schema(&self) -> &TaskSchema {
        &self.schema
    }

    /// 基底のタスク型
    pub fn task_type(&self) -> &'h HeapType {
        self.task_type
    }

    /// 型がタスク型またはその派生型か
    pub fn is_task_type(&self, ty: &HeapType) -> bool {
        inherits_from(self.heap, ty, self.task_type)
    }

    /// 型名がステートマシンボックスのものか
    pub fn is_state_machine_box_name(&self, name: &str) -> bool {
        self.box_pattern.is_match(name)
    }

    /// 値がステートマシンボックスか
    pub fn is_state_machine_box(&self, value: &HeapValue<'h>) -> bool {
        value
            .ty()
            .is_some_and(|ty| self.is_task_type(ty) && self.is_state_machine_box_name(&ty.name))
    }

    /// 型の形状を取得する（キャッシュ付き）
    pub fn shape(&self, ty: &'h HeapType) -> Option<TaskShape<'h>> {
        if let Some(cached) = self.shapes.borrow().get(&ty.method_table) {
            return *cached;
        }
        let shape = TaskShape::probe(ty, &self.schema);
        self.shapes.borrow_mut().insert(ty.method_table, shape);
        shape
    }

    /// オブジェクトを分類する
    ///
    /// 小さすぎるオブジェクト、タスク型でないオブジェクトはNoneです。
    pub fn classify(&self, value: &HeapValue<'h>) -> Option<NodeKind> {
        let ty = value.ty()?;
        if value.size() <= MIN_TASK_SIZE || !self.is_task_type(ty) {
            return None;
        }
        if self.is_state_machine_box_name(&ty.name) {
            Some(NodeKind::CoroutineFrame)
        } else {
            Some(NodeKind::PlainOperation)
        }
    }

    /// 状態フラグを読み取る（フィールドが無い、または読めなければNone）
    pub fn state_flags(&self, value: &HeapValue<'h>) -> Option<TaskStateFlags> {
        let ty = value.ty()?;
        let shape = self.shape(ty)?;
        value.read_field_def::<i32>(shape.state_flags).map(TaskStateFlags)
    }
}
