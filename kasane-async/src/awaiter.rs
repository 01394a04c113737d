//! 中断中のステートマシンが待っている awaiter の推定
//!
//! IL を解析しない限り、どの awaiter フィールドが現在の await に対応するかは分かりません。
//! 同じ型の await はフィールドを共有するためです。次の規則で推定します。
//!
//! 1. 状態が0、または awaiter フィールドが1つだけなら `<>u__1`
//! 2. それ以外は、値の入っている（参照が非null、値型が非ゼロ）最初の `<>u__*` フィールド
//!    （使い終わった awaiter はコンパイラがゼロクリアする）

use crate::schema::TaskSchema;
use kasane_heap::{FieldDef, HeapValue};

/// 推定された awaiter
#[derive(Debug, Clone, Copy)]
pub struct AwaitedObject<'h> {
    pub field: &'h FieldDef,
    /// 参照型ならそのオブジェクト、値型ならステートマシン内のインライン値
    pub value: HeapValue<'h>,
}

impl AwaitedObject<'_> {
    /// インライン値型の awaiter か
    pub fn is_inline(&self) -> bool {
        self.value.is_interior()
    }
}

/// ステートマシンが待っている awaiter を推定する
pub fn guess_awaited_object<'h>(
    state_machine: &HeapValue<'h>,
    await_state: i32,
    schema: &TaskSchema,
) -> Option<AwaitedObject<'h>> {
    let ty = state_machine.ty()?;
    let awaiter_fields = ty
        .fields
        .iter()
        .filter(|f| schema.is_awaiter_field(f))
        .count();

    if await_state == 0 || awaiter_fields == 1 {
        let field = ty.field_by_name(schema.first_awaiter_field)?;
        return awaited_in_field(state_machine, field);
    }

    for field in &ty.fields {
        let named = field
            .name
            .as_deref()
            .is_some_and(|name| name.starts_with(schema.awaiter_prefix));
        if !named {
            continue;
        }

        if field.is_object_reference() {
            let in_use = state_machine
                .read_object_field_def(field)
                .is_some_and(|v| !v.is_null());
            if in_use {
                return awaited_in_field(state_machine, field);
            }
        } else if field.is_value_type() {
            let in_use = state_machine
                .read_value_type_field_def(field)
                .filter(HeapValue::is_valid)
                .and_then(|awaiter| awaiter.read_payload())
                .is_some_and(|bytes| bytes.iter().any(|&b| b != 0));
            if in_use {
                return awaited_in_field(state_machine, field);
            }
        }
    }

    None
}

/// フィールドの値を awaiter として取り出す（型が分からなければNone）
fn awaited_in_field<'h>(state_machine: &HeapValue<'h>, field: &'h FieldDef) -> Option<AwaitedObject<'h>> {
    let value = if field.is_object_reference() {
        state_machine.read_object_field_def(field)?
    } else if field.is_value_type() {
        state_machine.read_value_type_field_def(field)?
    } else {
        return None;
    };
    value.ty()?;
    Some(AwaitedObject { field, value })
}
