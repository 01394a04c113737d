//! フレームのフィールド一覧（`--fields`）

use super::TAB_WIDTH;
use crate::output::Printer;
use crate::Result;
use kasane_heap::{Address, ElementType, FieldDef, HeapValue};

const TYPE_WIDTH: usize = 32;
const VALUE_WIDTH: usize = 16;

/// 値のインスタンスフィールドを1行ずつ出力する
///
/// 型の分からないフィールドは出力しません。
pub fn render_fields(printer: &mut Printer<'_>, value: &HeapValue<'_>, depth: usize) -> Result<()> {
    let Some(ty) = value.ty() else {
        return Ok(());
    };
    let indent = " ".repeat(depth * TAB_WIDTH);

    printer.write_header_line(&format!(
        "{}{:>16} {:>16} {:<32} {:>16} Name",
        indent, "Address", "MT", "Type", "Value"
    ))?;
    for field in &ty.fields {
        let Some((method_table, type_name)) = field_type(value, field) else {
            continue;
        };

        printer.write(&indent)?;
        if field.is_object_reference() {
            let target = value.read_object_field_def(field).map_or(0, |v| v.address());
            printer.write_address(target, false)?;
        } else {
            printer.write_value_type_address(value.field_address(field).unwrap_or_default(), method_table)?;
        }
        printer.write(" ")?;
        printer.write_method_table(method_table, false)?;
        printer.write_line(&format!(
            " {:<32} {:>16} {}",
            truncate(&type_name, TYPE_WIDTH),
            truncate(&display_value(value, field), VALUE_WIDTH),
            field.name.as_deref().unwrap_or_default()
        ))?;
    }
    Ok(())
}

/// フィールドの型のメソッドテーブルと名前
///
/// 型情報が無いプリミティブはメソッドテーブル0と組み込みの型名で表します。
fn field_type(value: &HeapValue<'_>, field: &FieldDef) -> Option<(Address, String)> {
    match field.field_type.and_then(|mt| value.heap().get_type(mt)) {
        Some(ty) => Some((ty.method_table, ty.name.clone())),
        None => primitive_type_name(field.element_type).map(|name| (0, name.to_string())),
    }
}

fn primitive_type_name(element_type: ElementType) -> Option<&'static str> {
    let name = match element_type {
        ElementType::Boolean => "System.Boolean",
        ElementType::Char => "System.Char",
        ElementType::Int8 => "System.SByte",
        ElementType::UInt8 => "System.Byte",
        ElementType::Int16 => "System.Int16",
        ElementType::UInt16 => "System.UInt16",
        ElementType::Int32 => "System.Int32",
        ElementType::UInt32 => "System.UInt32",
        ElementType::Int64 => "System.Int64",
        ElementType::UInt64 => "System.UInt64",
        ElementType::Float => "System.Single",
        ElementType::Double => "System.Double",
        ElementType::String => "System.String",
        ElementType::NativeInt => "System.IntPtr",
        ElementType::NativeUInt => "System.UIntPtr",
        ElementType::Object => "System.Object",
        _ => return None,
    };
    Some(name)
}

/// 要素型に応じたフィールド値の表示
pub fn display_value(value: &HeapValue<'_>, field: &FieldDef) -> String {
    if field.name.is_none() {
        return "(unknown)".to_string();
    }
    let heap = value.heap();
    let hex = |address: Address| {
        if heap.pointer_size() == 8 {
            format!("{:016x}", address)
        } else {
            format!("{:08x}", address)
        }
    };

    match field.element_type {
        ElementType::Boolean => {
            let flag = value.read_field_def::<bool>(field).unwrap_or_default();
            if flag { "true" } else { "false" }.to_string()
        }
        ElementType::Char => {
            let unit = value.read_field_def::<u16>(field).unwrap_or_default();
            match char::from_u32(u32::from(unit)) {
                Some(c) if (32..127).contains(&unit) => format!("'{}'", c),
                _ => format!("'\\u{:04X}'", unit),
            }
        }
        ElementType::Int8 => value.read_field_def::<i8>(field).unwrap_or_default().to_string(),
        ElementType::UInt8 => value.read_field_def::<u8>(field).unwrap_or_default().to_string(),
        ElementType::Int16 => value.read_field_def::<i16>(field).unwrap_or_default().to_string(),
        ElementType::UInt16 => value.read_field_def::<u16>(field).unwrap_or_default().to_string(),
        ElementType::Int32 => value.read_field_def::<i32>(field).unwrap_or_default().to_string(),
        ElementType::UInt32 => value.read_field_def::<u32>(field).unwrap_or_default().to_string(),
        ElementType::Int64 => value.read_field_def::<i64>(field).unwrap_or_default().to_string(),
        ElementType::UInt64 => value.read_field_def::<u64>(field).unwrap_or_default().to_string(),
        ElementType::Float => value.read_field_def::<f32>(field).unwrap_or_default().to_string(),
        ElementType::Double => value.read_field_def::<f64>(field).unwrap_or_default().to_string(),
        ElementType::String => {
            let text = value
                .read_object_field_def(field)
                .and_then(|s| s.as_string())
                .unwrap_or_default();
            format!("\"{}\"", text)
        }
        ElementType::Pointer
        | ElementType::NativeInt
        | ElementType::NativeUInt
        | ElementType::FunctionPointer => {
            let pointer = value
                .field_address(field)
                .and_then(|address| heap.read_pointer(address).ok())
                .unwrap_or_default();
            hex(pointer)
        }
        ElementType::SZArray => match value.read_object_field_def(field).filter(|a| !a.is_null()) {
            Some(array) => {
                let component = array
                    .ty()
                    .and_then(|t| t.component_type)
                    .and_then(|mt| heap.get_type(mt))
                    .map_or("unknown", |t| t.name.as_str());
                format!("{}[{}]", component, array.array_length().unwrap_or_default())
            }
            None => "null".to_string(),
        },
        ElementType::Struct => hex(value.field_address(field).unwrap_or_default()),
        ElementType::Array | ElementType::Object | ElementType::Class => {
            match value.read_object_field_def(field).filter(|o| !o.is_null()) {
                Some(object) => hex(object.address()),
                None => "null".to_string(),
            }
        }
        ElementType::Var => "(var)".to_string(),
        ElementType::GenericInstantiation => "(generic instantiation)".to_string(),
        ElementType::MVar => "(mvar)".to_string(),
        ElementType::Void => "(void)".to_string(),
    }
}

/// 長すぎる文字列を先頭 `...` で切り詰める（末尾を残す）
pub fn truncate(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let tail: String = text.chars().skip(count - keep).collect();
    format!("...{}", tail)
}
