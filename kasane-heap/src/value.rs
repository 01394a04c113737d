//! ヒープ上の値（オブジェクトまたはインライン値型）へのビュー
//!
//! フィールド名による読み取りは全て「存在しなければNone」で表現され、失敗として扱いません。

use crate::{Address, FieldDef, HeapSnapshot, HeapType, MemoryReadable};
use std::fmt;

/// ヒープ上の値
///
/// ボックス化されたオブジェクト（先頭にメソッドテーブルポインタを持つ）と、
/// 別のオブジェクトに埋め込まれたインライン値型の両方を表します。
#[derive(Clone, Copy)]
pub struct HeapValue<'h> {
    heap: &'h dyn HeapSnapshot,
    address: Address,
    ty: Option<&'h HeapType>,
    interior: bool,
}

impl<'h> HeapValue<'h> {
    /// アドレスのオブジェクトを参照する（0はnull）
    pub fn object(heap: &'h dyn HeapSnapshot, address: Address) -> Self {
        let ty = if address == 0 {
            None
        } else {
            heap.read_pointer(address)
                .ok()
                .and_then(|mt| heap.get_type(mt))
        };
        Self {
            heap,
            address,
            ty,
            interior: false,
        }
    }

    /// インライン値型を参照する
    pub fn interior(heap: &'h dyn HeapSnapshot, address: Address, ty: Option<&'h HeapType>) -> Self {
        Self {
            heap,
            address,
            ty,
            interior: true,
        }
    }

    pub fn heap(&self) -> &'h dyn HeapSnapshot {
        self.heap
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn ty(&self) -> Option<&'h HeapType> {
        self.ty
    }

    pub fn type_name(&self) -> Option<&'h str> {
        self.ty.map(|t| t.name.as_str())
    }

    /// 型のメソッドテーブル（型不明なら0）
    pub fn method_table(&self) -> Address {
        self.ty.map_or(0, |t| t.method_table)
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    pub fn is_interior(&self) -> bool {
        self.interior
    }

    fn pointer_size(&self) -> u64 {
        self.heap.pointer_size()
    }

    /// 値が読み取り可能か（非null、型が解決済み、内容がメモリ上に存在する）
    pub fn is_valid(&self) -> bool {
        if self.is_null() {
            return false;
        }
        let Some(ty) = self.ty else {
            return false;
        };
        let readable = if self.interior {
            ty.payload_size(self.pointer_size())
        } else {
            // オブジェクトヘッダ（アドレスの手前）を除いた範囲
            self.size().saturating_sub(self.pointer_size())
        };
        self.heap.read(self.address, readable as usize).is_ok()
    }

    /// 値のサイズ（バイト）
    ///
    /// オブジェクトの場合はヘッダを含むサイズ、インライン値型の場合はペイロードサイズです。
    pub fn size(&self) -> u64 {
        let Some(ty) = self.ty else {
            return 0;
        };
        if self.interior {
            return ty.payload_size(self.pointer_size());
        }
        if ty.component_size > 0 {
            let length = self.component_count().unwrap_or(0);
            ty.base_size.saturating_add(length.saturating_mul(ty.component_size))
        } else {
            ty.base_size
        }
    }

    /// 名前でフィールド定義を取得する
    pub fn field(&self, name: &str) -> Option<&'h FieldDef> {
        self.ty?.field_by_name(name)
    }

    /// フィールドの格納アドレスを計算する
    ///
    /// オフセットを足してアドレス空間を越える場合はNoneです。
    pub fn field_address(&self, field: &FieldDef) -> Option<Address> {
        if self.interior {
            self.offset_by(field.offset)
        } else {
            self.offset_by(self.pointer_size())?.checked_add(field.offset)
        }
    }

    fn offset_by(&self, delta: u64) -> Option<Address> {
        self.address.checked_add(delta)
    }

    /// フィールド値を型付きで読み取る
    pub fn read_field<T: MemoryReadable>(&self, name: &str) -> Option<T> {
        let field = self.field(name)?;
        self.read_field_def(field)
    }

    /// フィールド定義を指定して値を読み取る
    pub fn read_field_def<T: MemoryReadable>(&self, field: &FieldDef) -> Option<T> {
        if self.is_null() {
            return None;
        }
        let bytes = self.heap.read(self.field_address(field)?, T::size()).ok()?;
        T::from_le_bytes(&bytes).ok()
    }

    /// ポインタサイズのフィールド値を読み取る
    pub fn read_pointer_field(&self, name: &str) -> Option<Address> {
        let field = self.field(name)?;
        if self.is_null() {
            return None;
        }
        self.heap.read_pointer(self.field_address(field)?).ok()
    }

    /// オブジェクト参照フィールドを読み取る
    ///
    /// フィールドが存在しない場合はNone、nullの場合はnullの値を返します。
    pub fn read_object_field(&self, name: &str) -> Option<HeapValue<'h>> {
        let field = self.field(name)?;
        self.read_object_field_def(field)
    }

    /// フィールド定義を指定してオブジェクト参照を読み取る
    pub fn read_object_field_def(&self, field: &FieldDef) -> Option<HeapValue<'h>> {
        if !field.is_object_reference() || self.is_null() {
            return None;
        }
        let target = self.heap.read_pointer(self.field_address(field)?).ok()?;
        Some(HeapValue::object(self.heap, target))
    }

    /// 有効なオブジェクトを指している場合のみ参照フィールドを返す
    pub fn valid_object_field(&self, name: &str) -> Option<HeapValue<'h>> {
        self.read_object_field(name).filter(HeapValue::is_valid)
    }

    /// インライン値型フィールドを読み取る
    pub fn read_value_type_field(&self, name: &str) -> Option<HeapValue<'h>> {
        let field = self.field(name)?;
        self.read_value_type_field_def(field)
    }

    /// フィールド定義を指定してインライン値型を読み取る
    pub fn read_value_type_field_def(&self, field: &FieldDef) -> Option<HeapValue<'h>> {
        if !field.is_value_type() || self.is_null() {
            return None;
        }
        let ty = field.field_type.and_then(|mt| self.heap.get_type(mt));
        Some(HeapValue::interior(self.heap, self.field_address(field)?, ty))
    }

    /// 文字列フィールドを読み取る
    pub fn read_string_field(&self, name: &str) -> Option<String> {
        self.read_object_field(name)?.as_string()
    }

    /// 文字列オブジェクトの内容を取得する
    pub fn as_string(&self) -> Option<String> {
        if self.is_null() || !self.ty?.is_string() {
            return None;
        }
        let length = self.component_count()?;
        let bytes = self
            .heap
            .read(self.offset_by(self.pointer_size() + 4)?, (length * 2) as usize)
            .ok()?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    }

    /// 配列・文字列の要素数
    fn component_count(&self) -> Option<u64> {
        let bytes = self.heap.read(self.offset_by(self.pointer_size())?, 4).ok()?;
        <u32 as MemoryReadable>::from_le_bytes(&bytes).ok().map(u64::from)
    }

    /// 配列の長さ（配列でなければNone）
    pub fn array_length(&self) -> Option<u64> {
        if self.interior || !self.ty?.is_array() {
            return None;
        }
        self.component_count()
    }

    /// 配列のランク
    pub fn array_rank(&self) -> Option<u32> {
        self.ty.filter(|t| t.is_array()).map(|t| t.rank)
    }

    /// 参照型配列の要素を読み取る
    pub fn array_element(&self, index: u64) -> Option<HeapValue<'h>> {
        let ty = self.ty?;
        let length = self.array_length()?;
        if index >= length {
            return None;
        }
        let element = self.offset_by(index.checked_mul(ty.component_size)?.checked_add(self.pointer_size() * 2)?)?;
        let target = self.heap.read_pointer(element).ok()?;
        Some(HeapValue::object(self.heap, target))
    }

    /// インライン値型のペイロードを生のバイト列で読み取る
    pub fn read_payload(&self) -> Option<Vec<u8>> {
        let ty = self.ty?;
        let size = ty.payload_size(self.pointer_size());
        self.heap.read(self.address, size as usize).ok()
    }
}

impl fmt::Debug for HeapValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapValue")
            .field("address", &format_args!("0x{:x}", self.address))
            .field("type", &self.type_name())
            .field("interior", &self.interior)
            .finish()
    }
}

impl PartialEq for HeapValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.interior == other.interior
    }
}

impl Eq for HeapValue<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementType, HeapBuilder, TypeSpec};

    #[test]
    fn test_field_address_past_address_space() {
        let mut b = HeapBuilder::new();
        let mt = b
            .define_type(
                TypeSpec::value_type("Demo.Pair")
                    .field("a", ElementType::Int32)
                    .field("b", ElementType::Int32),
            )
            .unwrap();
        let heap = b.build();
        let ty = heap.get_type(mt);
        let field = ty.unwrap().field_by_name("b").unwrap();

        let inline = HeapValue::interior(&heap, u64::MAX - 2, ty);
        assert_eq!(inline.field_address(field), None);
        assert_eq!(inline.read_field::<i32>("b"), None);

        let object = HeapValue::object(&heap, u64::MAX - 4);
        assert_eq!(object.field_address(field), None);
        assert_eq!(object.array_length(), None);
    }
}
