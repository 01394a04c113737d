//! ヒープスナップショットのビルダー
//!
//! 型を定義し、オブジェクトを割り当て、フィールドに値を書き込むことで
//! [`InMemoryHeap`] を組み立てます。フィールドのオフセットとオブジェクトサイズは
//! マネージドランタイムのレイアウト規則（ヘッダ、アラインメント）に従って計算されます。

use crate::{
    Address, ElementType, FieldDef, HeapError, HeapType, InMemoryHeap, MemoryImage, MemoryReadable,
    MethodDef, Result, StaticFieldDef,
};
use std::collections::HashMap;

/// ヒープセグメントの先頭アドレス
const HEAP_BASE: Address = 0x0000_0200_0000_1000;
/// 最初に割り当てるメソッドテーブルのアドレス
const METHOD_TABLE_BASE: Address = 0x0000_7ffb_0000_1000;
/// 32bitターゲットでのヒープ領域とメソッドテーブルの先頭
const HEAP_BASE_32: Address = 0x0200_1000;
const METHOD_TABLE_BASE_32: Address = 0x7000_1000;
/// ビルダーが定義する型のモジュールアドレス
const DEFAULT_MODULE: Address = 0x0000_7ffa_0000_0000;

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: Option<String>,
    element_type: ElementType,
    field_type: Option<Address>,
}

/// 型定義の仕様
#[derive(Debug, Clone)]
pub struct TypeSpec {
    name: String,
    base: Option<Address>,
    module: Option<Address>,
    is_value_type: bool,
    component: Option<(ElementType, Option<Address>)>,
    fields: Vec<FieldSpec>,
    static_fields: Vec<StaticFieldDef>,
    methods: Vec<MethodDef>,
}

impl TypeSpec {
    fn new(name: impl Into<String>, is_value_type: bool) -> Self {
        Self {
            name: name.into(),
            base: None,
            module: None,
            is_value_type,
            component: None,
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// 参照型（クラス）
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    /// 値型（構造体）
    pub fn value_type(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    /// 1次元配列型
    pub fn array(name: impl Into<String>, element_type: ElementType, component_type: Option<Address>) -> Self {
        let mut spec = Self::new(name, false);
        spec.component = Some((element_type, component_type));
        spec
    }

    /// 基底型を指定する
    pub fn extends(mut self, base: Address) -> Self {
        self.base = Some(base);
        self
    }

    /// 定義モジュールを指定する
    pub fn module(mut self, module: Address) -> Self {
        self.module = Some(module);
        self
    }

    /// フィールドを追加する
    pub fn field(mut self, name: impl Into<String>, element_type: ElementType) -> Self {
        self.fields.push(FieldSpec {
            name: Some(name.into()),
            element_type,
            field_type: None,
        });
        self
    }

    /// 型が分かっているフィールドを追加する（構造体フィールドでは必須）
    pub fn typed_field(mut self, name: impl Into<String>, element_type: ElementType, field_type: Address) -> Self {
        self.fields.push(FieldSpec {
            name: Some(name.into()),
            element_type,
            field_type: Some(field_type),
        });
        self
    }

    /// 名前のないフィールドを追加する
    pub fn anonymous_field(mut self, element_type: ElementType, field_type: Option<Address>) -> Self {
        self.fields.push(FieldSpec {
            name: None,
            element_type,
            field_type,
        });
        self
    }

    /// メソッドを追加する
    pub fn method(mut self, name: impl Into<String>, native_code: Option<Address>) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            signature: None,
            native_code,
            code_size: 0,
        });
        self
    }

    /// シグネチャとコードサイズ付きでメソッドを追加する
    pub fn method_with_signature(
        mut self,
        name: impl Into<String>,
        signature: impl Into<String>,
        native_code: Address,
        code_size: u64,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.into(),
            signature: Some(signature.into()),
            native_code: Some(native_code),
            code_size,
        });
        self
    }
}

/// ヒープスナップショットのビルダー
pub struct HeapBuilder {
    pointer_size: u64,
    can_walk_heap: bool,
    types: Vec<HeapType>,
    type_index: HashMap<Address, usize>,
    next_method_table: Address,
    memory: MemoryImage,
    heap_base: Address,
    cursor: Address,
    objects: Vec<Address>,
    object_type: Address,
    string_type: Address,
    object_array_type: Address,
}

impl HeapBuilder {
    /// 64bitターゲット用のビルダーを作成する
    pub fn new() -> Self {
        Self::with_pointer_size(8)
    }

    /// ポインタサイズを指定してビルダーを作成する
    ///
    /// `System.Object`、`System.String`、`System.Object[]` は最初から定義されています。
    pub fn with_pointer_size(pointer_size: u64) -> Self {
        let (heap_base, method_table_base) = if pointer_size == 4 {
            (HEAP_BASE_32, METHOD_TABLE_BASE_32)
        } else {
            (HEAP_BASE, METHOD_TABLE_BASE)
        };
        let mut builder = Self {
            pointer_size,
            can_walk_heap: true,
            types: Vec::new(),
            type_index: HashMap::new(),
            next_method_table: method_table_base,
            memory: MemoryImage::new(),
            heap_base,
            cursor: heap_base,
            objects: Vec::new(),
            object_type: 0,
            string_type: 0,
            object_array_type: 0,
        };

        let object_type = builder.insert_type(HeapType {
            name: "System.Object".to_string(),
            method_table: 0,
            module: DEFAULT_MODULE,
            metadata_token: 0,
            base_type: None,
            is_value_type: false,
            base_size: pointer_size * 3,
            component_size: 0,
            component_type: None,
            rank: 0,
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
        });
        let string_type = builder.insert_type(HeapType {
            name: "System.String".to_string(),
            method_table: 0,
            module: DEFAULT_MODULE,
            metadata_token: 0,
            base_type: Some(object_type),
            is_value_type: false,
            base_size: pointer_size * 2 + 6,
            component_size: 2,
            component_type: None,
            rank: 0,
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
        });
        builder.object_type = object_type;
        builder.string_type = string_type;
        // 既定の型定義は失敗しない
        builder.object_array_type = builder
            .define_type(TypeSpec::array("System.Object[]", ElementType::Class, Some(object_type)))
            .unwrap_or_default();
        builder
    }

    pub fn pointer_size(&self) -> u64 {
        self.pointer_size
    }

    /// `System.Object` のメソッドテーブル
    pub fn object_type(&self) -> Address {
        self.object_type
    }

    /// `System.String` のメソッドテーブル
    pub fn string_type(&self) -> Address {
        self.string_type
    }

    /// `System.Object[]` のメソッドテーブル
    pub fn object_array_type(&self) -> Address {
        self.object_array_type
    }

    /// ヒープ走査の可否を設定する
    pub fn set_can_walk_heap(&mut self, can_walk: bool) {
        self.can_walk_heap = can_walk;
    }

    fn insert_type(&mut self, mut ty: HeapType) -> Address {
        let mt = self.next_method_table;
        self.next_method_table += 0x100;
        ty.method_table = mt;
        ty.metadata_token = 0x0200_0001 + self.types.len() as u32;
        self.type_index.insert(mt, self.types.len());
        self.types.push(ty);
        mt
    }

    /// 型情報を取得する
    pub fn get_type(&self, method_table: Address) -> Result<&HeapType> {
        self.type_index
            .get(&method_table)
            .map(|&idx| &self.types[idx])
            .ok_or_else(|| HeapError::UnknownType(method_table).into())
    }

    fn field_size(&self, element_type: ElementType, field_type: Option<Address>) -> Result<u64> {
        if let Some(size) = element_type.primitive_size(self.pointer_size) {
            return Ok(size);
        }
        match (element_type, field_type) {
            (ElementType::Struct, Some(mt)) => Ok(self.get_type(mt)?.payload_size(self.pointer_size).max(1)),
            _ => Ok(self.pointer_size),
        }
    }

    /// 型を定義してメソッドテーブルのアドレスを返す
    pub fn define_type(&mut self, spec: TypeSpec) -> Result<Address> {
        let ptr = self.pointer_size;

        // 基底型のフィールドを引き継ぐ
        let (mut fields, module) = match spec.base {
            Some(base) => {
                let base_ty = self.get_type(base)?;
                (base_ty.fields.clone(), base_ty.module)
            }
            None => (Vec::new(), DEFAULT_MODULE),
        };
        let mut end = fields.iter().map(|f| f.offset + f.size).max().unwrap_or(0);

        for field in &spec.fields {
            let size = self.field_size(field.element_type, field.field_type)?;
            let align = size.next_power_of_two().min(ptr);
            let offset = align_up(end, align);
            end = offset + size;
            fields.push(FieldDef {
                name: field.name.clone(),
                element_type: field.element_type,
                offset,
                size,
                field_type: field.field_type,
            });
        }

        let (base_size, component_size, component_type, rank) = match spec.component {
            Some((element_type, component_type)) => {
                let component_size = self.field_size(element_type, component_type)?;
                (ptr * 3, component_size, component_type, 1)
            }
            None if spec.is_value_type => (ptr * 2 + align_up(end.max(1), ptr), 0, None, 0),
            None => ((ptr * 2 + align_up(end, ptr)).max(ptr * 3), 0, None, 0),
        };

        Ok(self.insert_type(HeapType {
            name: spec.name,
            method_table: 0,
            module: spec.module.unwrap_or(module),
            metadata_token: 0,
            base_type: spec.base.or(Some(self.object_type)).filter(|&b| b != 0),
            is_value_type: spec.is_value_type,
            base_size,
            component_size,
            component_type,
            rank,
            fields,
            static_fields: spec.static_fields,
            methods: spec.methods,
        }))
    }

    /// 静的フィールドの値を設定する
    pub fn set_static(&mut self, method_table: Address, name: &str, element_type: ElementType, value: u64) -> Result<()> {
        let idx = *self
            .type_index
            .get(&method_table)
            .ok_or(HeapError::UnknownType(method_table))?;
        let statics = &mut self.types[idx].static_fields;
        statics.retain(|f| f.name != name);
        statics.push(StaticFieldDef {
            name: name.to_string(),
            element_type,
            value,
        });
        Ok(())
    }

    fn allocate(&mut self, method_table: Address, size: u64) -> Result<Address> {
        let ptr = self.pointer_size;
        let size = align_up(size.max(ptr * 3), ptr);
        // オブジェクトヘッダはアドレスの手前に置かれる
        let address = self.cursor + ptr;
        self.cursor += size;
        self.memory
            .grow_segment(self.heap_base, (self.cursor - self.heap_base) as usize);
        self.memory.write_pointer(address, method_table, ptr)?;
        self.objects.push(address);
        Ok(address)
    }

    /// オブジェクトを割り当てる（全フィールドはゼロ初期化）
    pub fn alloc(&mut self, method_table: Address) -> Result<Address> {
        let ty = self.get_type(method_table)?;
        if ty.is_array() || ty.is_string() {
            return Err(HeapError::InvalidSnapshot(format!(
                "'{}' needs a length; use alloc_array or alloc_string",
                ty.name
            ))
            .into());
        }
        let size = ty.base_size;
        self.allocate(method_table, size)
    }

    /// 配列を割り当てる
    pub fn alloc_array(&mut self, method_table: Address, length: u32) -> Result<Address> {
        let ty = self.get_type(method_table)?;
        if !ty.is_array() {
            return Err(HeapError::NotAnArray(ty.name.clone()).into());
        }
        let size = ty.base_size + u64::from(length) * ty.component_size;
        let address = self.allocate(method_table, size)?;
        self.memory.write_typed(address + self.pointer_size, &length)?;
        Ok(address)
    }

    /// 文字列を割り当てる
    pub fn alloc_string(&mut self, text: &str) -> Result<Address> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let size = self.get_type(self.string_type)?.base_size + units.len() as u64 * 2;
        let address = self.allocate(self.string_type, size)?;
        let ptr = self.pointer_size;
        self.memory.write_typed(address + ptr, &(units.len() as u32))?;
        let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
        self.memory.write(address + ptr + 4, &bytes)?;
        Ok(address)
    }

    /// アドレスを列挙リストにもう一度追加する
    ///
    /// 列挙の重複や、型を持たない不正なアドレスの再現に使います。
    pub fn enumerate_again(&mut self, address: Address) {
        self.objects.push(address);
    }

    /// ドット区切りのフィールドパスを解決し、格納アドレスとフィールド定義を返す
    ///
    /// 例: `"StateMachine.<>1__state"` は構造体フィールド `StateMachine` 内の `<>1__state`
    pub fn field_location(&self, object: Address, path: &str) -> Result<(Address, FieldDef)> {
        let method_table = self.memory.read_pointer(object, self.pointer_size)?;
        let mut ty = self.get_type(method_table)?;
        let mut base = object + self.pointer_size;
        let mut parts = path.split('.').peekable();

        while let Some(name) = parts.next() {
            let field = ty.field_by_name(name).ok_or_else(|| HeapError::UnknownField {
                type_name: ty.name.clone(),
                field: name.to_string(),
            })?;
            let address = base + field.offset;
            if parts.peek().is_none() {
                return Ok((address, field.clone()));
            }
            let nested = field.field_type.filter(|_| field.is_value_type()).ok_or_else(|| {
                HeapError::UnknownField {
                    type_name: ty.name.clone(),
                    field: path.to_string(),
                }
            })?;
            ty = self.get_type(nested)?;
            base = address;
        }

        Err(HeapError::UnknownField {
            type_name: ty.name.clone(),
            field: path.to_string(),
        }
        .into())
    }

    /// 参照フィールドに書き込まれているアドレスを読み取る
    pub fn get_ref(&self, object: Address, path: &str) -> Result<Address> {
        let (address, _) = self.field_location(object, path)?;
        self.memory.read_pointer(address, self.pointer_size)
    }

    /// フィールドに型付き値を書き込む
    pub fn set<T: MemoryReadable>(&mut self, object: Address, path: &str, value: T) -> Result<()> {
        let (address, _) = self.field_location(object, path)?;
        self.memory.write_typed(address, &value)
    }

    /// 参照フィールド（またはポインタ型フィールド）にアドレスを書き込む
    pub fn set_ref(&mut self, object: Address, path: &str, target: Address) -> Result<()> {
        let (address, _) = self.field_location(object, path)?;
        self.memory.write_pointer(address, target, self.pointer_size)
    }

    /// フィールドに生のバイト列を書き込む
    pub fn set_bytes(&mut self, object: Address, path: &str, bytes: &[u8]) -> Result<()> {
        let (address, field) = self.field_location(object, path)?;
        if bytes.len() as u64 > field.size {
            return Err(HeapError::InvalidSnapshot(format!(
                "{} bytes do not fit in field '{}' ({} bytes)",
                bytes.len(),
                path,
                field.size
            ))
            .into());
        }
        self.memory.write(address, bytes)
    }

    /// 参照型配列の要素を書き込む
    pub fn set_element(&mut self, array: Address, index: u32, target: Address) -> Result<()> {
        let ptr = self.pointer_size;
        let method_table = self.memory.read_pointer(array, ptr)?;
        let ty = self.get_type(method_table)?;
        if !ty.is_array() {
            return Err(HeapError::NotAnArray(ty.name.clone()).into());
        }
        let component_size = ty.component_size;
        let length = self.memory.read_typed::<u32>(array + ptr)?;
        if index >= length {
            return Err(HeapError::IndexOutOfRange {
                index: u64::from(index),
                length: u64::from(length),
            }
            .into());
        }
        let element = array + ptr * 2 + u64::from(index) * component_size;
        self.memory.write_pointer(element, target, ptr)
    }

    /// スナップショットを構築する
    pub fn build(self) -> InMemoryHeap {
        InMemoryHeap::new(
            self.pointer_size,
            self.can_walk_heap,
            self.types,
            self.memory,
            self.objects,
        )
    }
}

impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}
