//! ヒープ上の型情報
//!
//! メソッドテーブル単位の型記述（フィールド、静的フィールド、メソッド、基底型）を表します。

use crate::Address;
use serde::{Deserialize, Serialize};

/// フィールドの要素型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    Pointer,
    NativeInt,
    NativeUInt,
    FunctionPointer,
    SZArray,
    Array,
    Struct,
    Object,
    Class,
    Var,
    GenericInstantiation,
    MVar,
    Void,
}

impl ElementType {
    /// オブジェクト参照を格納する要素型か
    pub fn is_object_reference(self) -> bool {
        matches!(
            self,
            ElementType::String
                | ElementType::SZArray
                | ElementType::Array
                | ElementType::Object
                | ElementType::Class
        )
    }

    /// インラインの値型（構造体）か
    pub fn is_value_type(self) -> bool {
        self == ElementType::Struct
    }

    /// プリミティブ要素のサイズ（バイト）
    ///
    /// 構造体や不明な要素型の場合はNone
    pub fn primitive_size(self, pointer_size: u64) -> Option<u64> {
        match self {
            ElementType::Boolean | ElementType::Int8 | ElementType::UInt8 => Some(1),
            ElementType::Char | ElementType::Int16 | ElementType::UInt16 => Some(2),
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float => Some(4),
            ElementType::Int64 | ElementType::UInt64 | ElementType::Double => Some(8),
            ElementType::Pointer
            | ElementType::NativeInt
            | ElementType::NativeUInt
            | ElementType::FunctionPointer => Some(pointer_size),
            t if t.is_object_reference() => Some(pointer_size),
            _ => None,
        }
    }
}

/// インスタンスフィールド定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// フィールド名（メタデータが欠けている場合はNone）
    pub name: Option<String>,
    /// 要素型
    pub element_type: ElementType,
    /// オブジェクトデータ先頭からのオフセット（バイト）
    pub offset: u64,
    /// フィールドのサイズ（バイト）
    pub size: u64,
    /// フィールドの型のメソッドテーブル（分かる場合）
    #[serde(default)]
    pub field_type: Option<Address>,
}

impl FieldDef {
    /// 名前が一致するか
    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }

    pub fn is_object_reference(&self) -> bool {
        self.element_type.is_object_reference()
    }

    pub fn is_value_type(&self) -> bool {
        self.element_type.is_value_type()
    }
}

/// 静的フィールドの値（オブジェクト参照またはプリミティブのビット列）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFieldDef {
    pub name: String,
    pub element_type: ElementType,
    pub value: u64,
}

/// メソッド定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    /// メソッド名
    pub name: String,
    /// シグネチャ（表示用）
    #[serde(default)]
    pub signature: Option<String>,
    /// JIT済みネイティブコードの先頭アドレス
    #[serde(default)]
    pub native_code: Option<Address>,
    /// ネイティブコードのサイズ（バイト）
    #[serde(default)]
    pub code_size: u64,
}

impl MethodDef {
    /// 表示用シグネチャ（無ければメソッド名）
    pub fn display_signature(&self) -> &str {
        self.signature.as_deref().unwrap_or(&self.name)
    }

    /// 命令ポインタがこのメソッドのコードを指しているか
    pub fn contains_ip(&self, ip: Address) -> bool {
        match self.native_code {
            Some(start) if self.code_size == 0 => ip == start,
            Some(start) => ip >= start && ip - start < self.code_size,
            None => false,
        }
    }
}

/// 型情報（メソッドテーブル単位）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapType {
    /// 完全修飾名
    pub name: String,
    /// メソッドテーブルのアドレス（型の識別子）
    pub method_table: Address,
    /// 定義モジュールのアドレス
    #[serde(default)]
    pub module: Address,
    /// メタデータトークン
    #[serde(default)]
    pub metadata_token: u32,
    /// 基底型のメソッドテーブル
    #[serde(default)]
    pub base_type: Option<Address>,
    /// 値型か
    #[serde(default)]
    pub is_value_type: bool,
    /// ボックス化されたインスタンスのサイズ（ヘッダ込み、バイト）
    pub base_size: u64,
    /// 配列要素のサイズ（配列型のみ）
    #[serde(default)]
    pub component_size: u64,
    /// 配列要素の型
    #[serde(default)]
    pub component_type: Option<Address>,
    /// 配列のランク（配列でなければ0）
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub static_fields: Vec<StaticFieldDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl HeapType {
    /// 配列型か
    pub fn is_array(&self) -> bool {
        self.rank > 0
    }

    /// 文字列型か
    pub fn is_string(&self) -> bool {
        self.name == "System.String"
    }

    /// 名前でインスタンスフィールドを検索する
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_named(name))
    }

    /// 名前で静的フィールドを検索する
    pub fn static_field_by_name(&self, name: &str) -> Option<&StaticFieldDef> {
        self.static_fields.iter().find(|f| f.name == name)
    }

    /// 値型のペイロードサイズ（ヘッダを除いたサイズ）
    pub fn payload_size(&self, pointer_size: u64) -> u64 {
        self.base_size.saturating_sub(pointer_size * 2)
    }
}
