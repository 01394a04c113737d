//! ユーザー指定の絞り込み条件

use kasane_heap::{Address, HeapValue};

/// オブジェクトの絞り込み条件（`--address`、`--methodtable`、`--type`）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFilter {
    pub address: Option<Address>,
    pub method_table: Option<Address>,
    /// 型名に含まれる部分文字列（大文字小文字を区別する）
    pub type_substring: Option<String>,
}

impl ObjectFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_method_table(mut self, method_table: Address) -> Self {
        self.method_table = Some(method_table);
        self
    }

    pub fn with_type(mut self, substring: impl Into<String>) -> Self {
        self.type_substring = Some(substring.into());
        self
    }

    /// 条件が何も指定されていないか
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.method_table.is_none() && self.type_substring.is_none()
    }

    /// オブジェクトが条件を満たすか
    ///
    /// 型が分からないオブジェクトには型に関する条件を適用しません。
    pub fn matches(&self, value: &HeapValue<'_>) -> bool {
        if self.address.is_some_and(|a| a != value.address()) {
            return false;
        }
        if let Some(ty) = value.ty() {
            if self.method_table.is_some_and(|mt| mt != ty.method_table) {
                return false;
            }
            if let Some(substring) = &self.type_substring {
                if !ty.name.contains(substring.as_str()) {
                    return false;
                }
            }
        }
        true
    }
}
