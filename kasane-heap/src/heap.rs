//! メモリ上に保持したヒープスナップショット

use crate::{Address, HeapSnapshot, HeapType, MemoryImage, MethodDef, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// メモリ上のヒープスナップショット
///
/// 型テーブル、メモリイメージ、オブジェクト列挙リストから構成されます。
/// 列挙リストには重複が含まれていてもかまいません（一部ランタイムの挙動を再現するため）。
pub struct InMemoryHeap {
    pointer_size: u64,
    can_walk_heap: bool,
    types: HashMap<Address, HeapType>,
    types_by_name: HashMap<String, Address>,
    memory: MemoryImage,
    objects: Vec<Address>,
    /// ネイティブコード先頭アドレス -> (メソッドテーブル, メソッドインデックス)
    code_map: BTreeMap<Address, (Address, usize)>,
}

impl InMemoryHeap {
    /// 構成要素からスナップショットを作成する
    pub fn new(
        pointer_size: u64,
        can_walk_heap: bool,
        types: Vec<HeapType>,
        memory: MemoryImage,
        objects: Vec<Address>,
    ) -> Self {
        let mut code_map = BTreeMap::new();
        for ty in &types {
            for (idx, method) in ty.methods.iter().enumerate() {
                if let Some(start) = method.native_code {
                    code_map.insert(start, (ty.method_table, idx));
                }
            }
        }

        let types_by_name = types
            .iter()
            .map(|t| (t.name.clone(), t.method_table))
            .collect();
        let types: HashMap<_, _> = types.into_iter().map(|t| (t.method_table, t)).collect();

        debug!(
            "InMemoryHeap: {} types, {} objects, {} segments",
            types.len(),
            objects.len(),
            memory.segments().len()
        );

        Self {
            pointer_size,
            can_walk_heap,
            types,
            types_by_name,
            memory,
            objects,
            code_map,
        }
    }

    /// 全ての型を取得する
    pub fn types(&self) -> impl Iterator<Item = &HeapType> {
        self.types.values()
    }

    /// メモリイメージを取得する
    pub fn memory(&self) -> &MemoryImage {
        &self.memory
    }

    /// 列挙リスト（重複を含む）を取得する
    pub fn object_list(&self) -> &[Address] {
        &self.objects
    }
}

impl HeapSnapshot for InMemoryHeap {
    fn can_walk_heap(&self) -> bool {
        self.can_walk_heap
    }

    fn pointer_size(&self) -> u64 {
        self.pointer_size
    }

    fn enumerate_objects(&self) -> Box<dyn Iterator<Item = Address> + '_> {
        Box::new(self.objects.iter().copied())
    }

    fn get_type(&self, method_table: Address) -> Option<&HeapType> {
        self.types.get(&method_table)
    }

    fn type_by_name(&self, name: &str) -> Option<&HeapType> {
        self.types_by_name
            .get(name)
            .and_then(|mt| self.types.get(mt))
    }

    fn read(&self, address: Address, size: usize) -> Result<Vec<u8>> {
        self.memory.read(address, size)
    }

    fn method_by_ip(&self, ip: Address) -> Option<&MethodDef> {
        let (_, &(mt, idx)) = self.code_map.range(..=ip).next_back()?;
        let method = self.types.get(&mt)?.methods.get(idx)?;
        method.contains_ip(ip).then_some(method)
    }
}
