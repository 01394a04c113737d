//! メモリイメージ（スナップショット内のバイト列）へのアクセス

use crate::{Address, HeapError, Result};
use serde::{Deserialize, Serialize};

/// メモリから読み取り可能な型
pub trait MemoryReadable: Sized {
    /// バイト配列から値を構築
    fn from_le_bytes(bytes: &[u8]) -> Result<Self>;

    /// リトルエンディアンバイト配列に変換
    fn to_le_bytes(&self) -> Vec<u8>;

    /// 型のサイズ（バイト数）
    fn size() -> usize;
}

macro_rules! impl_memory_readable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl MemoryReadable for $ty {
                fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
                    let array: [u8; std::mem::size_of::<$ty>()] = bytes.try_into().map_err(|_| {
                        HeapError::ShortRead {
                            type_name: stringify!($ty),
                            expected: std::mem::size_of::<$ty>(),
                            actual: bytes.len(),
                        }
                    })?;
                    Ok(<$ty>::from_le_bytes(array))
                }

                fn to_le_bytes(&self) -> Vec<u8> {
                    (*self).to_le_bytes().to_vec()
                }

                fn size() -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )+
    };
}

impl_memory_readable!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl MemoryReadable for bool {
    fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [b] => Ok(*b != 0),
            _ => Err(HeapError::ShortRead {
                type_name: "bool",
                expected: 1,
                actual: bytes.len(),
            }
            .into()),
        }
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn size() -> usize {
        1
    }
}

/// 連続したメモリ領域
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 先頭アドレス
    pub base: Address,
    /// 領域の内容
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

impl Segment {
    /// 終端アドレス（この値自体は含まない）
    ///
    /// アドレス空間の終わりを越えるセグメントではNoneです。
    pub fn end(&self) -> Option<Address> {
        self.base.checked_add(self.bytes.len() as u64)
    }

    fn contains(&self, address: Address, size: usize) -> bool {
        let (Some(end), Some(segment_end)) = (address.checked_add(size as u64), self.end()) else {
            return false;
        };
        address >= self.base && end <= segment_end
    }
}

/// スナップショットのメモリイメージ
///
/// セグメントは先頭アドレス順に保持され、重なりは許されません。
/// 読み取りは1つのセグメント内に収まる範囲に限られます。
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    segments: Vec<Segment>,
}

impl MemoryImage {
    /// 空のメモリイメージを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// セグメント列からメモリイメージを作成する
    pub fn from_segments(mut segments: Vec<Segment>) -> Result<Self> {
        segments.sort_by_key(|s| s.base);
        let mut previous_end: Option<Address> = None;
        for segment in &segments {
            let Some(end) = segment.end() else {
                return Err(HeapError::InvalidSnapshot(format!(
                    "segment at 0x{:x} with {} bytes exceeds the address space",
                    segment.base,
                    segment.bytes.len()
                ))
                .into());
            };
            if previous_end.is_some_and(|prev| prev > segment.base) {
                return Err(HeapError::OverlappingSegments(segment.base).into());
            }
            previous_end = Some(end);
        }
        Ok(Self { segments })
    }

    /// 全セグメントを取得する
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn segment_for(&self, address: Address, size: usize) -> Option<usize> {
        let idx = match self.segments.binary_search_by_key(&address, |s| s.base) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        self.segments[idx].contains(address, size).then_some(idx)
    }

    /// 指定範囲が読み取り可能か
    pub fn is_mapped(&self, address: Address, size: usize) -> bool {
        self.segment_for(address, size).is_some()
    }

    /// メモリからデータを読み取る
    pub fn read(&self, address: Address, size: usize) -> Result<Vec<u8>> {
        let idx = self
            .segment_for(address, size)
            .ok_or(HeapError::Unmapped { address, size })?;
        let segment = &self.segments[idx];
        let start = (address - segment.base) as usize;
        Ok(segment.bytes[start..start + size].to_vec())
    }

    /// 型付き値を読み取る（ジェネリック版）
    pub fn read_typed<T: MemoryReadable>(&self, address: Address) -> Result<T> {
        let bytes = self.read(address, T::size())?;
        T::from_le_bytes(&bytes)
    }

    /// ポインタサイズの値を読み取る
    pub fn read_pointer(&self, address: Address, pointer_size: u64) -> Result<Address> {
        match pointer_size {
            8 => self.read_typed::<u64>(address),
            4 => self.read_typed::<u32>(address).map(u64::from),
            other => Err(HeapError::UnsupportedPointerSize(other).into()),
        }
    }

    /// メモリにデータを書き込む
    pub fn write(&mut self, address: Address, data: &[u8]) -> Result<()> {
        let idx = self.segment_for(address, data.len()).ok_or(HeapError::Unmapped {
            address,
            size: data.len(),
        })?;
        let segment = &mut self.segments[idx];
        let start = (address - segment.base) as usize;
        segment.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// 型付き値を書き込む（ジェネリック版）
    pub fn write_typed<T: MemoryReadable>(&mut self, address: Address, value: &T) -> Result<()> {
        self.write(address, &value.to_le_bytes())
    }

    /// ポインタサイズの値を書き込む
    pub fn write_pointer(&mut self, address: Address, value: Address, pointer_size: u64) -> Result<()> {
        match pointer_size {
            8 => self.write_typed(address, &value),
            4 => self.write_typed(address, &(value as u32)),
            other => Err(HeapError::UnsupportedPointerSize(other).into()),
        }
    }

    /// 指定セグメントを末尾方向へ拡張する
    pub(crate) fn grow_segment(&mut self, base: Address, new_len: usize) {
        if let Some(segment) = self.segments.iter_mut().find(|s| s.base == base) {
            if segment.bytes.len() < new_len {
                segment.bytes.resize(new_len, 0);
            }
        } else {
            self.segments.push(Segment {
                base,
                bytes: vec![0; new_len],
            });
            self.segments.sort_by_key(|s| s.base);
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
