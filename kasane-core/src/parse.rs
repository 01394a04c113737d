//! パース関連のユーティリティ関数

use anyhow::Result;

/// アドレス文字列をu64にパース
///
/// デバッガの慣習に従い、プレフィックスの無い数値は16進数として扱います。
/// `0n` プレフィックスは10進数、`0x` は16進数です。`00007ff0`1234` のような
/// バッククォート区切りも受け付けます。
///
/// # Examples
/// ```
/// use kasane_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("0n1234").unwrap(), 1234);
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let trimmed = s.trim();
    let cleaned: String = trimmed.chars().filter(|&c| c != '`').collect();

    if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", trimmed, e))
    } else if let Some(dec) = cleaned.strip_prefix("0n").or_else(|| cleaned.strip_prefix("0N")) {
        dec.parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid decimal address '{}': {}", trimmed, e))
    } else {
        u64::from_str_radix(&cleaned, 16)
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", trimmed, e))
    }
}
