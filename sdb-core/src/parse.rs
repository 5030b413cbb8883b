//! パース関連のユーティリティ関数
//!
//! 対話シェルの入力をレジスタ値やアドレスへ変換します。レジスタ値の
//! テキスト形式は`RegisterValue`の`Display`実装と往復可能です。

use crate::Result;
use sdb_target::{f64_to_f80_bytes, RegisterFormat, RegisterInfo, RegisterValue};

fn invalid_format() -> anyhow::Error {
    anyhow::anyhow!("Invalid format")
}

/// 記述子のフォーマットとサイズに従ってレジスタ値をパースする
///
/// uintは16進（"0x"プレフィックスは任意）、double/long doubleは10進の
/// 浮動小数点、vectorは`[0xNN,0xNN,…]`形式でちょうど記述子のサイズ分の
/// バイトを要求します。
pub fn parse_register_value(info: &RegisterInfo, text: &str) -> Result<RegisterValue> {
    match info.format {
        RegisterFormat::Uint => {
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            match info.size {
                1 => u8::from_str_radix(digits, 16)
                    .map(RegisterValue::U8)
                    .map_err(|_| invalid_format()),
                2 => u16::from_str_radix(digits, 16)
                    .map(RegisterValue::U16)
                    .map_err(|_| invalid_format()),
                4 => u32::from_str_radix(digits, 16)
                    .map(RegisterValue::U32)
                    .map_err(|_| invalid_format()),
                8 => u64::from_str_radix(digits, 16)
                    .map(RegisterValue::U64)
                    .map_err(|_| invalid_format()),
                _ => Err(invalid_format()),
            }
        }
        RegisterFormat::DoubleFloat => text
            .parse::<f64>()
            .map(RegisterValue::F64)
            .map_err(|_| invalid_format()),
        RegisterFormat::LongDouble => text
            .parse::<f64>()
            .map(|value| RegisterValue::LongDouble(f64_to_f80_bytes(value)))
            .map_err(|_| invalid_format()),
        RegisterFormat::Vector => match info.size {
            8 => parse_vector::<8>(text).map(RegisterValue::Byte64),
            16 => parse_vector::<16>(text).map(RegisterValue::Byte128),
            _ => Err(invalid_format()),
        },
    }
}

/// `[0xNN,0xNN,…]`形式のバイト列をパースする
///
/// ちょうど`N`バイトでない入力は失敗します。
pub fn parse_vector<const N: usize>(text: &str) -> Result<[u8; N]> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(invalid_format)?;

    let mut bytes = [0u8; N];
    let mut count = 0;
    for (i, part) in inner.split(',').enumerate() {
        if i >= N {
            return Err(invalid_format());
        }
        let digits = part.trim().strip_prefix("0x").ok_or_else(invalid_format)?;
        bytes[i] = u8::from_str_radix(digits, 16).map_err(|_| invalid_format())?;
        count = i + 1;
    }
    if count != N {
        return Err(invalid_format());
    }
    Ok(bytes)
}

/// ブレークポイントのアドレスをパースする
///
/// "0x"プレフィックス付きの16進のみ受け付けます。
pub fn parse_address(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x")?;
    u64::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdb_target::REGISTER_INFOS;

    #[test]
    fn test_parse_format_round_trip() {
        // カタログの全(フォーマット, サイズ)の組で format ∘ parse が恒等になる
        for info in REGISTER_INFOS {
            let value = match (info.format, info.size) {
                (RegisterFormat::Uint, 1) => RegisterValue::U8(0xa5),
                (RegisterFormat::Uint, 2) => RegisterValue::U16(0xa55a),
                (RegisterFormat::Uint, 4) => RegisterValue::U32(0xdeadbeef),
                (RegisterFormat::Uint, 8) => RegisterValue::U64(0xcafecafe_15ca1ab1),
                (RegisterFormat::DoubleFloat, 8) => RegisterValue::F64(42.24),
                (RegisterFormat::LongDouble, 10) => {
                    RegisterValue::LongDouble(f64_to_f80_bytes(42.24))
                }
                (RegisterFormat::Vector, 8) => {
                    RegisterValue::Byte64([0x11, 0xba, 0x5e, 0xba, 0, 1, 2, 0xff])
                }
                (RegisterFormat::Vector, 16) => RegisterValue::Byte128([0x42; 16]),
                (format, size) => panic!("unexpected descriptor {:?}/{}", format, size),
            };
            let text = value.to_string();
            let parsed = parse_register_value(info, &text).unwrap();
            assert_eq!(parsed, value, "register {} (text {})", info.name, text);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let rax = sdb_target::register_info_by_name("rax").unwrap();
        assert_eq!(
            parse_register_value(rax, "pumpkin").unwrap_err().to_string(),
            "Invalid format"
        );
        let xmm0 = sdb_target::register_info_by_name("xmm0").unwrap();
        assert!(parse_register_value(xmm0, "[0x01]").is_err());
        assert!(parse_register_value(xmm0, "0x01").is_err());
        let st0 = sdb_target::register_info_by_name("st0").unwrap();
        assert!(parse_register_value(st0, "one point five").is_err());
    }

    #[test]
    fn test_parse_vector_requires_exact_width() {
        assert!(parse_vector::<8>("[0x00,0x01,0x02,0x03,0x04,0x05,0x06,0x07]").is_ok());
        assert!(parse_vector::<8>("[0x00,0x01]").is_err());
        assert!(parse_vector::<8>("[0x00,0x01,0x02,0x03,0x04,0x05,0x06,0x07,0x08]").is_err());
        assert!(parse_vector::<8>("0x00,0x01,0x02,0x03,0x04,0x05,0x06,0x07").is_err());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0xcafe"), Some(0xcafe));
        assert_eq!(parse_address("cafe"), None);
        assert_eq!(parse_address("0xzz"), None);
    }
}
