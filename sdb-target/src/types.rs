//! 基本型定義
//!
//! 仮想アドレス、プロセス状態、停止理由、レジスタ値などの
//! ターゲット制御全体で共有される型を提供します。

use crate::register_info::RegisterFormat;
use crate::Result;
use nix::sys::wait::WaitStatus;

/// ターゲットプロセス内の仮想アドレス
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// 仮想アドレスを作成する
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// アドレス値を取得する
    pub fn addr(self) -> u64 {
        self.0
    }
}

impl From<u64> for VirtAddr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl std::ops::Add<i64> for VirtAddr {
    type Output = VirtAddr;

    fn add(self, rhs: i64) -> Self::Output {
        VirtAddr(self.0.wrapping_add_signed(rhs))
    }
}

impl std::ops::Sub<i64> for VirtAddr {
    type Output = VirtAddr;

    fn sub(self, rhs: i64) -> Self::Output {
        VirtAddr(self.0.wrapping_add_signed(-rhs))
    }
}

impl std::fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// デバッグ対象プロセスの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Stopped,
    Exited,
    Terminated,
}

/// waitpidのステータスから復元した停止理由
///
/// `Exited`の場合は`info`が終了ステータス、`Terminated`と`Stopped`の場合は
/// シグナル番号を保持します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReason {
    pub reason: ProcessState,
    pub info: i32,
}

impl StopReason {
    /// waitステータスをデコードする
    pub fn from_wait_status(status: WaitStatus) -> Result<Self> {
        match status {
            WaitStatus::Exited(_, code) => Ok(Self {
                reason: ProcessState::Exited,
                info: code,
            }),
            WaitStatus::Signaled(_, signal, _) => Ok(Self {
                reason: ProcessState::Terminated,
                info: signal as i32,
            }),
            WaitStatus::Stopped(_, signal) => Ok(Self {
                reason: ProcessState::Stopped,
                info: signal as i32,
            }),
            WaitStatus::PtraceEvent(_, signal, _) => Ok(Self {
                reason: ProcessState::Stopped,
                info: signal as i32,
            }),
            status => Err(anyhow::anyhow!("Unexpected wait status: {:?}", status)),
        }
    }
}

/// レジスタ値
///
/// レジスタの読み書きで使用するタグ付きの値です。80ビット拡張倍精度は
/// Rustに対応する浮動小数点型がないため、パックした10バイト列として
/// 保持します（バイト単位の往復変換のみを保証します）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    LongDouble([u8; 10]),
    Byte64([u8; 8]),
    Byte128([u8; 16]),
}

impl RegisterValue {
    /// 値のバイト幅を取得する
    pub fn byte_width(&self) -> usize {
        match self {
            Self::U8(_) | Self::I8(_) => 1,
            Self::U16(_) | Self::I16(_) => 2,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 4,
            Self::U64(_) | Self::I64(_) | Self::F64(_) | Self::Byte64(_) => 8,
            Self::LongDouble(_) => 10,
            Self::Byte128(_) => 16,
        }
    }

    /// リトルエンディアンのバイト列に変換する
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Self::U8(v) => v.to_le_bytes().to_vec(),
            Self::U16(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::U64(v) => v.to_le_bytes().to_vec(),
            Self::I8(v) => v.to_le_bytes().to_vec(),
            Self::I16(v) => v.to_le_bytes().to_vec(),
            Self::I32(v) => v.to_le_bytes().to_vec(),
            Self::I64(v) => v.to_le_bytes().to_vec(),
            Self::F32(v) => v.to_le_bytes().to_vec(),
            Self::F64(v) => v.to_le_bytes().to_vec(),
            Self::LongDouble(v) => v.to_vec(),
            Self::Byte64(v) => v.to_vec(),
            Self::Byte128(v) => v.to_vec(),
        }
    }

    /// バイト列から表示フォーマットとサイズに対応する値を復元する
    pub fn from_bytes(format: RegisterFormat, size: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != size {
            return Err(anyhow::anyhow!(
                "Cannot build a {} byte register value from {} bytes",
                size,
                bytes.len()
            ));
        }
        let value = match (format, size) {
            (RegisterFormat::Uint, 1) => Self::U8(bytes[0]),
            (RegisterFormat::Uint, 2) => Self::U16(u16::from_le_bytes(bytes.try_into()?)),
            (RegisterFormat::Uint, 4) => Self::U32(u32::from_le_bytes(bytes.try_into()?)),
            (RegisterFormat::Uint, 8) => Self::U64(u64::from_le_bytes(bytes.try_into()?)),
            (RegisterFormat::DoubleFloat, 4) => Self::F32(f32::from_le_bytes(bytes.try_into()?)),
            (RegisterFormat::DoubleFloat, 8) => Self::F64(f64::from_le_bytes(bytes.try_into()?)),
            (RegisterFormat::LongDouble, 10) => Self::LongDouble(bytes.try_into()?),
            (RegisterFormat::Vector, 8) => Self::Byte64(bytes.try_into()?),
            (RegisterFormat::Vector, 16) => Self::Byte128(bytes.try_into()?),
            (format, size) => {
                return Err(anyhow::anyhow!(
                    "Unsupported register format {:?} with size {}",
                    format,
                    size
                ))
            }
        };
        Ok(value)
    }
}

impl std::fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn join_bytes(f: &mut std::fmt::Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
            write!(f, "[")?;
            for (i, byte) in bytes.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{:#04x}", byte)?;
            }
            write!(f, "]")
        }

        match self {
            Self::U8(v) => write!(f, "{:#04x}", v),
            Self::U16(v) => write!(f, "{:#06x}", v),
            Self::U32(v) => write!(f, "{:#010x}", v),
            Self::U64(v) => write!(f, "{:#018x}", v),
            Self::I8(v) => write!(f, "{:#04x}", v),
            Self::I16(v) => write!(f, "{:#06x}", v),
            Self::I32(v) => write!(f, "{:#010x}", v),
            Self::I64(v) => write!(f, "{:#018x}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::LongDouble(v) => write!(f, "{}", f80_bytes_to_f64(v)),
            Self::Byte64(v) => join_bytes(f, v),
            Self::Byte128(v) => join_bytes(f, v),
        }
    }
}

macro_rules! impl_from_for_register_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for RegisterValue {
                fn from(value: $ty) -> Self {
                    RegisterValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_register_value! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    [u8; 10] => LongDouble,
    [u8; 8] => Byte64,
    [u8; 16] => Byte128,
}

/// f64をx87の80ビット拡張倍精度表現に変換する
///
/// 符号1ビット・指数15ビット・明示的な整数ビットを含む仮数64ビットを
/// リトルエンディアンの10バイト列にパックします。f64で表現可能な値は
/// 変換で情報を失いません。
pub fn f64_to_f80_bytes(value: f64) -> [u8; 10] {
    let bits = value.to_bits();
    let sign = ((bits >> 63) & 1) as u16;
    let exp = ((bits >> 52) & 0x7ff) as u32;
    let frac = bits & ((1u64 << 52) - 1);

    let (biased, mantissa) = if exp == 0 {
        if frac == 0 {
            (0u16, 0u64)
        } else {
            // 非正規化数は拡張形式では正規化して表現できる
            let lz = frac.leading_zeros();
            ((15372 - lz) as u16, frac << lz)
        }
    } else if exp == 0x7ff {
        let payload = if frac == 0 { 0 } else { frac << 11 };
        (0x7fff, (1u64 << 63) | payload)
    } else {
        ((exp - 1023 + 16383) as u16, (1u64 << 63) | (frac << 11))
    };

    let mut bytes = [0u8; 10];
    bytes[..8].copy_from_slice(&mantissa.to_le_bytes());
    bytes[8..].copy_from_slice(&((sign << 15) | biased).to_le_bytes());
    bytes
}

/// 80ビット拡張倍精度表現をf64に変換する
///
/// f64で表現できない下位ビットは切り捨てます。
pub fn f80_bytes_to_f64(bytes: &[u8; 10]) -> f64 {
    let mantissa = u64::from_le_bytes(bytes[..8].try_into().unwrap());
    let se = u16::from_le_bytes(bytes[8..].try_into().unwrap());
    let sign = ((se >> 15) & 1) as u64;
    let exp = (se & 0x7fff) as i64;

    if mantissa == 0 {
        return f64::from_bits(sign << 63);
    }
    if exp == 0x7fff {
        let frac = (mantissa << 1) >> 12;
        let bits = (sign << 63) | (0x7ffu64 << 52) | frac;
        return f64::from_bits(bits);
    }

    // 整数ビットが立っていない表現も正規化してから変換する
    let lz = mantissa.leading_zeros() as i64;
    let mantissa = mantissa << lz;
    let d_exp = exp - lz - 16383 + 1023;

    let bits = if d_exp >= 0x7ff {
        (sign << 63) | (0x7ffu64 << 52)
    } else if d_exp > 0 {
        let frac = (mantissa >> 11) & ((1u64 << 52) - 1);
        (sign << 63) | ((d_exp as u64) << 52) | frac
    } else {
        // f64の非正規化数に落ちる範囲
        let shift = 12 - d_exp;
        let frac = if shift >= 64 { 0 } else { mantissa >> shift };
        (sign << 63) | frac
    };
    f64::from_bits(bits)
}
