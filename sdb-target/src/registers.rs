//! レジスタバンク
//!
//! 停止中のターゲットの全レジスタ状態をメモリ上にミラーし、書き込み時に
//! 該当領域をカーネルへ反映します。ミラーはカーネルのuserエリアと同じ
//! レイアウト（`libc::user`）なので、カタログのオフセットでそのまま
//! 添字アクセスできます。

use crate::register_info::{
    register_info_by_id, RegisterFormat, RegisterId, RegisterInfo, RegisterType,
};
use crate::types::{f64_to_f80_bytes, RegisterValue};
use crate::Result;
use nix::sys::ptrace;
use nix::unistd::Pid;

/// レジスタのバイト列から構築可能な型
///
/// `read_by_id_as`でレジスタ内容をバイト単位で再解釈するために使います。
pub trait FromRegisterBytes: Sized {
    /// リトルエンディアンのバイト列から値を構築する
    fn from_le_bytes(bytes: &[u8]) -> Result<Self>;
}

macro_rules! impl_from_register_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRegisterBytes for $ty {
                fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
                    let array = bytes.try_into().map_err(|_| {
                        anyhow::anyhow!(
                            "Cannot build {} from {} bytes",
                            stringify!($ty),
                            bytes.len()
                        )
                    })?;
                    Ok(<$ty>::from_le_bytes(array))
                }
            }
        )*
    };
}

impl_from_register_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

macro_rules! impl_from_register_bytes_for_array {
    ($($n:literal),* $(,)?) => {
        $(
            impl FromRegisterBytes for [u8; $n] {
                fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
                    bytes.try_into().map_err(|_| {
                        anyhow::anyhow!("Cannot build {} bytes from {} bytes", $n, bytes.len())
                    })
                }
            }
        )*
    };
}

impl_from_register_bytes_for_array!(8, 10, 16);

/// デバッグ対象プロセスのレジスタミラー
#[derive(Debug)]
pub struct Registers {
    pid: Pid,
    data: libc::user,
}

impl Registers {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            // userエリアはPOD。ゼロ初期化で十分で、ポインタフィールドは
            // 参照しない。
            data: unsafe { std::mem::zeroed() },
        }
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                &self.data as *const libc::user as *const u8,
                std::mem::size_of::<libc::user>(),
            )
        }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                &mut self.data as *mut libc::user as *mut u8,
                std::mem::size_of::<libc::user>(),
            )
        }
    }

    /// 記述子の指すレジスタをミラーから読み出す
    pub fn read(&self, info: &RegisterInfo) -> Result<RegisterValue> {
        let bytes = &self.as_bytes()[info.offset..info.offset + info.size];
        RegisterValue::from_bytes(info.format, info.size, bytes)
    }

    /// IDでレジスタを読み出す
    pub fn read_by_id(&self, id: RegisterId) -> Result<RegisterValue> {
        self.read(register_info_by_id(id)?)
    }

    /// レジスタ内容を指定の型としてバイト単位で再解釈する
    pub fn read_by_id_as<T: FromRegisterBytes>(&self, id: RegisterId) -> Result<T> {
        let info = register_info_by_id(id)?;
        T::from_le_bytes(&self.as_bytes()[info.offset..info.offset + info.size])
    }

    /// 記述子の指すレジスタへ書き込み、該当領域をターゲットへ反映する
    ///
    /// サブレジスタへの書き込みはミラー上の64ビットスロットの下位に
    /// スプライスされるため、フラッシュ後もミラーとカーネルの内容は
    /// 一致します。
    pub fn write(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()> {
        let widened = widen(info, value)?;
        self.as_bytes_mut()[info.offset..info.offset + info.size].copy_from_slice(&widened);
        self.flush(info)
    }

    /// IDでレジスタへ書き込む
    pub fn write_by_id(&mut self, id: RegisterId, value: impl Into<RegisterValue>) -> Result<()> {
        self.write(register_info_by_id(id)?, value.into())
    }

    /// 停止のたびに全レジスタをターゲットから読み直す
    pub(crate) fn read_all(&mut self) -> Result<()> {
        self.data.regs = ptrace::getregs(self.pid)
            .map_err(|e| anyhow::anyhow!("Could not read GPR registers: {}", e.desc()))?;
        self.data.i387 = ptrace::getregset::<ptrace::regset::NT_PRFPREG>(self.pid)
            .map_err(|e| anyhow::anyhow!("Could not read FPR registers: {}", e.desc()))?;
        for i in 0..8 {
            let info = register_info_by_id(RegisterId::dr(i))?;
            let data = ptrace::read_user(self.pid, info.offset as ptrace::AddressType)
                .map_err(|e| anyhow::anyhow!("Could not read debug register: {}", e.desc()))?;
            self.data.u_debugreg[i] = data as u64;
        }
        Ok(())
    }

    fn flush(&mut self, info: &RegisterInfo) -> Result<()> {
        match info.reg_type {
            RegisterType::Fpr => self.write_fprs(),
            RegisterType::Dr => {
                let bytes = &self.as_bytes()[info.offset..info.offset + 8];
                let value = u64::from_le_bytes(bytes.try_into().unwrap());
                self.write_user_area(info.offset, value)
            }
            RegisterType::Gpr | RegisterType::SubGpr => self.write_gprs(),
        }
    }

    fn write_gprs(&self) -> Result<()> {
        ptrace::setregs(self.pid, self.data.regs)
            .map_err(|e| anyhow::anyhow!("Could not write general purpose registers: {}", e.desc()))
    }

    fn write_fprs(&self) -> Result<()> {
        ptrace::setregset::<ptrace::regset::NT_PRFPREG>(self.pid, self.data.i387)
            .map_err(|e| anyhow::anyhow!("Could not write floating point registers: {}", e.desc()))
    }

    fn write_user_area(&self, offset: usize, data: u64) -> Result<()> {
        ptrace::write_user(self.pid, offset as ptrace::AddressType, data as i64)
            .map_err(|e| anyhow::anyhow!("Could not write to user area: {}", e.desc()))
    }
}

/// 値を記述子のサイズまで拡張したバイト列を作る
///
/// 符号付き整数は符号拡張、それ以外はゼロ拡張します。st*への浮動小数点の
/// 書き込みは80ビット拡張形式へ変換してから格納します。
fn widen(info: &RegisterInfo, value: RegisterValue) -> Result<Vec<u8>> {
    let value = match (info.format, value) {
        (RegisterFormat::LongDouble, RegisterValue::F32(v)) => {
            RegisterValue::LongDouble(f64_to_f80_bytes(v as f64))
        }
        (RegisterFormat::LongDouble, RegisterValue::F64(v)) => {
            RegisterValue::LongDouble(f64_to_f80_bytes(v))
        }
        (_, value) => value,
    };
    if value.byte_width() > info.size {
        return Err(anyhow::anyhow!(
            "Register value is too large for {}",
            info.name
        ));
    }
    let fill = match value {
        RegisterValue::I8(v) if v < 0 => 0xff,
        RegisterValue::I16(v) if v < 0 => 0xff,
        RegisterValue::I32(v) if v < 0 => 0xff,
        RegisterValue::I64(v) if v < 0 => 0xff,
        _ => 0x00,
    };
    let mut bytes = value.as_bytes();
    bytes.resize(info.size, fill);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_info::register_info_by_name;

    #[test]
    fn test_widen_zero_extends_unsigned() {
        let info = register_info_by_name("mm0").unwrap();
        let bytes = widen(info, RegisterValue::U32(0xba5eba11)).unwrap();
        assert_eq!(bytes, vec![0x11, 0xba, 0x5e, 0xba, 0, 0, 0, 0]);
    }

    #[test]
    fn test_widen_sign_extends_signed() {
        let info = register_info_by_name("rax").unwrap();
        let bytes = widen(info, RegisterValue::I8(-2)).unwrap();
        assert_eq!(bytes, vec![0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_widen_converts_floats_for_st_registers() {
        let info = register_info_by_name("st0").unwrap();
        let bytes = widen(info, RegisterValue::F64(42.24)).unwrap();
        assert_eq!(bytes, f64_to_f80_bytes(42.24).to_vec());
    }

    #[test]
    fn test_widen_rejects_oversized_values() {
        let info = register_info_by_name("al").unwrap();
        assert!(widen(info, RegisterValue::U64(1)).is_err());
    }

    #[test]
    fn test_read_zeroed_bank() {
        let regs = Registers::new(Pid::from_raw(0));
        let value = regs.read_by_id(RegisterId::Rsi).unwrap();
        assert_eq!(value, RegisterValue::U64(0));
        let st0: [u8; 10] = regs.read_by_id_as(RegisterId::St0).unwrap();
        assert_eq!(st0, [0u8; 10]);
    }
}
