//! レジスタカタログ
//!
//! x86-64の全レジスタの静的な記述子テーブルです。各記述子はカーネルの
//! userエリア（`libc::user`）内のバイトオフセットを保持しており、
//! メモリ上のミラーへの添字とPTRACE_PEEKUSERのオフセットを兼ねます。

use crate::Result;

/// レジスタの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterType {
    Gpr,
    SubGpr,
    Fpr,
    Dr,
}

/// レジスタ値の表示・解析フォーマット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFormat {
    Uint,
    DoubleFloat,
    LongDouble,
    Vector,
}

/// レジスタ識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId {
    // 64ビット汎用レジスタ
    Rax, Rdx, Rcx, Rbx, Rsi, Rdi, Rbp, Rsp,
    R8, R9, R10, R11, R12, R13, R14, R15,
    Rip, Eflags, Cs, Fs, Gs, Ss, Ds, Es,
    FsBase, GsBase, OrigRax,

    // 32ビットサブレジスタ
    Eax, Edx, Ecx, Ebx, Esi, Edi, Ebp, Esp,
    R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d,

    // 16ビットサブレジスタ
    Ax, Dx, Cx, Bx, Si, Di, Bp, Sp,
    R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w,

    // 8ビットサブレジスタ
    Ah, Dh, Ch, Bh,
    Al, Dl, Cl, Bl, Sil, Dil, Bpl, Spl,
    R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,

    // x87制御・状態レジスタ
    Fcw, Fsw, Ftw, Fop, Frip, Frdp, Mxcsr, Mxcsrmask,

    // x87スタックとMMXエイリアス
    St0, St1, St2, St3, St4, St5, St6, St7,
    Mm0, Mm1, Mm2, Mm3, Mm4, Mm5, Mm6, Mm7,

    // XMMレジスタ
    Xmm0, Xmm1, Xmm2, Xmm3, Xmm4, Xmm5, Xmm6, Xmm7,
    Xmm8, Xmm9, Xmm10, Xmm11, Xmm12, Xmm13, Xmm14, Xmm15,

    // デバッグレジスタ
    Dr0, Dr1, Dr2, Dr3, Dr4, Dr5, Dr6, Dr7,
}

impl RegisterId {
    /// 番号からデバッグレジスタのIDを取得する
    pub(crate) fn dr(n: usize) -> Self {
        match n {
            0 => Self::Dr0,
            1 => Self::Dr1,
            2 => Self::Dr2,
            3 => Self::Dr3,
            4 => Self::Dr4,
            5 => Self::Dr5,
            6 => Self::Dr6,
            7 => Self::Dr7,
            n => panic!("Invalid debug register number: {}", n),
        }
    }
}

/// レジスタ記述子
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo {
    pub id: RegisterId,
    pub name: &'static str,
    pub dwarf_id: i32,
    pub size: usize,
    pub offset: usize,
    pub reg_type: RegisterType,
    pub format: RegisterFormat,
}

macro_rules! gpr_offset {
    ($field:ident) => {
        std::mem::offset_of!(libc::user, regs)
            + std::mem::offset_of!(libc::user_regs_struct, $field)
    };
}

macro_rules! fpr_offset {
    ($field:ident) => {
        std::mem::offset_of!(libc::user, i387)
            + std::mem::offset_of!(libc::user_fpregs_struct, $field)
    };
}

macro_rules! register {
    ($id:ident, $name:literal, $dwarf:expr, $size:expr, $offset:expr, $type:ident, $format:ident) => {
        RegisterInfo {
            id: RegisterId::$id,
            name: $name,
            dwarf_id: $dwarf,
            size: $size,
            offset: $offset,
            reg_type: RegisterType::$type,
            format: RegisterFormat::$format,
        }
    };
}

macro_rules! gpr64 {
    ($id:ident, $name:literal, $dwarf:expr, $field:ident) => {
        register!($id, $name, $dwarf, 8, gpr_offset!($field), Gpr, Uint)
    };
}

macro_rules! gpr32 {
    ($id:ident, $name:literal, $super:ident) => {
        register!($id, $name, -1, 4, gpr_offset!($super), SubGpr, Uint)
    };
}

macro_rules! gpr16 {
    ($id:ident, $name:literal, $super:ident) => {
        register!($id, $name, -1, 2, gpr_offset!($super), SubGpr, Uint)
    };
}

macro_rules! gpr8l {
    ($id:ident, $name:literal, $super:ident) => {
        register!($id, $name, -1, 1, gpr_offset!($super), SubGpr, Uint)
    };
}

macro_rules! gpr8h {
    ($id:ident, $name:literal, $super:ident) => {
        register!($id, $name, -1, 1, gpr_offset!($super) + 1, SubGpr, Uint)
    };
}

macro_rules! fpr {
    ($id:ident, $name:literal, $dwarf:expr, $size:expr, $field:ident) => {
        register!($id, $name, $dwarf, $size, fpr_offset!($field), Fpr, Uint)
    };
}

macro_rules! fp_st {
    ($id:ident, $name:literal, $n:expr) => {
        register!(
            $id,
            $name,
            33 + $n,
            10,
            fpr_offset!(st_space) + $n * 16,
            Fpr,
            LongDouble
        )
    };
}

macro_rules! fp_mm {
    ($id:ident, $name:literal, $n:expr) => {
        register!(
            $id,
            $name,
            41 + $n,
            8,
            fpr_offset!(st_space) + $n * 16,
            Fpr,
            Vector
        )
    };
}

macro_rules! fp_xmm {
    ($id:ident, $name:literal, $n:expr) => {
        register!(
            $id,
            $name,
            17 + $n,
            16,
            fpr_offset!(xmm_space) + $n * 16,
            Fpr,
            Vector
        )
    };
}

macro_rules! dr {
    ($id:ident, $name:literal, $n:expr) => {
        register!(
            $id,
            $name,
            -1,
            8,
            std::mem::offset_of!(libc::user, u_debugreg) + $n * 8,
            Dr,
            Uint
        )
    };
}

/// 全レジスタの記述子テーブル
pub const REGISTER_INFOS: &[RegisterInfo] = &[
    // 64ビット汎用レジスタ
    gpr64!(Rax, "rax", 0, rax),
    gpr64!(Rdx, "rdx", 1, rdx),
    gpr64!(Rcx, "rcx", 2, rcx),
    gpr64!(Rbx, "rbx", 3, rbx),
    gpr64!(Rsi, "rsi", 4, rsi),
    gpr64!(Rdi, "rdi", 5, rdi),
    gpr64!(Rbp, "rbp", 6, rbp),
    gpr64!(Rsp, "rsp", 7, rsp),
    gpr64!(R8, "r8", 8, r8),
    gpr64!(R9, "r9", 9, r9),
    gpr64!(R10, "r10", 10, r10),
    gpr64!(R11, "r11", 11, r11),
    gpr64!(R12, "r12", 12, r12),
    gpr64!(R13, "r13", 13, r13),
    gpr64!(R14, "r14", 14, r14),
    gpr64!(R15, "r15", 15, r15),
    gpr64!(Rip, "rip", 16, rip),
    gpr64!(Eflags, "eflags", 49, eflags),
    gpr64!(Cs, "cs", 51, cs),
    gpr64!(Fs, "fs", 54, fs),
    gpr64!(Gs, "gs", 55, gs),
    gpr64!(Ss, "ss", 52, ss),
    gpr64!(Ds, "ds", 53, ds),
    gpr64!(Es, "es", 50, es),
    gpr64!(FsBase, "fs_base", 58, fs_base),
    gpr64!(GsBase, "gs_base", 59, gs_base),
    gpr64!(OrigRax, "orig_rax", -1, orig_rax),
    // 32ビットサブレジスタ
    gpr32!(Eax, "eax", rax),
    gpr32!(Edx, "edx", rdx),
    gpr32!(Ecx, "ecx", rcx),
    gpr32!(Ebx, "ebx", rbx),
    gpr32!(Esi, "esi", rsi),
    gpr32!(Edi, "edi", rdi),
    gpr32!(Ebp, "ebp", rbp),
    gpr32!(Esp, "esp", rsp),
    gpr32!(R8d, "r8d", r8),
    gpr32!(R9d, "r9d", r9),
    gpr32!(R10d, "r10d", r10),
    gpr32!(R11d, "r11d", r11),
    gpr32!(R12d, "r12d", r12),
    gpr32!(R13d, "r13d", r13),
    gpr32!(R14d, "r14d", r14),
    gpr32!(R15d, "r15d", r15),
    // 16ビットサブレジスタ
    gpr16!(Ax, "ax", rax),
    gpr16!(Dx, "dx", rdx),
    gpr16!(Cx, "cx", rcx),
    gpr16!(Bx, "bx", rbx),
    gpr16!(Si, "si", rsi),
    gpr16!(Di, "di", rdi),
    gpr16!(Bp, "bp", rbp),
    gpr16!(Sp, "sp", rsp),
    gpr16!(R8w, "r8w", r8),
    gpr16!(R9w, "r9w", r9),
    gpr16!(R10w, "r10w", r10),
    gpr16!(R11w, "r11w", r11),
    gpr16!(R12w, "r12w", r12),
    gpr16!(R13w, "r13w", r13),
    gpr16!(R14w, "r14w", r14),
    gpr16!(R15w, "r15w", r15),
    // 8ビットサブレジスタ
    gpr8h!(Ah, "ah", rax),
    gpr8h!(Dh, "dh", rdx),
    gpr8h!(Ch, "ch", rcx),
    gpr8h!(Bh, "bh", rbx),
    gpr8l!(Al, "al", rax),
    gpr8l!(Dl, "dl", rdx),
    gpr8l!(Cl, "cl", rcx),
    gpr8l!(Bl, "bl", rbx),
    gpr8l!(Sil, "sil", rsi),
    gpr8l!(Dil, "dil", rdi),
    gpr8l!(Bpl, "bpl", rbp),
    gpr8l!(Spl, "spl", rsp),
    gpr8l!(R8b, "r8b", r8),
    gpr8l!(R9b, "r9b", r9),
    gpr8l!(R10b, "r10b", r10),
    gpr8l!(R11b, "r11b", r11),
    gpr8l!(R12b, "r12b", r12),
    gpr8l!(R13b, "r13b", r13),
    gpr8l!(R14b, "r14b", r14),
    gpr8l!(R15b, "r15b", r15),
    // x87制御・状態レジスタ
    fpr!(Fcw, "fcw", 65, 2, cwd),
    fpr!(Fsw, "fsw", 66, 2, swd),
    fpr!(Ftw, "ftw", -1, 2, ftw),
    fpr!(Fop, "fop", -1, 2, fop),
    fpr!(Frip, "frip", -1, 8, rip),
    fpr!(Frdp, "frdp", -1, 8, rdp),
    fpr!(Mxcsr, "mxcsr", 64, 4, mxcsr),
    fpr!(Mxcsrmask, "mxcsrmask", -1, 4, mxcr_mask),
    // x87スタック
    fp_st!(St0, "st0", 0),
    fp_st!(St1, "st1", 1),
    fp_st!(St2, "st2", 2),
    fp_st!(St3, "st3", 3),
    fp_st!(St4, "st4", 4),
    fp_st!(St5, "st5", 5),
    fp_st!(St6, "st6", 6),
    fp_st!(St7, "st7", 7),
    // MMX（x87スタックの下位64ビットをエイリアス）
    fp_mm!(Mm0, "mm0", 0),
    fp_mm!(Mm1, "mm1", 1),
    fp_mm!(Mm2, "mm2", 2),
    fp_mm!(Mm3, "mm3", 3),
    fp_mm!(Mm4, "mm4", 4),
    fp_mm!(Mm5, "mm5", 5),
    fp_mm!(Mm6, "mm6", 6),
    fp_mm!(Mm7, "mm7", 7),
    // XMMレジスタ
    fp_xmm!(Xmm0, "xmm0", 0),
    fp_xmm!(Xmm1, "xmm1", 1),
    fp_xmm!(Xmm2, "xmm2", 2),
    fp_xmm!(Xmm3, "xmm3", 3),
    fp_xmm!(Xmm4, "xmm4", 4),
    fp_xmm!(Xmm5, "xmm5", 5),
    fp_xmm!(Xmm6, "xmm6", 6),
    fp_xmm!(Xmm7, "xmm7", 7),
    fp_xmm!(Xmm8, "xmm8", 8),
    fp_xmm!(Xmm9, "xmm9", 9),
    fp_xmm!(Xmm10, "xmm10", 10),
    fp_xmm!(Xmm11, "xmm11", 11),
    fp_xmm!(Xmm12, "xmm12", 12),
    fp_xmm!(Xmm13, "xmm13", 13),
    fp_xmm!(Xmm14, "xmm14", 14),
    fp_xmm!(Xmm15, "xmm15", 15),
    // デバッグレジスタ
    dr!(Dr0, "dr0", 0),
    dr!(Dr1, "dr1", 1),
    dr!(Dr2, "dr2", 2),
    dr!(Dr3, "dr3", 3),
    dr!(Dr4, "dr4", 4),
    dr!(Dr5, "dr5", 5),
    dr!(Dr6, "dr6", 6),
    dr!(Dr7, "dr7", 7),
];

/// IDから記述子を検索する
pub fn register_info_by_id(id: RegisterId) -> Result<&'static RegisterInfo> {
    REGISTER_INFOS
        .iter()
        .find(|info| info.id == id)
        .ok_or_else(|| anyhow::anyhow!("No such register"))
}

/// 小文字の名前から記述子を検索する
pub fn register_info_by_name(name: &str) -> Result<&'static RegisterInfo> {
    REGISTER_INFOS
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| anyhow::anyhow!("No such register"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let info = register_info_by_name("rax").unwrap();
        assert_eq!(info.id, RegisterId::Rax);
        assert_eq!(info.size, 8);
        assert_eq!(info.reg_type, RegisterType::Gpr);

        let info = register_info_by_name("xmm3").unwrap();
        assert_eq!(info.size, 16);
        assert_eq!(info.format, RegisterFormat::Vector);

        assert!(register_info_by_name("rax2").is_err());
        assert!(register_info_by_name("RAX").is_err());
    }

    #[test]
    fn test_lookup_by_id() {
        let info = register_info_by_id(RegisterId::St3).unwrap();
        assert_eq!(info.name, "st3");
        assert_eq!(info.size, 10);
        assert_eq!(info.format, RegisterFormat::LongDouble);
    }

    #[test]
    fn test_offsets_stay_inside_user_area() {
        for info in REGISTER_INFOS {
            assert!(
                info.offset + info.size <= std::mem::size_of::<libc::user>(),
                "register {} spills out of the user area",
                info.name
            );
        }
    }

    #[test]
    fn test_sub_registers_alias_parents() {
        let rax = register_info_by_id(RegisterId::Rax).unwrap();
        assert_eq!(register_info_by_name("eax").unwrap().offset, rax.offset);
        assert_eq!(register_info_by_name("ax").unwrap().offset, rax.offset);
        assert_eq!(register_info_by_name("al").unwrap().offset, rax.offset);
        assert_eq!(register_info_by_name("ah").unwrap().offset, rax.offset + 1);
    }

    #[test]
    fn test_mmx_aliases_x87_stack() {
        let st0 = register_info_by_id(RegisterId::St0).unwrap();
        let mm0 = register_info_by_id(RegisterId::Mm0).unwrap();
        assert_eq!(st0.offset, mm0.offset);
        assert_eq!(mm0.size, 8);
        assert_eq!(mm0.format, RegisterFormat::Vector);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = REGISTER_INFOS.iter().map(|info| info.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), REGISTER_INFOS.len());
    }
}
