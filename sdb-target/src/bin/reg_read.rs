//! テスト用ターゲット: 既知の値をレジスタへ置いてデバッガに読ませる
//!
//! 各ステージで値をセットしてからint3で停止し、デバッガが読み取りを
//! 検証できるようにします。

use std::arch::asm;

fn main() {
    unsafe {
        asm!("mov r13d, 0xcafecafe", "int3", out("r13") _);
    }

    unsafe {
        asm!("mov r13b, 42", "int3", out("r13") _);
    }

    unsafe {
        asm!("movq mm0, {}", "int3", "emms", in(reg) 0xba5eba11u64);
    }

    unsafe {
        asm!(
            "pxor xmm0, xmm0",
            "movq xmm0, {}",
            "int3",
            in(reg) 64.125f64.to_bits(),
            out("xmm0") _,
        );
    }

    let value: f64 = 64.125;
    unsafe {
        asm!("fld qword ptr [{}]", "int3", "fstp st(0)", in(reg) &value as *const f64);
    }
}
