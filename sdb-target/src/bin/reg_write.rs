//! テスト用ターゲット: デバッガが書き込んだレジスタ値を出力する
//!
//! int3でデバッガに制御を渡し、再開されるたびに直前の停止中に書き込まれた
//! レジスタの内容を標準出力へ書き出します。デバッガによる書き込みと
//! こちらの読み出しの間でコンパイラがレジスタを壊さないよう、トラップと
//! 読み出しは同じasmブロックにまとめています。

use std::arch::asm;
use std::io::Write as _;

fn emit(text: &str) {
    print!("{}", text);
    std::io::stdout().flush().unwrap();
}

fn main() {
    // 停止中にrsiへ書き込まれた値を読む
    let rsi: u64;
    unsafe {
        asm!("int3", "mov {}, rsi", out(reg) rsi, out("rsi") _);
    }
    emit(&format!("{:#x}", rsi));

    // mm0の下位64ビットを読む
    let mm0: u64;
    unsafe {
        asm!("int3", "movq {}, mm0", "emms", out(reg) mm0);
    }
    emit(&format!("{:#x}", mm0));

    // xmm0の下位をdoubleとして読む
    let xmm0: f64;
    unsafe {
        asm!("int3", out("xmm0") xmm0);
    }
    emit(&format!("{}", xmm0));

    // st0をdoubleに落として読む。デバッガ側がFSW/FTWでスタック状態も
    // 整えている前提
    let mut st0: f64 = 0.0;
    unsafe {
        asm!("int3", "fstp qword ptr [{}]", in(reg) &mut st0 as *mut f64);
    }
    emit(&format!("{}", st0));

    // テストが最後の出力を回収するための停止
    unsafe {
        asm!("int3");
    }
}
