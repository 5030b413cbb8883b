//! sdb ターゲットプロセス制御
//!
//! このクレートは、デバッグ対象のプロセスを制御するための低レベル機能を提供します。
//! ptraceによるプロセスのlaunch/attach、レジスタアクセス、ソフトウェア
//! ブレークポイントの設定などを行います。

pub mod breakpoint;
pub mod pipe;
pub mod process;
pub mod register_info;
pub mod registers;
pub mod types;

pub use breakpoint::{BreakpointSite, BreakpointSites};
pub use pipe::Pipe;
pub use process::Process;
pub use register_info::{
    register_info_by_id, register_info_by_name, RegisterFormat, RegisterId, RegisterInfo,
    RegisterType, REGISTER_INFOS,
};
pub use registers::Registers;
pub use types::{f64_to_f80_bytes, f80_bytes_to_f64, ProcessState, RegisterValue, StopReason, VirtAddr};

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
