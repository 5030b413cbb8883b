//! sdb デバッガのコア機能
//!
//! このクレートは、対話シェルとテストの双方から使うコマンド解析と
//! レジスタ値のパースを提供します。プロセス制御そのものは
//! `sdb-target`クレートが担当します。

pub mod command;
pub mod parse;

pub use command::{BreakpointCommand, Command, RegisterCommand};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
