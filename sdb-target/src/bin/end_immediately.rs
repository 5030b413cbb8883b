//! テスト用ターゲット: 何もせずに正常終了する

fn main() {}
