//! テスト用ターゲット: あいさつを出力して終了する

fn main() {
    println!("Hello, sdb!");
}
