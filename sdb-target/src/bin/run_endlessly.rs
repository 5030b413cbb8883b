//! テスト用ターゲット: 終了せずに走り続ける

use std::thread;
use std::time::Duration;

fn main() {
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
