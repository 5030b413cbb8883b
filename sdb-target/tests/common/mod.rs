//! 統合テスト共通のヘルパー
#![allow(dead_code)]

use nix::sys::signal::kill;
use nix::unistd::Pid;
use object::{Object, ObjectSection};
use sdb_target::VirtAddr;
use std::fs;
use std::path::Path;

/// プロセスが存在するか確認する
pub fn process_exists(pid: Pid) -> bool {
    match kill(pid, None) {
        Ok(()) => true,
        Err(errno) => errno != nix::errno::Errno::ESRCH,
    }
}

/// /proc/<pid>/statから状態文字を取得する
pub fn get_process_status(pid: Pid) -> char {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).expect("could not read stat");
    // コマンド名は括弧で囲まれており空白を含み得るので、最後の閉じ括弧の
    // 2文字あとが状態フィールドになる
    let index = stat.rfind(')').expect("malformed stat line") + 2;
    stat.as_bytes()[index] as char
}

/// ELFのエントリポイントをファイルオフセットへ変換する
///
/// エントリポイントを含むセクションのロードバイアス
/// （セクションアドレス - ファイルオフセット）を引いた値を返します。
pub fn get_entry_point_offset(path: &Path) -> u64 {
    let data = fs::read(path).expect("could not read target binary");
    let file = object::File::parse(&*data).expect("could not parse target binary");
    let entry = file.entry();

    for section in file.sections() {
        let address = section.address();
        if address <= entry && entry < address + section.size() {
            if let Some((offset, _)) = section.file_range() {
                return entry - (address - offset);
            }
        }
    }
    panic!("could not find the section containing the entry point");
}

/// ファイルオフセットを実行時アドレスへ変換する
///
/// /proc/<pid>/mapsの最初の実行可能マッピングからロードアドレスを
/// 計算します。
pub fn get_load_address(pid: Pid, offset: u64) -> VirtAddr {
    let maps = fs::read_to_string(format!("/proc/{}/maps", pid)).expect("could not read maps");
    for line in maps.lines() {
        // フォーマット: "address perms offset dev inode pathname"
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        if parts[1].as_bytes().get(2) == Some(&b'x') {
            let range: Vec<&str> = parts[0].split('-').collect();
            let low = u64::from_str_radix(range[0], 16).expect("malformed maps line");
            let file_offset = u64::from_str_radix(parts[2], 16).expect("malformed maps line");
            return VirtAddr::new(offset - file_offset + low);
        }
    }
    panic!("could not find the load address");
}
