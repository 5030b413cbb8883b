//! パイプ
//!
//! スコープ付きのファイルディスクリプタ対です。launch時の子プロセスから
//! 親へのエラー通知チャネルとして、またテストでのターゲットの標準出力の
//! キャプチャに使用します。

use crate::Result;
use nix::fcntl::OFlag;
use std::fs::File;
use std::io::{Read as _, Write as _};
use std::os::fd::OwnedFd;

/// ファイルディスクリプタ対
///
/// 両端は`Option`で保持し、クローズは冪等です。ドロップ時に残った端も
/// 閉じられます。
pub struct Pipe {
    read: Option<File>,
    write: Option<File>,
}

impl Pipe {
    /// パイプを作成する
    pub fn new(close_on_exec: bool) -> Result<Self> {
        let flags = if close_on_exec {
            OFlag::O_CLOEXEC
        } else {
            OFlag::empty()
        };
        let (read, write) = nix::unistd::pipe2(flags)
            .map_err(|e| anyhow::anyhow!("Pipe creation failed: {}", e.desc()))?;
        Ok(Self {
            read: Some(File::from(read)),
            write: Some(File::from(write)),
        })
    }

    /// 読み取り側を閉じる
    pub fn close_read(&mut self) {
        self.read = None;
    }

    /// 書き込み側を閉じる
    pub fn close_write(&mut self) {
        self.write = None;
    }

    /// 書き込み側の所有権を取り出す
    pub fn take_write(&mut self) -> Option<OwnedFd> {
        self.write.take().map(OwnedFd::from)
    }

    /// 届いているデータを一度のreadで読み取る
    ///
    /// データが無い場合は書き込み側が閉じられるかデータが届くまで
    /// ブロックします。全書き込み側が閉じられていれば空のバッファを
    /// 返します。
    pub fn read(&mut self) -> Result<Vec<u8>> {
        let file = self
            .read
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Pipe read end is closed"))?;
        let mut buffer = [0u8; 1024];
        let len = file
            .read(&mut buffer)
            .map_err(|e| anyhow::anyhow!("Could not read from pipe: {}", e))?;
        Ok(buffer[..len].to_vec())
    }

    /// データを書き込む
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .write
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Pipe write end is closed"))?;
        file.write_all(data)
            .map_err(|e| anyhow::anyhow!("Could not write to pipe: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut pipe = Pipe::new(false).unwrap();
        pipe.write(b"hello").unwrap();
        pipe.close_write();
        assert_eq!(pipe.read().unwrap(), b"hello");
        assert!(pipe.read().unwrap().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut pipe = Pipe::new(true).unwrap();
        pipe.close_write();
        pipe.close_write();
        assert!(pipe.write(b"x").is_err());
        assert_eq!(pipe.read().unwrap(), b"");
    }
}
