//! ソフトウェアブレークポイント
//!
//! ブレークポイントサイトは仮想アドレスと置き換え前の1バイトを所有し、
//! 有効化時にINT3命令をターゲットのメモリへパッチします。周囲のバイトは
//! 他のサイトやターゲット自身が書き換える可能性があるため、サイトが
//! キャッシュするのは自分の1バイトだけです。

use crate::types::VirtAddr;
use crate::Result;
use nix::sys::ptrace;
use nix::unistd::Pid;

/// INT3命令のオペコード
const INT3_OPCODE: u8 = 0xcc;

/// ソフトウェアブレークポイントサイト
#[derive(Debug)]
pub struct BreakpointSite {
    id: u32,
    pid: Pid,
    address: VirtAddr,
    enabled: bool,
    saved_byte: u8,
}

impl BreakpointSite {
    pub(crate) fn new(pid: Pid, address: VirtAddr) -> Self {
        Self {
            id: 0,
            pid,
            address,
            enabled: false,
            saved_byte: 0,
        }
    }

    /// サイトのIDを取得する
    pub fn id(&self) -> u32 {
        self.id
    }

    /// サイトのアドレスを取得する
    pub fn address(&self) -> VirtAddr {
        self.address
    }

    /// サイトが有効かどうか
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 置き換え前のバイトを取得する
    pub fn saved_byte(&self) -> u8 {
        self.saved_byte
    }

    /// ブレークポイントを有効化する
    ///
    /// アドレスの1バイトを保存してからINT3で置き換えます。既に有効なら
    /// 何もしません。
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        let addr = self.address.addr() as usize as ptrace::AddressType;
        let word = ptrace::read(self.pid, addr)
            .map_err(|e| anyhow::anyhow!("Enabling breakpoint site failed: {}", e.desc()))?
            as u64;
        self.saved_byte = (word & 0xff) as u8;

        let patched = (word & !0xff) | u64::from(INT3_OPCODE);
        ptrace::write(self.pid, addr, patched as i64)
            .map_err(|e| anyhow::anyhow!("Enabling breakpoint site failed: {}", e.desc()))?;

        self.enabled = true;
        Ok(())
    }

    /// ブレークポイントを解除する
    ///
    /// 現在のワードへ保存していた1バイトをスプライスして書き戻します。
    /// 既に無効なら何もしません。
    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let addr = self.address.addr() as usize as ptrace::AddressType;
        let word = ptrace::read(self.pid, addr)
            .map_err(|e| anyhow::anyhow!("Disabling breakpoint site failed: {}", e.desc()))?
            as u64;

        let restored = (word & !0xff) | u64::from(self.saved_byte);
        ptrace::write(self.pid, addr, restored as i64)
            .map_err(|e| anyhow::anyhow!("Disabling breakpoint site failed: {}", e.desc()))?;

        self.enabled = false;
        Ok(())
    }
}

/// ブレークポイントサイトのレジストリ
///
/// サイトは挿入順（=ID順）で保持されます。IDはプロセスごとに1から始まる
/// 単調増加のカウンタから払い出され、削除後も再利用されません。
#[derive(Debug)]
pub struct BreakpointSites {
    sites: Vec<BreakpointSite>,
    next_id: u32,
}

impl BreakpointSites {
    pub(crate) fn new() -> Self {
        Self {
            sites: Vec::new(),
            next_id: 1,
        }
    }

    /// サイトの所有権を受け取り、次のIDを割り当てて登録する
    ///
    /// 同じアドレスのサイトが既に存在する場合は失敗します。
    pub(crate) fn push(&mut self, mut site: BreakpointSite) -> Result<&mut BreakpointSite> {
        if self.contains_address(site.address) {
            return Err(anyhow::anyhow!(
                "Breakpoint site already created at address {}",
                site.address.addr()
            ));
        }
        site.id = self.next_id;
        self.next_id += 1;
        self.sites.push(site);
        Ok(self.sites.last_mut().unwrap())
    }

    /// 指定アドレスのサイトが存在するか
    pub fn contains_address(&self, address: VirtAddr) -> bool {
        self.sites.iter().any(|site| site.address == address)
    }

    /// 指定IDのサイトが存在するか
    pub fn contains_id(&self, id: u32) -> bool {
        self.sites.iter().any(|site| site.id == id)
    }

    /// 指定アドレスに有効なサイトが存在するか
    pub fn enabled_stoppoint_at_address(&self, address: VirtAddr) -> bool {
        self.sites
            .iter()
            .any(|site| site.address == address && site.enabled)
    }

    /// アドレスでサイトを検索する
    pub fn get_by_address(&self, address: VirtAddr) -> Result<&BreakpointSite> {
        self.sites
            .iter()
            .find(|site| site.address == address)
            .ok_or_else(|| anyhow::anyhow!("No breakpoint site at address {}", address))
    }

    /// アドレスでサイトを検索する（可変）
    pub fn get_by_address_mut(&mut self, address: VirtAddr) -> Result<&mut BreakpointSite> {
        self.sites
            .iter_mut()
            .find(|site| site.address == address)
            .ok_or_else(|| anyhow::anyhow!("No breakpoint site at address {}", address))
    }

    /// IDでサイトを検索する
    pub fn get_by_id(&self, id: u32) -> Result<&BreakpointSite> {
        self.sites
            .iter()
            .find(|site| site.id == id)
            .ok_or_else(|| anyhow::anyhow!("No breakpoint site with id {}", id))
    }

    /// IDでサイトを検索する（可変）
    pub fn get_by_id_mut(&mut self, id: u32) -> Result<&mut BreakpointSite> {
        self.sites
            .iter_mut()
            .find(|site| site.id == id)
            .ok_or_else(|| anyhow::anyhow!("No breakpoint site with id {}", id))
    }

    /// IDでサイトを削除する
    ///
    /// 有効なサイトは先に解除してから取り除きます。
    pub fn remove_by_id(&mut self, id: u32) -> Result<()> {
        let index = self
            .sites
            .iter()
            .position(|site| site.id == id)
            .ok_or_else(|| anyhow::anyhow!("No breakpoint site with id {}", id))?;
        self.sites[index].disable()?;
        self.sites.remove(index);
        Ok(())
    }

    /// アドレスでサイトを削除する
    pub fn remove_by_address(&mut self, address: VirtAddr) -> Result<()> {
        let index = self
            .sites
            .iter()
            .position(|site| site.address == address)
            .ok_or_else(|| anyhow::anyhow!("No breakpoint site at address {}", address))?;
        self.sites[index].disable()?;
        self.sites.remove(index);
        Ok(())
    }

    /// 挿入順にサイトを走査する
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointSite> {
        self.sites.iter()
    }

    /// サイト数を取得する
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// レジストリが空かどうか
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
