//! プロセス制御機能
//!
//! デバッグ対象プロセスのlaunch/attachから、実行制御（continue/step）、
//! 停止理由の観測、ティアダウンまでを担当します。ターゲットとの同期は
//! すべてptraceとwaitpidを介して行います。

use crate::breakpoint::{BreakpointSite, BreakpointSites};
use crate::pipe::Pipe;
use crate::register_info::RegisterId;
use crate::registers::Registers;
use crate::types::{ProcessState, StopReason, VirtAddr};
use crate::Result;
use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{execvp, fork, ForkResult, Pid};
use std::ffi::CString;
use std::os::fd::OwnedFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::debug;

/// デバッグ対象のプロセス
///
/// `launch`または`attach`で構築し、ドロップ時にターゲットを解放します。
/// アタッチ中に実行状態のままドロップされた場合は一度停止させてから
/// デタッチし、launchしたプロセスはSIGKILLで回収します。
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    terminate_on_end: bool,
    is_attached: bool,
    state: ProcessState,
    registers: Registers,
    breakpoint_sites: BreakpointSites,
}

impl Process {
    /// 実行可能ファイルを起動してデバッグ対象プロセスを開始する
    ///
    /// forkした子プロセスでASLRを無効化し、必要なら標準出力を
    /// 差し替えてからPTRACE_TRACEMEを設定し、PATH検索付きのexecvpで
    /// プログラムを実行します。exec前の失敗はclose-on-execパイプ経由で
    /// 親へ伝わり、子を回収したうえでエラーとして返されます。
    /// `debug`が真の場合、traceme+execによる最初のSIGTRAPを消費した
    /// 停止状態のプロセスを返します。
    pub fn launch<P: AsRef<Path>>(
        path: P,
        debug: bool,
        stdout_replacement: Option<OwnedFd>,
    ) -> Result<Self> {
        let mut channel = Pipe::new(true)?;

        match unsafe { fork() }.map_err(|e| anyhow::anyhow!("fork failed: {}", e.desc()))? {
            ForkResult::Child => {
                channel.close_read();
                if let Err(err) = Self::setup_inferior(path.as_ref(), debug, stdout_replacement) {
                    let _ = channel.write(err.to_string().as_bytes());
                    std::process::exit(-1);
                }
                unreachable!("execvp returned");
            }
            ForkResult::Parent { child } => {
                channel.close_write();
                let data = channel.read()?;
                channel.close_read();
                if !data.is_empty() {
                    let _ = waitpid(child, None);
                    return Err(anyhow::anyhow!("{}", String::from_utf8_lossy(&data)));
                }

                debug!(pid = child.as_raw(), "launched inferior");
                let mut process = Self {
                    pid: child,
                    terminate_on_end: true,
                    is_attached: debug,
                    state: ProcessState::Stopped,
                    registers: Registers::new(child),
                    breakpoint_sites: BreakpointSites::new(),
                };
                if debug {
                    process.wait_on_signal()?;
                }
                Ok(process)
            }
        }
    }

    /// fork後の子プロセス側のセットアップ
    ///
    /// 成功した場合はexecvpから戻らない。エラーはパイプ経由で親へ
    /// 通知するための文字列になる。
    fn setup_inferior(
        path: &Path,
        debug: bool,
        stdout_replacement: Option<OwnedFd>,
    ) -> Result<()> {
        // 毎回同じアドレスにロードさせるためASLRを無効化する
        let _ = personality::set(Persona::ADDR_NO_RANDOMIZE);

        if let Some(fd) = stdout_replacement {
            nix::unistd::dup2_stdout(&fd)
                .map_err(|e| anyhow::anyhow!("stdout replacement failed: {}", e.desc()))?;
        }
        if debug {
            ptrace::traceme().map_err(|e| anyhow::anyhow!("Tracing failed: {}", e.desc()))?;
        }

        let program = CString::new(path.as_os_str().as_bytes())?;
        execvp(&program, &[program.clone()])
            .map_err(|e| anyhow::anyhow!("exec failed: {}", e.desc()))?;
        unreachable!("execvp returned");
    }

    /// 既存のプロセスにアタッチする
    ///
    /// アタッチで送られる停止を消費してから返します。
    pub fn attach(pid: i32) -> Result<Self> {
        if pid == 0 {
            return Err(anyhow::anyhow!("Invalid PID"));
        }
        let pid = Pid::from_raw(pid);
        ptrace::attach(pid).map_err(|e| anyhow::anyhow!("Could not attach: {}", e.desc()))?;

        debug!(pid = pid.as_raw(), "attached to inferior");
        let mut process = Self {
            pid,
            terminate_on_end: false,
            is_attached: true,
            state: ProcessState::Stopped,
            registers: Registers::new(pid),
            breakpoint_sites: BreakpointSites::new(),
        };
        process.wait_on_signal()?;
        Ok(process)
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 現在の実行状態を取得する
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// レジスタバンクへの参照を取得する
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// レジスタバンクへの可変参照を取得する
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// ブレークポイントサイトのレジストリへの参照を取得する
    pub fn breakpoint_sites(&self) -> &BreakpointSites {
        &self.breakpoint_sites
    }

    /// ブレークポイントサイトのレジストリへの可変参照を取得する
    pub fn breakpoint_sites_mut(&mut self) -> &mut BreakpointSites {
        &mut self.breakpoint_sites
    }

    /// プログラムカウンタを取得する
    pub fn get_pc(&self) -> Result<VirtAddr> {
        Ok(VirtAddr::new(
            self.registers.read_by_id_as::<u64>(RegisterId::Rip)?,
        ))
    }

    /// プログラムカウンタを設定する
    pub fn set_pc(&mut self, address: VirtAddr) -> Result<()> {
        self.registers.write_by_id(RegisterId::Rip, address.addr())
    }

    /// プロセスの実行を再開する
    ///
    /// PC上に有効なブレークポイントがある場合は、いったん解除して
    /// 1命令だけステップし、再度有効化してから継続します。ターゲット
    /// から観測できるのはステップされる1命令の間だけ元のバイトが
    /// 露出する瞬間のみです。
    pub fn resume(&mut self) -> Result<()> {
        if let Some(addr) = self.disable_site_at_pc()? {
            ptrace::step(self.pid, None)
                .map_err(|e| anyhow::anyhow!("Could not single step: {}", e.desc()))?;
            waitpid(self.pid, None)
                .map_err(|e| anyhow::anyhow!("waitpid failed: {}", e.desc()))?;
            self.breakpoint_sites.get_by_address_mut(addr)?.enable()?;
        }

        ptrace::cont(self.pid, None)
            .map_err(|e| anyhow::anyhow!("Could not resume: {}", e.desc()))?;
        self.state = ProcessState::Running;
        Ok(())
    }

    /// プロセスの状態変化を待つ
    ///
    /// waitpidでブロックし、ステータスを停止理由にデコードします。
    /// アタッチ中の停止ではレジスタバンクを読み直し、SIGTRAPでPC-1に
    /// 有効なサイトがあればINT3の実行でずれたPCを1バイト巻き戻します。
    pub fn wait_on_signal(&mut self) -> Result<StopReason> {
        let status =
            waitpid(self.pid, None).map_err(|e| anyhow::anyhow!("waitpid failed: {}", e.desc()))?;
        let reason = StopReason::from_wait_status(status)?;
        self.state = reason.reason;

        if self.is_attached && self.state == ProcessState::Stopped {
            self.registers.read_all()?;

            if reason.info == Signal::SIGTRAP as i32 {
                let instr_begin = self.get_pc()? - 1;
                if self
                    .breakpoint_sites
                    .enabled_stoppoint_at_address(instr_begin)
                {
                    self.set_pc(instr_begin)?;
                }
            }
        }
        Ok(reason)
    }

    /// 1命令だけ実行する
    ///
    /// PC上の有効なサイトは一時的に解除し、ステップ完了後に再度
    /// 有効化します。
    pub fn step_instruction(&mut self) -> Result<StopReason> {
        let to_reenable = self.disable_site_at_pc()?;

        ptrace::step(self.pid, None)
            .map_err(|e| anyhow::anyhow!("Could not single step: {}", e.desc()))?;
        let reason = self.wait_on_signal()?;

        if let Some(addr) = to_reenable {
            self.breakpoint_sites.get_by_address_mut(addr)?.enable()?;
        }
        Ok(reason)
    }

    /// PC上の有効なサイトを一時的に解除する
    ///
    /// resumeとstep_instructionで共有する前処理。解除した場合はその
    /// アドレスを返すので、呼び出し側が再有効化する。
    fn disable_site_at_pc(&mut self) -> Result<Option<VirtAddr>> {
        let pc = self.get_pc()?;
        if !self.breakpoint_sites.enabled_stoppoint_at_address(pc) {
            return Ok(None);
        }
        self.breakpoint_sites.get_by_address_mut(pc)?.disable()?;
        Ok(Some(pc))
    }

    /// 指定アドレスにブレークポイントサイトを作成する
    ///
    /// サイトは無効状態で登録されます。同じアドレスにサイトが既に
    /// ある場合は失敗します。
    pub fn create_breakpoint_site(&mut self, address: VirtAddr) -> Result<&mut BreakpointSite> {
        self.breakpoint_sites
            .push(BreakpointSite::new(self.pid, address))
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // ティアダウンはベストエフォートで行い、失敗は無視する
        if self.is_attached {
            if self.state == ProcessState::Running {
                let _ = kill(self.pid, Signal::SIGSTOP);
                let _ = waitpid(self.pid, None);
            }
            let _ = ptrace::detach(self.pid, None);
            let _ = kill(self.pid, Signal::SIGCONT);
        }
        if self.terminate_on_end {
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}
