//! sdb CLI - 対話型デバッガのフロントエンド
//!
//! ターゲットのlaunch/attachを行い、REPLでデバッグコマンドを受け付けます。

use anyhow::Result;
use clap::Parser;
use nix::sys::signal::Signal;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use sdb_core::parse::{parse_address, parse_register_value};
use sdb_core::{BreakpointCommand, Command, RegisterCommand};
use sdb_target::{
    register_info_by_name, Process, ProcessState, RegisterType, StopReason, VirtAddr,
    REGISTER_INFOS,
};
use tracing_subscriber::EnvFilter;

/// sdb - x86-64 Linux用のミニマルなネイティブデバッガ
#[derive(Parser)]
#[command(name = "sdb")]
#[command(version = "0.1.0")]
#[command(about = "Minimal native debugger for x86-64 Linux", long_about = None)]
struct Cli {
    /// アタッチ先のプロセスID
    #[arg(short = 'p', long = "pid")]
    pid: Option<i32>,

    /// 起動してデバッグする実行可能ファイル
    program: Option<std::path::PathBuf>,
}

fn main() {
    // 環境変数 RUST_LOG でログレベルを制御可能。デフォルトはinfo以上のみ
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    if cli.pid.is_none() && cli.program.is_none() {
        eprintln!("No arguments given");
        std::process::exit(1);
    }

    if let Err(err) = run(&cli) {
        println!("{}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut process = attach_or_launch(cli)?;
    main_loop(&mut process)
}

/// 引数に従ってプロセスへアタッチするか、新規に起動する
fn attach_or_launch(cli: &Cli) -> Result<Process> {
    if let Some(pid) = cli.pid {
        return Process::attach(pid);
    }
    let Some(program) = &cli.program else {
        anyhow::bail!("No arguments given");
    };
    let process = Process::launch(program, true, None)?;
    println!("Launched process with PID {}", process.pid());
    Ok(process)
}

/// REPLループを実行する
fn main_loop(process: &mut Process) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut last_line = String::new();

    loop {
        match rl.readline("sdb> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                // 空行は直前のコマンドの繰り返し
                let line = if line.is_empty() {
                    last_line.clone()
                } else {
                    rl.add_history_entry(&line)?;
                    last_line = line.clone();
                    line
                };
                if line.is_empty() {
                    continue;
                }
                // エラーはコマンド境界で捕捉してメッセージだけ表示する
                if let Err(err) = handle_command(process, &line) {
                    println!("{}", err);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

fn handle_command(process: &mut Process, line: &str) -> Result<()> {
    match Command::parse(line) {
        Some(Command::Continue) => handle_continue(process),
        Some(Command::Step) => handle_step(process),
        Some(Command::Help(topic)) => {
            print_help(topic.as_deref());
            Ok(())
        }
        Some(Command::Register(command)) => handle_register_command(process, command),
        Some(Command::Breakpoint(command)) => handle_breakpoint_command(process, command),
        None => {
            eprintln!("Unknown command");
            Ok(())
        }
    }
}

/// Continueコマンドを処理する
fn handle_continue(process: &mut Process) -> Result<()> {
    process.resume()?;
    let reason = process.wait_on_signal()?;
    print_stop_reason(process, reason)
}

/// Stepコマンドを処理する
fn handle_step(process: &mut Process) -> Result<()> {
    let reason = process.step_instruction()?;
    print_stop_reason(process, reason)
}

/// 停止理由を整形して表示する
fn print_stop_reason(process: &Process, reason: StopReason) -> Result<()> {
    let message = match reason.reason {
        ProcessState::Exited => format!("exited with status {}", reason.info),
        ProcessState::Terminated => {
            format!("terminated with signal {}", signal_name(reason.info))
        }
        ProcessState::Stopped => format!(
            "stopped with signal {} at {}",
            signal_name(reason.info),
            process.get_pc()?
        ),
        ProcessState::Running => anyhow::bail!("Process is not stopped"),
    };
    println!("Process {} {}", process.pid(), message);
    Ok(())
}

fn signal_name(signo: i32) -> String {
    match Signal::try_from(signo) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("signal {}", signo),
    }
}

fn handle_register_command(process: &mut Process, command: RegisterCommand) -> Result<()> {
    match command {
        RegisterCommand::Read(target) => handle_register_read(process, target.as_deref()),
        RegisterCommand::Write { register, value } => {
            handle_register_write(process, &register, &value)
        }
        RegisterCommand::Help => {
            print_help(Some("register"));
            Ok(())
        }
    }
}

/// レジスタを読み出して表示する
///
/// ターゲット未指定なら汎用レジスタのみ、"all"なら全レジスタを表示する。
/// orig_raxは常にスキップする。
fn handle_register_read(process: &Process, target: Option<&str>) -> Result<()> {
    match target {
        None | Some("all") => {
            let print_all = target.is_some();
            for info in REGISTER_INFOS {
                let should_print = (print_all || info.reg_type == RegisterType::Gpr)
                    && info.name != "orig_rax";
                if !should_print {
                    continue;
                }
                let value = process.registers().read(info)?;
                println!("{}:\t{}", info.name, value);
            }
        }
        Some(name) => {
            let info = register_info_by_name(name)?;
            let value = process.registers().read(info)?;
            println!("{}:\t{}", info.name, value);
        }
    }
    Ok(())
}

fn handle_register_write(process: &mut Process, register: &str, text: &str) -> Result<()> {
    let info = register_info_by_name(register)?;
    let value = parse_register_value(info, text)?;
    process.registers_mut().write(info, value)
}

fn handle_breakpoint_command(process: &mut Process, command: BreakpointCommand) -> Result<()> {
    match command {
        BreakpointCommand::List => {
            if process.breakpoint_sites().is_empty() {
                println!("No breakpoints set");
            } else {
                println!("Current breakpoints:");
                for site in process.breakpoint_sites().iter() {
                    println!(
                        "{}: address = {}, {}",
                        site.id(),
                        site.address(),
                        if site.is_enabled() { "enabled" } else { "disabled" }
                    );
                }
            }
            Ok(())
        }
        BreakpointCommand::Set(text) => {
            let Some(address) = parse_address(&text) else {
                eprintln!("Breakpoint command expects address in hexadecimal, prefixed with '0x'");
                return Ok(());
            };
            process
                .create_breakpoint_site(VirtAddr::new(address))?
                .enable()
        }
        BreakpointCommand::Enable(text) => {
            let Some(id) = parse_site_id(&text) else {
                return Ok(());
            };
            process.breakpoint_sites_mut().get_by_id_mut(id)?.enable()
        }
        BreakpointCommand::Disable(text) => {
            let Some(id) = parse_site_id(&text) else {
                return Ok(());
            };
            process.breakpoint_sites_mut().get_by_id_mut(id)?.disable()
        }
        BreakpointCommand::Delete(text) => {
            let Some(id) = parse_site_id(&text) else {
                return Ok(());
            };
            process.breakpoint_sites_mut().remove_by_id(id)
        }
        BreakpointCommand::Help => {
            print_help(Some("breakpoint"));
            Ok(())
        }
    }
}

fn parse_site_id(text: &str) -> Option<u32> {
    let id = text.parse().ok();
    if id.is_none() {
        eprintln!("Command expects breakpoint id");
    }
    id
}

fn print_help(topic: Option<&str>) {
    match topic {
        None => {
            eprintln!("Available commands:");
            eprintln!("breakpoint  - Commands for operating on breakpoints");
            eprintln!("continue    - Resume the process");
            eprintln!("register    - Commands for operating on registers");
            eprintln!("step        - Step over a single instruction");
        }
        Some(topic) if "register".starts_with(topic) => {
            eprintln!("Available commands:");
            eprintln!("read");
            eprintln!("read <register>");
            eprintln!("read all");
            eprintln!("write <register> <value>");
        }
        Some(topic) if "breakpoint".starts_with(topic) => {
            eprintln!("Available commands:");
            eprintln!("list");
            eprintln!("delete <id>");
            eprintln!("disable <id>");
            eprintln!("enable <id>");
            eprintln!("set <address>");
        }
        Some(_) => {
            eprintln!("No help available on that");
        }
    }
}
