//! ブレークポイントサイトの統合テスト

mod common;

use common::{get_entry_point_offset, get_load_address};
use nix::sys::signal::Signal;
use sdb_target::{Pipe, Process, ProcessState, VirtAddr};
use std::path::Path;

fn launch_run_endlessly() -> Process {
    Process::launch(env!("CARGO_BIN_EXE_run_endlessly"), true, None).unwrap()
}

#[test]
fn can_create_breakpoint_site() {
    let mut proc = launch_run_endlessly();
    let site = proc.create_breakpoint_site(VirtAddr::new(42)).unwrap();
    assert_eq!(site.address().addr(), 42);
    assert!(!site.is_enabled());
}

#[test]
fn breakpoint_site_ids_increase() {
    let mut proc = launch_run_endlessly();

    let id1 = proc.create_breakpoint_site(VirtAddr::new(42)).unwrap().id();
    let id2 = proc.create_breakpoint_site(VirtAddr::new(43)).unwrap().id();
    let id3 = proc.create_breakpoint_site(VirtAddr::new(44)).unwrap().id();
    let id4 = proc.create_breakpoint_site(VirtAddr::new(45)).unwrap().id();

    assert_eq!(id2, id1 + 1);
    assert_eq!(id3, id1 + 2);
    assert_eq!(id4, id1 + 3);
}

#[test]
fn duplicate_breakpoint_site_is_rejected() {
    let mut proc = launch_run_endlessly();
    proc.create_breakpoint_site(VirtAddr::new(42)).unwrap();
    let err = proc.create_breakpoint_site(VirtAddr::new(42)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Breakpoint site already created at address 42"
    );
}

#[test]
fn can_find_breakpoint_site() {
    let mut proc = launch_run_endlessly();
    for addr in 42..=45 {
        proc.create_breakpoint_site(VirtAddr::new(addr)).unwrap();
    }

    let sites = proc.breakpoint_sites();
    assert!(sites.contains_address(VirtAddr::new(44)));
    let s1 = sites.get_by_address(VirtAddr::new(44)).unwrap();
    assert_eq!(s1.address().addr(), 44);

    let next_id = s1.id() + 1;
    assert!(sites.contains_id(next_id));
    let s2 = sites.get_by_id(next_id).unwrap();
    assert_eq!(s2.id(), next_id);
    assert_eq!(s2.address().addr(), 45);
}

#[test]
fn cannot_find_missing_breakpoint_site() {
    let proc = launch_run_endlessly();
    assert!(proc
        .breakpoint_sites()
        .get_by_address(VirtAddr::new(44))
        .is_err());
    assert!(proc.breakpoint_sites().get_by_id(44).is_err());
}

#[test]
fn breakpoint_site_list_size_and_emptiness() {
    let mut proc = launch_run_endlessly();

    assert!(proc.breakpoint_sites().is_empty());
    assert_eq!(proc.breakpoint_sites().len(), 0);

    proc.create_breakpoint_site(VirtAddr::new(42)).unwrap();
    assert!(!proc.breakpoint_sites().is_empty());
    assert_eq!(proc.breakpoint_sites().len(), 1);

    proc.create_breakpoint_site(VirtAddr::new(43)).unwrap();
    assert!(!proc.breakpoint_sites().is_empty());
    assert_eq!(proc.breakpoint_sites().len(), 2);
}

#[test]
fn can_iterate_breakpoint_sites() {
    let mut proc = launch_run_endlessly();
    for addr in 42..=45 {
        proc.create_breakpoint_site(VirtAddr::new(addr)).unwrap();
    }

    let mut expected = 42u64;
    for site in proc.breakpoint_sites().iter() {
        assert_eq!(site.address().addr(), expected);
        expected += 1;
    }
    assert_eq!(expected, 46);
}

#[test]
fn breakpoint_on_entry_point_works() {
    let mut channel = Pipe::new(false).unwrap();
    let write_end = channel.take_write().unwrap();
    let path = env!("CARGO_BIN_EXE_hello_sdb");
    let mut proc = Process::launch(path, true, Some(write_end)).unwrap();

    let offset = get_entry_point_offset(Path::new(path));
    let load_address = get_load_address(proc.pid(), offset);

    proc.create_breakpoint_site(load_address)
        .unwrap()
        .enable()
        .unwrap();
    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();

    assert_eq!(reason.reason, ProcessState::Stopped);
    assert_eq!(reason.info, Signal::SIGTRAP as i32);
    assert_eq!(proc.get_pc().unwrap(), load_address);

    proc.resume().unwrap();
    let reason = proc.wait_on_signal().unwrap();
    assert_eq!(reason.reason, ProcessState::Exited);
    assert_eq!(reason.info, 0);

    assert_eq!(channel.read().unwrap(), b"Hello, sdb!\n");
}

#[test]
fn can_remove_breakpoint_sites() {
    let mut proc = launch_run_endlessly();

    let id = proc.create_breakpoint_site(VirtAddr::new(42)).unwrap().id();
    proc.create_breakpoint_site(VirtAddr::new(43)).unwrap();
    assert_eq!(proc.breakpoint_sites().len(), 2);

    proc.breakpoint_sites_mut().remove_by_id(id).unwrap();
    proc.breakpoint_sites_mut()
        .remove_by_address(VirtAddr::new(43))
        .unwrap();
    assert!(proc.breakpoint_sites().is_empty());
}
