//! Descriptor-table hygiene across spawns.

#![cfg(target_os = "linux")]

use std::os::fd::AsRawFd;
use std::sync::Mutex;

use procpipe::Command;

/// These tests mutate and observe the shared descriptor table; they cannot
/// overlap.
static FD_TABLE_LOCK: Mutex<()> = Mutex::new(());

fn sh(script: &str) -> Command {
    Command::new("/bin/sh").arg("-c").arg(script)
}

fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").expect("read_dir").count()
}

#[test]
fn parent_fd_table_is_stable_across_many_spawns() {
    let _lock = FD_TABLE_LOCK.lock().unwrap();
    // Warm up lazy allocations (logging, backend singletons) first.
    sh("true").status().expect("warmup");
    sh("true").output().expect("warmup");

    let before = open_fd_count();
    for _ in 0..50 {
        let status = sh("true").status().expect("status");
        assert!(status.success());
    }
    for _ in 0..50 {
        let output = sh("printf x").output().expect("output");
        assert_eq!(output.stdout, b"x");
    }
    let after = open_fd_count();
    assert_eq!(before, after, "descriptor leak across repeated spawns");
}

#[test]
fn injected_descriptor_does_not_reach_the_child() {
    let _lock = FD_TABLE_LOCK.lock().unwrap();
    // A high-numbered descriptor without close-on-exec, of the kind an
    // application might leave lying around.
    const INJECTED_FD: i32 = 300;
    let keeper = std::fs::File::open("/dev/null").expect("open");
    let rv = unsafe { libc::dup2(keeper.as_raw_fd(), INJECTED_FD) };
    assert_eq!(rv, INJECTED_FD, "dup2 failed");

    // Fast path: enumerated close actions cover the injected fd.
    let output = sh("ls /proc/self/fd").output().expect("output");
    let listing = String::from_utf8_lossy(&output.stdout);
    assert!(
        !listing.lines().any(|line| line == INJECTED_FD.to_string()),
        "fast path leaked fd {INJECTED_FD}: {listing}"
    );

    // Fallback path: the post-fork close loop covers it. A cwd override
    // forces fork/exec on this platform.
    let output = sh("ls /proc/self/fd")
        .current_dir("/")
        .output()
        .expect("output");
    let listing = String::from_utf8_lossy(&output.stdout);
    assert!(
        !listing.lines().any(|line| line == INJECTED_FD.to_string()),
        "fallback path leaked fd {INJECTED_FD}: {listing}"
    );

    unsafe {
        libc::close(INJECTED_FD);
    }
}

#[test]
fn child_sees_only_its_own_stdio() {
    let _lock = FD_TABLE_LOCK.lock().unwrap();
    // Pipes created for capture must not be observable in the child beyond
    // the dup2'ed 0/1/2 slots.
    let output = sh("ls /proc/self/fd").output().expect("output");
    let listing = String::from_utf8_lossy(&output.stdout);
    let mut fds: Vec<i32> = listing
        .lines()
        .filter_map(|line| line.parse().ok())
        .collect();
    fds.sort_unstable();
    // 0, 1, 2, and the fd `ls` itself opened to read the directory.
    assert!(
        fds.len() <= 4,
        "unexpected descriptors visible in child: {fds:?}"
    );
    assert_eq!(&fds[..3], &[0, 1, 2]);
}
