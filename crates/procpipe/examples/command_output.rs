//! Capture a command's stdout and stderr.

use procpipe::Command;

fn main() -> procpipe::Result<()> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg("echo to-stdout; echo to-stderr >&2")
        .output()?;

    println!("status: {}", output.status);
    println!("stdout: {}", String::from_utf8_lossy(&output.stdout).trim_end());
    println!("stderr: {}", String::from_utf8_lossy(&output.stderr).trim_end());
    Ok(())
}
