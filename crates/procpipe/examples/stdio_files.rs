//! Redirect a child's streams to files.

use procpipe::{Command, FileSpec, OpenMode, Stdio};

fn main() -> procpipe::Result<()> {
    let dir = std::env::temp_dir();
    let out_path = dir.join("procpipe-demo-out.txt");
    let log_path = dir.join("procpipe-demo-log.txt");

    Command::new("/bin/sh")
        .arg("-c")
        .arg("echo first run")
        .stdout(Stdio::file(&out_path))
        .status()?;

    for _ in 0..2 {
        Command::new("/bin/sh")
            .arg("-c")
            .arg("date")
            .stdout(FileSpec::new(&log_path).mode(OpenMode::WriteAppend).into())
            .status()?;
    }

    println!("wrote {} and appended to {}", out_path.display(), log_path.display());
    Ok(())
}
