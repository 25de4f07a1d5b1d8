//! Pipefail aggregation over a failing head stage.

use procpipe::Command;

fn sh(script: &str) -> Command {
    Command::new("/bin/sh").arg("-c").arg(script)
}

fn main() -> procpipe::Result<()> {
    let plain = (sh("exit 5") | sh("exit 0")).status()?;
    println!("pipefail off: {plain}");

    let strict = (sh("exit 5") | sh("exit 0")).pipefail(true).status()?;
    println!("pipefail on:  {strict}");
    Ok(())
}
