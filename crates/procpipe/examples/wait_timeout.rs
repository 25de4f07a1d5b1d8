//! Bounded wait with terminate-then-kill escalation.

use std::time::{Duration, Instant};

use procpipe::{Command, WaitOptions};

fn main() -> procpipe::Result<()> {
    let mut child = Command::new("sleep").arg("30").spawn()?;
    println!("spawned pid {}", child.id());

    let started = Instant::now();
    let result = child.wait_with(WaitOptions {
        timeout: Some(Duration::from_millis(250)),
        kill_grace: Duration::from_millis(200),
    });

    match result {
        Ok(status) => println!("finished in time: {status}"),
        Err(err) => println!("gave up after {:?}: {err}", started.elapsed()),
    }
    Ok(())
}
