//! Memory-ceiling demo: the group is capped at 64 MB.

use glassbox::Sandbox;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut sandbox = Sandbox::new();
    sandbox.set_memory_limit_mb(64);
    let code = sandbox.run("/bin/ls", &["/"]);
    println!("process exited with code {code}");
    if let Some(stats) = sandbox.last_stats() {
        if let Some(peak) = stats.peak_memory_bytes {
            println!("peak memory: {peak} bytes");
        }
    }
}
