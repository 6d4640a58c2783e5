//! CPU-cap demo: a hashing hog held to a quarter of one CPU for 5 seconds.

use glassbox::Sandbox;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut sandbox = Sandbox::new();
    sandbox.set_cpu_percent(25);
    let code = sandbox.run_with_timeout("/usr/bin/sha256sum", &["/dev/zero"], 5000);
    println!("process exited with code {code}");
    if let Some(stats) = sandbox.last_stats() {
        if let Some(peak) = stats.peak_memory_bytes {
            println!("peak memory: {peak} bytes");
        }
        if let Some(user) = stats.user_time_100ns {
            println!("user time: {user} (100ns)");
        }
        if let Some(kernel) = stats.kernel_time_100ns {
            println!("kernel time: {kernel} (100ns)");
        }
    }
}
