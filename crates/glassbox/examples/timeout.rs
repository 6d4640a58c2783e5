//! Deadline demo: a sleeping child is cut off after 3 seconds.

use glassbox::Sandbox;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut sandbox = Sandbox::new();
    sandbox.set_timeout_ms(3000);
    let code = sandbox.run("/bin/sleep", &["30"]);
    println!("process exited with code {code}");
    if let Some(stats) = sandbox.last_stats() {
        println!("timed out: {}", stats.timed_out);
    }
}
