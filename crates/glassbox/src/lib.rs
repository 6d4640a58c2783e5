//! Run a program inside an OS-enforced resource boundary.
//!
//! The child is created suspended, bound to a fresh cgroup v2 group before
//! its first instruction executes, optionally capped on memory and CPU
//! rate, resumed, and waited on up to a wall-clock deadline. On timeout the
//! entire group is killed, so nothing the child spawned survives the run.
//!
//! The mechanism is fully synchronous: a run blocks the calling thread
//! until the child exits or the deadline elapses. Independent [`Sandbox`]
//! values share no state and may run concurrently from separate threads.
//!
//! Arguments are joined with single spaces and re-split on whitespace with
//! no quoting, so a token containing a space splits into two argv entries.
//!
//! ```no_run
//! use glassbox::Sandbox;
//!
//! let mut sandbox = Sandbox::new();
//! sandbox.set_memory_limit_mb(64);
//! let code = sandbox.run_with_timeout("/bin/sleep", &["5"], 200);
//! assert_eq!(code, glassbox::TIMEOUT_EXIT_CODE);
//! ```

mod cgroup;
mod config;
mod error;
mod launch;
mod sandbox;
mod stats;
mod supervise;

pub use cgroup::cgroups_available;
pub use config::SandboxConfig;
pub use error::{Result, SandboxError};
pub use sandbox::{FAILURE_EXIT_CODE, RunOutcome, RunReport, Sandbox, TIMEOUT_EXIT_CODE};
pub use stats::{EXIT_CODE_UNKNOWN, ProcessStats};
