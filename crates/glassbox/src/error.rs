#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The child process could not be created or never reached its entry
    /// point.
    #[error("launch failed: {0}")]
    Spawn(String),

    /// The resource group could not be created.
    #[error("resource group creation failed: {0}")]
    Group(String),

    /// The suspended child could not be bound to its resource group. The
    /// child never executes in this case.
    #[error("resource group attach failed: {0}")]
    Attach(String),

    /// Waiting for the child, or retrieving its exit status, failed.
    #[error("wait failed: {0}")]
    Wait(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
