use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitiatorError {
    #[error("operation not supported on this platform: {0}")]
    Unsupported(String),

    #[error("no network access: '{command}' failed: stdout={stdout:?} stderr={stderr:?}")]
    NoNetworkAccess {
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("unrecognized iscsiadm output: {message}: {raw:?}")]
    MalformedOutput { message: String, raw: String },

    #[error("invalid iSCSI name: {0}")]
    InvalidIqn(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("command '{command}' failed with exit code {code:?}: stdout={stdout:?} stderr={stderr:?}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("failed to execute '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("no discovery address found for target '{0}'")]
    DiscoveryUnresolved(String),

    #[error("no target discovered through {0}")]
    NoTargetDiscovered(String),

    #[error("target '{0}' not found")]
    TargetNotFound(String),
}

impl InitiatorError {
    pub(crate) fn malformed(message: impl Into<String>, raw: impl Into<String>) -> Self {
        InitiatorError::MalformedOutput {
            message: message.into(),
            raw: raw.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InitiatorError>;
