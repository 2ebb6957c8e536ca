use thiserror::Error;

/// The failure taxonomy of the design doc §7. Only the last six variants
/// abort the current sync task; `InputInvalid` is always logged and
/// swallowed by the caller, and `ReferenceMissing` is absorbed into the
/// model rather than propagated.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{kind} {namespace}/{name} '{key}' contains invalid {expected}: {cause}, ignoring")]
    InputInvalid {
        kind: &'static str,
        namespace: String,
        name: String,
        key: String,
        expected: &'static str,
        cause: String,
    },

    #[error("reference missing: {0}")]
    ReferenceMissing(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("reload failed: {0}")]
    ReloadFailed(String),

    #[error("runtime api failed: {0}")]
    RuntimeApiFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn input_invalid(
        kind: &'static str,
        namespace: &str,
        name: &str,
        key: &str,
        expected: &'static str,
        cause: impl ToString,
    ) -> Self {
        Error::InputInvalid {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            key: key.to_string(),
            expected,
            cause: cause.to_string(),
        }
    }

    /// False only for `InputInvalid`, which callers log and skip rather
    /// than propagate (design doc §7).
    pub fn aborts_task(&self) -> bool {
        !matches!(self, Error::InputInvalid { .. })
    }
}
