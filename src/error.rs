use thiserror::Error;

/// Failures surfaced at the tool seam.
///
/// Not-found and malformed-input errors are reported inline to the user and
/// never abort a request on their own. External failures come from the host
/// (process, network, model) and are converted into degraded results by the
/// callers that can tolerate them. `Io` and `Other` wrap filesystem and
/// workspace errors passed through with `?`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool {0} not found.")]
    NotFound(String),

    #[error("Invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{0}")]
    External(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolError {
    pub fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}
