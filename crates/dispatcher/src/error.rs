//! Errors raised while wiring sinks into a dispatcher

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The `[[sinks]]` entry could not be turned into a running sink
    #[error("sink '{name}' rejected: {message}")]
    SinkCreation { name: String, message: String },

    /// Sink names key the metrics map, so they must be unique
    #[error("sink '{name}' is configured more than once")]
    DuplicateSink { name: String },

    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Name of the sink the error refers to, when there is one
    pub fn sink_name(&self) -> Option<&str> {
        match self {
            Self::SinkCreation { name, .. } | Self::DuplicateSink { name } => Some(name),
            Self::Contract(_) => None,
        }
    }
}
