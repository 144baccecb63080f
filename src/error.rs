
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Unexpected: {0}")]
    Unexpected(String),
    #[error("Not supported: {0}")]
    NotSupported(&'static str),
    #[error("Unresolved {kind} handle: {id}")]
    Unresolved { kind: &'static str, id: u32 },
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Arbitrary element not allowed")]
    ArbitraryElementNotAllowed,
    #[error("Invalid argument type for {predicate}: {found}")]
    InvalidArgumentType { predicate: &'static str, found: String },
    #[error("Thrown: {0}")]
    Thrown(String),
    #[error("Thread could not be spawned: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    #[error("Thread panicked: {0}")]
    ThreadPanicked(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Archive error: {0}")]
    Archive(String),
}

impl KernelError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
    /// Cancellation is absorbed at thread joins and otherwise ends the statement.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
    /// Programming errors which are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unexpected(_) | Self::NotSupported(_) | Self::Unresolved { .. } | Self::Lock(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

// Helper conversions
impl From<config::ConfigError> for KernelError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self { Self::Archive(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for KernelError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
