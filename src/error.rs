use thiserror::Error;
use url::ParseError as UrlParseError;

/// Enumeration of all possible errors in the test-client context.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // Conform to https://rust-lang.github.io/api-guidelines/naming.html#names-use-a-consistent-word-order-c-word-order
    // Negative verb-object
    #[error("Invalid Url during parsing")]
    InvalidUrl(#[from] UrlParseError),
    #[error("Url is missing an authority/host component: {0}")]
    InvalidUrlHost(String),
    #[error("Event name is empty or whitespace-only")]
    InvalidEventName(),
    #[error("Payload text is empty")]
    InvalidPayloadText(),
    #[error("A listener already exists for event: {0}")]
    DuplicatedListener(String),
    #[error("Called an action before the connection was established")]
    IllegalActionBeforeOpen(),
    #[error("Transport rejected the emit: {0}")]
    FailedToEmit(String),
    #[error("Transport failure: {0}")]
    IncompleteTransport(String),
    #[error("No transport was configured for the client")]
    MissingTransport(),
    #[error("A lock was poisoned")]
    InvalidPoisonedLock(),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::InvalidPoisonedLock()
    }
}
