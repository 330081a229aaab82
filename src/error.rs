use std::fmt;

use thiserror::Error;

use crate::types::Identifier;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Navigation to a resolved destination failed; carries the identifier
    /// the caller asked for and the underlying cause.
    #[error("failed to navigate to {identifier:?}: {source}")]
    Navigation {
        identifier: Identifier,
        #[source]
        source: Box<Error>,
    },

    #[error("login as {username:?} failed: {kind}")]
    Login {
        kind: LoginErrorKind,
        username: String,
    },

    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error("cannot convert {identifier:?} into a {target} reference")]
    Conversion {
        identifier: Identifier,
        target: RefKind,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap any failure into a navigation failure for the given identifier.
    pub fn navigation(identifier: Identifier, source: Error) -> Self {
        Error::Navigation {
            identifier,
            source: Box::new(source),
        }
    }
}

/// What the login page reported when authentication did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginErrorKind {
    WrongCredentials,
    RateLimited,
    AccountNotFound,
    UnusualActivity,
}

impl fmt::Display for LoginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LoginErrorKind::WrongCredentials => "wrong credentials",
            LoginErrorKind::RateLimited => "rate limited, wait before logging in again",
            LoginErrorKind::AccountNotFound => "account not found",
            LoginErrorKind::UnusualActivity => "unusual activity check triggered",
        };
        write!(f, "{text}")
    }
}

/// Generic driver faults: the page did not look or behave the way the
/// automation expected.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("expected element {selector:?} not found")]
    MissingElement { selector: String },

    #[error("timed out waiting for selector {selector:?}")]
    SelectorTimeout { selector: String },

    #[error("page destination does not exist: {url}")]
    DestinationMissing { url: String },

    #[error("failed to run script in page: {0}")]
    Evaluate(String),

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("extraction returned malformed data: {0}")]
    Malformed(String),

    #[error("failed to parse count {text:?}")]
    BadCount { text: String },
}

/// Precondition violations detected before an operation is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session is not running")]
    NotRunning,

    #[error("action queue has been stopped")]
    QueueStopped,
}

/// Reference kinds an identifier can be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    User,
    Post,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::User => write!(f, "user"),
            RefKind::Post => write!(f, "post"),
        }
    }
}
