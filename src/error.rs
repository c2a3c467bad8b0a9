use std::{io, path::PathBuf};

use thiserror::Error;

use crate::superset::ResourceKind;

/// Everything that can go wrong while talking to Superset, the backend,
/// or the file we patch.
#[derive(Debug, Error)]
pub enum Error {
    /// The request never got a response: timeout, refused connection, DNS.
    #[error("could not reach {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The readiness poller ran out of attempts.
    #[error("{url} did not become ready after {attempts} attempts")]
    Unavailable { url: String, attempts: u32 },

    /// Every login strategy failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The list endpoint was fine, but the create request was rejected.
    #[error("could not create {kind} {name:?}: server returned {status}: {body}")]
    CreationFailed {
        kind: ResourceKind,
        name: String,
        status: u16,
        body: String,
    },

    /// The server answered, but not with anything we can use.
    #[error("unexpected response from {path}: {reason}")]
    UnexpectedResponse { path: String, reason: String },

    #[error("could not patch {}: {source}", path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to write {0:?} into a string constant")]
    InvalidPatchValue(String),

    #[error("invalid token: {0}")]
    Token(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error should stop the whole run.
    ///
    /// Only reaching the service and logging in are prerequisites; anything
    /// after that is reported and the run moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connectivity { .. }
                | Error::Unavailable { .. }
                | Error::Authentication(_)
                | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
