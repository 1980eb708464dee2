//! Error types for the API client core.
//!
//! # Design
//! Each concern gets its own enum so callers can match on exactly the
//! failures an operation can produce: `ParseError` for apiDoc text,
//! `ApiError` for traversal and HTTP round-trips, `TaskIdError` for CLI id
//! expressions and `CacheError` for the on-disk documentation cache.
//!
//! `ApiError::NotFound` is reserved for lookups against the endpoint tree.
//! A 404 returned by the server is an `ApiError::Api` carrying the status,
//! like every other non-2xx response.

use std::path::PathBuf;

use thiserror::Error;

/// Hard failures while parsing apiDoc text. Recoverable fragments are
/// skipped and reported through `ParsedDoc::skipped` instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A parameter or success line appeared before any endpoint header.
    #[error("line {line}: `{text}` cannot be associated with an endpoint")]
    Unassociated { line: usize, text: String },

    /// One endpoint declared two different success status codes.
    #[error("line {line}: endpoint {endpoint} declares status {second} but already declared {first}")]
    ConflictingStatus {
        line: usize,
        endpoint: String,
        first: u16,
        second: u16,
    },

    /// The input produced no endpoint records at all.
    #[error("no endpoints found in api documentation")]
    Empty,
}

/// A network-level failure: DNS, refused connection, timeout, broken body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Errors returned by `ApiProxy` and the documentation fetcher.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The traversal or method is absent from the endpoint tree.
    #[error("not found: {0}")]
    NotFound(String),

    /// A mandatory query parameter documented for the endpoint was not given.
    #[error("mandatory parameter `{name}` is missing for {endpoint}")]
    MissingParameter { name: String, endpoint: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// A 2xx status other than the documented one, in strict mode.
    #[error("got status {status} but {expected} was expected for {endpoint}")]
    UnexpectedStatus {
        status: u16,
        expected: u16,
        endpoint: String,
    },

    /// The configured base URL cannot carry a path.
    #[error("invalid base url `{0}`")]
    InvalidUrl(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body could not be decoded as JSON.
    #[error("deserialization failed: {0}")]
    Decode(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Errors from the task-id expression parser.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskIdError {
    /// A range whose lower bound exceeds its upper bound.
    #[error("invalid range {low}-{high}: lower bound is greater than upper bound")]
    Range { low: u32, high: u32 },

    /// A token that is neither a positive integer nor a range.
    #[error("invalid task id `{0}`")]
    Format(String),

    /// The expression expands to more ids than `MAX_TASK_IDS`.
    #[error("task id expression expands to more than {limit} ids")]
    TooMany { limit: usize },
}

/// Errors from the apiDoc cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetching api documentation failed: {0}")]
    Fetch(#[from] ApiError),

    /// The download succeeded but is not apiDoc text.
    #[error("downloaded api documentation is unusable: {0}")]
    Invalid(#[from] ParseError),
}
