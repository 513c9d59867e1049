use std::fmt;

use thiserror::Error;

use crate::endpoint::Endpoint;
use crate::model::ApiErrorBody;

/// Everything a client operation can fail with.
#[derive(Debug, Error)]
pub enum BreezometerError {
    /// The caller's parameters were rejected; no request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every attempt failed transiently.
    #[error("{endpoint} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        endpoint: Endpoint,
        attempts: u32,
        last: AttemptFailure,
    },

    /// The service answered with an error payload that retrying won't fix.
    #[error("{endpoint} returned application error {}: {}", .error.code, .error.describe())]
    Application {
        endpoint: Endpoint,
        error: ApiErrorBody,
    },
}

impl BreezometerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, BreezometerError::Validation(_))
    }
}

/// Why a single attempt was counted against the retry budget.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("could not decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(reqwest::Error),

    #[error("invalid base url '{url}': {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Request URLs carry the access key; they never leave the transport.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.without_url())
    }
}

/// A rejected request, listing every offending field.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, violation: Violation) -> Self {
        Self {
            issues: vec![FieldIssue::new(field, violation)],
        }
    }

    /// True if any issue concerns `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }

    pub fn violation_for(&self, field: &str) -> Option<&Violation> {
        self.issues
            .iter()
            .find(|issue| issue.field == field)
            .map(|issue| &issue.violation)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid request: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub violation: Violation,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, violation: Violation) -> Self {
        Self {
            field: field.into(),
            violation,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' {}", self.field, self.violation)
    }
}

/// The constraint a field broke.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    NotAnObject,
    Required,
    NotAllowed,
    Forbidden,
    NotANumber,
    NotAnInteger,
    NotABoolean,
    NotAString,
    NotADate,
    NotAnArray,
    OutOfRange { min: f64, max: f64 },
    NotOneOf { allowed: &'static [&'static str] },
    Empty,
    TooMany { max: usize },
    Duplicate { value: String },
    TooEarly { min: String },
    TooLate { max: String },
    Conflicts { with: String },
    MissingPeer { peer: &'static str },
    MissingOneOf { fields: &'static [&'static str] },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotAnObject => f.write_str("must be an object"),
            Violation::Required => f.write_str("is required"),
            Violation::NotAllowed => f.write_str("is not allowed"),
            Violation::Forbidden => f.write_str("is supplied by the client and must not be set"),
            Violation::NotANumber => f.write_str("must be a number"),
            Violation::NotAnInteger => f.write_str("must be an integer"),
            Violation::NotABoolean => f.write_str("must be a boolean"),
            Violation::NotAString => f.write_str("must be a string"),
            Violation::NotADate => f.write_str("must be a valid date"),
            Violation::NotAnArray => f.write_str("must be an array"),
            Violation::OutOfRange { min, max } => write!(f, "must be between {min} and {max}"),
            Violation::NotOneOf { allowed } => write!(f, "must be one of [{}]", allowed.join(", ")),
            Violation::Empty => f.write_str("must contain at least 1 item"),
            Violation::TooMany { max } => write!(f, "must contain at most {max} items"),
            Violation::Duplicate { value } => write!(f, "contains duplicate value '{value}'"),
            Violation::TooEarly { min } => write!(f, "must be at or after {min}"),
            Violation::TooLate { max } => write!(f, "must be at or before {max}"),
            Violation::Conflicts { with } => write!(f, "conflicts with '{with}'"),
            Violation::MissingPeer { peer } => write!(f, "requires '{peer}'"),
            Violation::MissingOneOf { fields } => {
                write!(f, "exactly one of [{}] is required", fields.join(", "))
            }
        }
    }
}
