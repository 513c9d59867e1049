use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A successful response: the requested data plus optional request metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report<T> {
    #[serde(default)]
    pub metadata: Option<Value>,
    pub data: T,
}

/// One observation or prediction. The `datetime` field is parsed; every other
/// field the service returns is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Snapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Historical queries return one snapshot for an instant and a list for
/// ranges or hour counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type CurrentConditions = Report<Snapshot>;
pub type HistoricalConditions = Report<OneOrMany<Snapshot>>;
pub type HourlyForecast = Report<Vec<Snapshot>>;
pub type PollenForecast = Report<Vec<Snapshot>>;
pub type FireConditions = Report<Snapshot>;

/// The body-level `error` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiErrorBody {
    pub fn describe(&self) -> &str {
        self.detail
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or("no details")
    }
}

/// Air quality endpoints report numeric codes, pollen and fire report text codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Number(n) => write!(f, "{n}"),
            ErrorCode::Text(s) => f.write_str(s),
        }
    }
}

/// A code the client treats as "no data for this location".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedCode {
    Number(i64),
    Text(&'static str),
}

impl UnsupportedCode {
    pub fn matches(&self, code: &ErrorCode) -> bool {
        match (self, code) {
            (UnsupportedCode::Number(a), ErrorCode::Number(b)) => a == b,
            (UnsupportedCode::Text(a), ErrorCode::Text(b)) => *a == b,
            _ => false,
        }
    }
}
