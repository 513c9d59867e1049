use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::validate::{TimeWindow, ValidatedRequest};

/// Wire format the service expects for timestamps (always UTC).
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Ordered `key=value` pairs ready for the URL query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_string(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Project a validated request into query parameters. The access key is not
/// part of the output; the client appends it.
pub fn normalize(request: &ValidatedRequest) -> QueryParams {
    let mut qs = QueryParams::default();

    qs.push("lat", request.latitude.to_string());
    qs.push("lon", request.longitude.to_string());

    if let Some(lang) = request.language {
        qs.push("lang", lang);
    }
    if let Some(features) = &request.features {
        qs.push("features", features.join(","));
    }
    if let Some(metadata) = request.metadata {
        qs.push("metadata", metadata.to_string());
    }
    if let Some(days) = request.days {
        qs.push("days", days.to_string());
    }
    if let Some(units) = request.units {
        qs.push("units", units.as_str());
    }
    if let Some(radius) = request.radius {
        qs.push("radius", radius.to_string());
    }

    // The service answers with the closest older report, at minute
    // granularity, so widen each bound to cover its whole minute.
    match request.window {
        Some(TimeWindow::Instant(at)) => {
            qs.push("datetime", format_datetime(end_of_minute(at)));
        }
        Some(TimeWindow::Range { start, end }) => {
            qs.push("start_datetime", format_datetime(start_of_minute(start)));
            qs.push("end_datetime", format_datetime(end_of_minute(end)));
        }
        Some(TimeWindow::Hours(hours)) => {
            qs.push("hours", hours.to_string());
        }
        None => {}
    }

    qs
}

pub fn format_datetime(ts: DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

pub fn start_of_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

pub fn end_of_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    start_of_minute(ts) + TimeDelta::milliseconds(59_999)
}
