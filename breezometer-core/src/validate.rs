//! Request validation.
//!
//! Callers hand in loosely typed JSON (numbers may arrive as strings, dates as
//! RFC 3339 text or epoch milliseconds). Each endpoint's [`EndpointSchema`]
//! decides which fields are allowed and how they are bounded; the result is a
//! strictly typed [`ValidatedRequest`] or a [`ValidationError`] naming every
//! field that failed.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::endpoint::{Endpoint, EndpointSchema, FeatureRule, TimeBound, TimeWindowRule};
use crate::error::{FieldIssue, ValidationError, Violation};

/// Clock skew, in seconds, tolerated when comparing timestamps against "now".
pub const NOW_BUFFER_SECS: i64 = 60;

/// Field the client injects from configuration; callers may never set it.
pub const ACCESS_KEY_FIELD: &str = "key";

const WINDOW_FIELDS: &[&str] = &["datetime", "start_datetime", "hours"];
const UNITS: &[&str] = &["metric", "imperial"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Instant(DateTime<Utc>),
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Hours(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub language: Option<&'static str>,
    pub features: Option<Vec<&'static str>>,
    pub metadata: Option<bool>,
    pub window: Option<TimeWindow>,
    pub days: Option<u32>,
    pub units: Option<Units>,
    pub radius: Option<f64>,
}

/// Validate `params` against `endpoint`'s schema, measuring time bounds from `now`.
pub fn validate(
    endpoint: Endpoint,
    params: &Value,
    now: DateTime<Utc>,
) -> Result<ValidatedRequest, ValidationError> {
    let Some(obj) = params.as_object() else {
        return Err(ValidationError::single("value", Violation::NotAnObject));
    };

    let schema = endpoint.schema();
    let mut v = Validator {
        obj,
        issues: Vec::new(),
    };

    v.reject_unknown_keys(schema);
    if obj.contains_key(ACCESS_KEY_FIELD) {
        v.issue(ACCESS_KEY_FIELD, Violation::Forbidden);
    }

    let latitude = v.required_number("lat", -90.0, 90.0);
    let longitude = v.required_number("lon", -180.0, 180.0);
    let language = v.language(schema.languages);
    let features = schema.features.and_then(|rule| v.features(rule));
    let metadata = v.boolean("metadata");
    let window = schema
        .time_window
        .and_then(|rule| v.time_window(rule, now));

    let days = schema.days.and_then(|rule| {
        let days = v.required_number("days", f64::from(rule.min), f64::from(rule.max))?;
        v.integer("days", days)
    });

    let (units, radius) = match schema.radius {
        Some(rule) => {
            let units = v.units();
            let max = match units {
                Some(Units::Imperial) => rule.imperial_max,
                _ => rule.metric_max,
            };
            (units, v.optional_number("radius", 1.0, max))
        }
        None => (None, None),
    };

    if !v.issues.is_empty() {
        return Err(ValidationError { issues: v.issues });
    }

    // Every required field produced a value or an issue, so these hold here.
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Ok(ValidatedRequest {
            latitude,
            longitude,
            language,
            features,
            metadata,
            window,
            days,
            units,
            radius,
        }),
        _ => Err(ValidationError::single("lat", Violation::Required)),
    }
}

struct Validator<'a> {
    obj: &'a Map<String, Value>,
    issues: Vec<FieldIssue>,
}

impl<'a> Validator<'a> {
    fn get(&self, field: &str) -> Option<&'a Value> {
        self.obj.get(field)
    }

    fn issue(&mut self, field: &str, violation: Violation) {
        self.issues.push(FieldIssue::new(field, violation));
    }

    fn reject_unknown_keys(&mut self, schema: &EndpointSchema) {
        let unknown: Vec<String> = self
            .obj
            .keys()
            .filter(|key| !is_known_key(schema, key))
            .cloned()
            .collect();

        for key in unknown {
            self.issue(&key, Violation::NotAllowed);
        }
    }

    /// Look up `field`, falling back to `alias`. Supplying both is a conflict.
    fn lookup(&mut self, field: &str, alias: Option<&str>) -> Option<&'a Value> {
        let primary = self.get(field);
        let aliased = alias.and_then(|a| self.get(a).map(|value| (a, value)));

        match (primary, aliased) {
            (Some(_), Some((a, _))) => {
                self.issues.push(FieldIssue::new(
                    field,
                    Violation::Conflicts {
                        with: a.to_string(),
                    },
                ));
                None
            }
            (Some(value), None) => Some(value),
            (None, Some((_, value))) => Some(value),
            (None, None) => None,
        }
    }

    fn required_number(&mut self, field: &str, min: f64, max: f64) -> Option<f64> {
        match self.get(field) {
            None => {
                self.issue(field, Violation::Required);
                None
            }
            Some(_) => self.optional_number(field, min, max),
        }
    }

    fn optional_number(&mut self, field: &str, min: f64, max: f64) -> Option<f64> {
        let value = self.get(field)?;
        let Some(n) = coerce_number(value) else {
            self.issue(field, Violation::NotANumber);
            return None;
        };

        if n < min || n > max {
            self.issue(field, Violation::OutOfRange { min, max });
            return None;
        }
        Some(n)
    }

    fn integer(&mut self, field: &str, n: f64) -> Option<u32> {
        if n.fract() != 0.0 {
            self.issue(field, Violation::NotAnInteger);
            return None;
        }
        // Range checks run first, so the value fits.
        Some(n as u32)
    }

    fn boolean(&mut self, field: &str) -> Option<bool> {
        match self.get(field)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s == "true" => Some(true),
            Value::String(s) if s == "false" => Some(false),
            _ => {
                self.issue(field, Violation::NotABoolean);
                None
            }
        }
    }

    fn language(&mut self, allowed: &'static [&'static str]) -> Option<&'static str> {
        match self.get("lang")? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => match allowed.iter().find(|lang| **lang == s) {
                Some(lang) => Some(*lang),
                None => {
                    self.issue("lang", Violation::NotOneOf { allowed });
                    None
                }
            },
            _ => {
                self.issue("lang", Violation::NotAString);
                None
            }
        }
    }

    fn features(&mut self, rule: FeatureRule) -> Option<Vec<&'static str>> {
        let items: Vec<&'a Value> = match self.get("features")? {
            Value::Array(items) => items.iter().collect(),
            single @ Value::String(_) => vec![single],
            _ => {
                self.issue("features", Violation::NotAnArray);
                return None;
            }
        };

        if items.is_empty() {
            self.issue("features", Violation::Empty);
            return None;
        }
        if items.len() > rule.max_items {
            self.issue(
                "features",
                Violation::TooMany {
                    max: rule.max_items,
                },
            );
            return None;
        }

        let mut features: Vec<&'static str> = Vec::with_capacity(items.len());
        let mut ok = true;
        for item in items {
            let Value::String(name) = item else {
                self.issue("features", Violation::NotAString);
                ok = false;
                continue;
            };
            match rule.allowed.iter().find(|f| **f == name) {
                Some(feature) if features.contains(feature) => {
                    self.issue(
                        "features",
                        Violation::Duplicate {
                            value: name.clone(),
                        },
                    );
                    ok = false;
                }
                Some(feature) => features.push(feature),
                None => {
                    self.issue(
                        "features",
                        Violation::NotOneOf {
                            allowed: rule.allowed,
                        },
                    );
                    ok = false;
                }
            }
        }

        ok.then_some(features)
    }

    fn units(&mut self) -> Option<Units> {
        match self.get("units")? {
            Value::String(s) if s == "metric" => Some(Units::Metric),
            Value::String(s) if s == "imperial" => Some(Units::Imperial),
            _ => {
                self.issue("units", Violation::NotOneOf { allowed: UNITS });
                None
            }
        }
    }

    fn timestamp(&mut self, field: &str, alias: Option<&str>) -> Presence<DateTime<Utc>> {
        let Some(value) = self.lookup(field, alias) else {
            return if self.obj.contains_key(field) {
                Presence::Invalid
            } else {
                Presence::Absent
            };
        };
        match coerce_timestamp(value) {
            Some(ts) => Presence::Valid(ts),
            None => {
                self.issue(field, Violation::NotADate);
                Presence::Invalid
            }
        }
    }

    fn hours(&mut self, max: u32) -> Presence<u32> {
        if !self.obj.contains_key("hours") {
            return Presence::Absent;
        }
        self.required_number("hours", 1.0, f64::from(max))
            .and_then(|n| self.integer("hours", n))
            .map_or(Presence::Invalid, Presence::Valid)
    }

    fn time_window(&mut self, rule: TimeWindowRule, now: DateTime<Utc>) -> Option<TimeWindow> {
        let instant = self.timestamp("datetime", rule.datetime_alias.then_some("dateTime"));
        let start = self.timestamp("start_datetime", Some("startDate"));
        let end = self.timestamp("end_datetime", Some("endDate"));
        let hours = self.hours(rule.max_hours);

        match (start.is_present(), end.is_present()) {
            (true, false) => self.issue(
                "start_datetime",
                Violation::MissingPeer {
                    peer: "end_datetime",
                },
            ),
            (false, true) => self.issue(
                "end_datetime",
                Violation::MissingPeer {
                    peer: "start_datetime",
                },
            ),
            _ => {}
        }

        let has_range = start.is_present() || end.is_present();
        let chosen = [instant.is_present(), has_range, hours.is_present()]
            .iter()
            .filter(|present| **present)
            .count();

        if chosen == 0 {
            self.issue(
                "datetime",
                Violation::MissingOneOf {
                    fields: WINDOW_FIELDS,
                },
            );
            return None;
        }
        if instant.is_present() && has_range {
            self.issue(
                "datetime",
                Violation::Conflicts {
                    with: "start_datetime".into(),
                },
            );
        }
        if instant.is_present() && hours.is_present() {
            self.issue(
                "datetime",
                Violation::Conflicts {
                    with: "hours".into(),
                },
            );
        }
        if hours.is_present() && has_range {
            self.issue(
                "hours",
                Violation::Conflicts {
                    with: "start_datetime".into(),
                },
            );
        }
        if chosen > 1 {
            return None;
        }

        let limit = now - TimeDelta::seconds(NOW_BUFFER_SECS);
        if let Presence::Valid(at) = instant {
            return self
                .bounded("datetime", at, limit, rule.bound)
                .then_some(TimeWindow::Instant(at));
        }
        if let Presence::Valid(h) = hours {
            return Some(TimeWindow::Hours(h));
        }
        if let (Presence::Valid(start), Presence::Valid(end)) = (start, end) {
            let ok = match rule.bound {
                TimeBound::Past => {
                    let end_ok = self.bounded("end_datetime", end, limit, rule.bound);
                    let order_ok = start <= end;
                    if !order_ok {
                        self.issue("start_datetime", Violation::TooLate { max: format_ts(end) });
                    }
                    end_ok && order_ok
                }
                TimeBound::Future => {
                    let start_ok = self.bounded("start_datetime", start, limit, rule.bound);
                    let order_ok = end >= start;
                    if !order_ok {
                        self.issue(
                            "end_datetime",
                            Violation::TooEarly {
                                min: format_ts(start),
                            },
                        );
                    }
                    start_ok && order_ok
                }
            };
            return ok.then_some(TimeWindow::Range { start, end });
        }
        None
    }

    /// Check `ts` against `limit` in the direction `bound` demands.
    fn bounded(
        &mut self,
        field: &str,
        ts: DateTime<Utc>,
        limit: DateTime<Utc>,
        bound: TimeBound,
    ) -> bool {
        match bound {
            TimeBound::Past if ts > limit => {
                self.issue(
                    field,
                    Violation::TooLate {
                        max: format_ts(limit),
                    },
                );
                false
            }
            TimeBound::Future if ts < limit => {
                self.issue(
                    field,
                    Violation::TooEarly {
                        min: format_ts(limit),
                    },
                );
                false
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Presence<T> {
    Absent,
    Invalid,
    Valid(T),
}

impl<T> Presence<T> {
    fn is_present(&self) -> bool {
        !matches!(self, Presence::Absent)
    }
}

fn is_known_key(schema: &EndpointSchema, key: &str) -> bool {
    match key {
        "lat" | "lon" | "lang" | "metadata" | ACCESS_KEY_FIELD => true,
        "features" => schema.features.is_some(),
        "days" => schema.days.is_some(),
        "units" | "radius" => schema.radius.is_some(),
        "datetime" | "start_datetime" | "end_datetime" | "hours" | "startDate" | "endDate" => {
            schema.time_window.is_some()
        }
        "dateTime" => schema.time_window.is_some_and(|rule| rule.datetime_alias),
        _ => false,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
