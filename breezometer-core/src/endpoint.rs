//! Static per-endpoint request schemas.

use std::fmt;

use crate::model::UnsupportedCode;

/// Longest hour count accepted by the hourly air quality endpoints.
pub const MAX_HOURS: u32 = 96;

pub const AIR_QUALITY_FEATURES: &[&str] = &[
    "breezometer_aqi",
    "local_aqi",
    "health_recommendations",
    "sources_and_effects",
    "dominant_pollutant_concentrations",
    "pollutants_concentrations",
    "pollutants_aqi_information",
];

pub const POLLEN_FEATURES: &[&str] = &["types_information", "plants_information"];

const AIR_QUALITY_LANGUAGES: &[&str] = &["en", "fr"];
const ENGLISH_ONLY: &[&str] = &["en"];

const AIR_QUALITY_UNSUPPORTED: &[UnsupportedCode] =
    &[UnsupportedCode::Number(20), UnsupportedCode::Number(21)];
const LOCATION_UNSUPPORTED: &[UnsupportedCode] = &[UnsupportedCode::Text("location_unsupported")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CurrentConditions,
    HistoricalHourly,
    ForecastHourly,
    DailyPollenForecast,
    CurrentFireConditions,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::CurrentConditions => "current-conditions",
            Endpoint::HistoricalHourly => "historical-hourly",
            Endpoint::ForecastHourly => "forecast-hourly",
            Endpoint::DailyPollenForecast => "pollen-daily-forecast",
            Endpoint::CurrentFireConditions => "fire-current-conditions",
        }
    }

    pub const fn all() -> &'static [Endpoint] {
        &[
            Endpoint::CurrentConditions,
            Endpoint::HistoricalHourly,
            Endpoint::ForecastHourly,
            Endpoint::DailyPollenForecast,
            Endpoint::CurrentFireConditions,
        ]
    }

    /// Path relative to the configured base URL.
    pub fn path(&self) -> &'static str {
        self.schema().path
    }

    pub fn schema(&self) -> &'static EndpointSchema {
        match self {
            Endpoint::CurrentConditions => &CURRENT_CONDITIONS,
            Endpoint::HistoricalHourly => &HISTORICAL_HOURLY,
            Endpoint::ForecastHourly => &FORECAST_HOURLY,
            Endpoint::DailyPollenForecast => &DAILY_POLLEN_FORECAST,
            Endpoint::CurrentFireConditions => &CURRENT_FIRE_CONDITIONS,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Endpoint {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        Endpoint::all()
            .iter()
            .copied()
            .find(|endpoint| endpoint.as_str() == lower)
            .ok_or_else(|| {
                let known: Vec<_> = Endpoint::all().iter().map(Endpoint::as_str).collect();
                anyhow::anyhow!(
                    "Unknown endpoint '{value}'. Supported endpoints: {}.",
                    known.join(", ")
                )
            })
    }
}

/// Which temporal bound applies to an endpoint's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    /// Timestamps must not be later than now (minus the skew buffer).
    Past,
    /// Timestamps must not be earlier than now (minus the skew buffer).
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindowRule {
    pub bound: TimeBound,
    /// Whether the camelCase `dateTime` alias is accepted for `datetime`.
    pub datetime_alias: bool,
    pub max_hours: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRule {
    pub allowed: &'static [&'static str],
    pub max_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaysRule {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusRule {
    pub metric_max: f64,
    pub imperial_max: f64,
}

/// Everything the validator needs to know about one endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointSchema {
    pub path: &'static str,
    pub languages: &'static [&'static str],
    pub features: Option<FeatureRule>,
    pub time_window: Option<TimeWindowRule>,
    pub days: Option<DaysRule>,
    pub radius: Option<RadiusRule>,
    pub unsupported_codes: &'static [UnsupportedCode],
}

impl EndpointSchema {
    pub fn is_unsupported(&self, code: &crate::model::ErrorCode) -> bool {
        self.unsupported_codes.iter().any(|c| c.matches(code))
    }
}

const CURRENT_CONDITIONS: EndpointSchema = EndpointSchema {
    path: "air-quality/v2/current-conditions",
    languages: AIR_QUALITY_LANGUAGES,
    features: Some(FeatureRule {
        allowed: AIR_QUALITY_FEATURES,
        max_items: 7,
    }),
    time_window: None,
    days: None,
    radius: None,
    unsupported_codes: AIR_QUALITY_UNSUPPORTED,
};

const HISTORICAL_HOURLY: EndpointSchema = EndpointSchema {
    path: "air-quality/v2/historical/hourly",
    languages: AIR_QUALITY_LANGUAGES,
    features: Some(FeatureRule {
        allowed: AIR_QUALITY_FEATURES,
        max_items: 7,
    }),
    time_window: Some(TimeWindowRule {
        bound: TimeBound::Past,
        datetime_alias: true,
        max_hours: MAX_HOURS,
    }),
    days: None,
    radius: None,
    unsupported_codes: AIR_QUALITY_UNSUPPORTED,
};

// The forecast API documents up to 15 features but only the seven air quality
// values are recognised, so the enum is what bounds the list in practice.
const FORECAST_HOURLY: EndpointSchema = EndpointSchema {
    path: "air-quality/v2/forecast/hourly",
    languages: AIR_QUALITY_LANGUAGES,
    features: Some(FeatureRule {
        allowed: AIR_QUALITY_FEATURES,
        max_items: 15,
    }),
    time_window: Some(TimeWindowRule {
        bound: TimeBound::Future,
        datetime_alias: false,
        max_hours: MAX_HOURS,
    }),
    days: None,
    radius: None,
    unsupported_codes: AIR_QUALITY_UNSUPPORTED,
};

const DAILY_POLLEN_FORECAST: EndpointSchema = EndpointSchema {
    path: "pollen/v2/forecast/daily",
    languages: ENGLISH_ONLY,
    features: Some(FeatureRule {
        allowed: POLLEN_FEATURES,
        max_items: 2,
    }),
    time_window: None,
    days: Some(DaysRule { min: 1, max: 3 }),
    radius: None,
    unsupported_codes: LOCATION_UNSUPPORTED,
};

const CURRENT_FIRE_CONDITIONS: EndpointSchema = EndpointSchema {
    path: "fires/v1/current-conditions",
    languages: ENGLISH_ONLY,
    features: None,
    time_window: None,
    days: None,
    radius: Some(RadiusRule {
        metric_max: 100.0,
        imperial_max: 62.0,
    }),
    unsupported_codes: LOCATION_UNSUPPORTED,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorCode;

    #[test]
    fn endpoint_as_str_roundtrip() {
        for endpoint in Endpoint::all() {
            let parsed = Endpoint::try_from(endpoint.as_str()).expect("roundtrip should succeed");
            assert_eq!(*endpoint, parsed);
        }
    }

    #[test]
    fn unknown_endpoint_error() {
        let err = Endpoint::try_from("weather").unwrap_err();
        assert!(err.to_string().contains("Unknown endpoint"));
    }

    #[test]
    fn paths_are_relative_to_base_url() {
        for endpoint in Endpoint::all() {
            assert!(!endpoint.path().starts_with('/'), "{endpoint}");
        }
        assert_eq!(
            Endpoint::HistoricalHourly.path(),
            "air-quality/v2/historical/hourly"
        );
    }

    #[test]
    fn unsupported_codes_differ_by_domain() {
        let aq = Endpoint::CurrentConditions.schema();
        assert!(aq.is_unsupported(&ErrorCode::Number(20)));
        assert!(aq.is_unsupported(&ErrorCode::Number(21)));
        assert!(!aq.is_unsupported(&ErrorCode::Number(22)));

        let pollen = Endpoint::DailyPollenForecast.schema();
        assert!(pollen.is_unsupported(&ErrorCode::Text("location_unsupported".into())));
        assert!(!pollen.is_unsupported(&ErrorCode::Number(20)));
    }

    #[test]
    fn only_hourly_air_quality_has_time_window() {
        let with_window: Vec<_> = Endpoint::all()
            .iter()
            .filter(|e| e.schema().time_window.is_some())
            .collect();
        assert_eq!(
            with_window,
            vec![&Endpoint::HistoricalHourly, &Endpoint::ForecastHourly]
        );
    }
}
