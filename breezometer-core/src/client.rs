use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{
    config::Config,
    endpoint::Endpoint,
    error::BreezometerError,
    logger::{Logger, NoopLogger},
    model::{
        CurrentConditions, FireConditions, HistoricalConditions, HourlyForecast, PollenForecast,
        Report,
    },
    normalize::normalize,
    retry::{self, RetryPolicy},
    transport::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, ReqwestTransport, Transport},
    validate::{ACCESS_KEY_FIELD, validate},
};

/// Client for the Breezometer air quality, pollen and fire APIs.
///
/// Every operation validates its parameters before touching the network,
/// retries transient failures with exponential backoff, and returns
/// `Ok(None)` when the service has no data for the requested location.
/// Cloning is cheap; clones share the transport and logger.
#[derive(Debug, Clone)]
pub struct BreezometerClient {
    api_key: Arc<str>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    logger: Arc<dyn Logger>,
}

impl BreezometerClient {
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Construct a client from stored configuration.
    pub fn from_config(config: &Config, logger: Arc<dyn Logger>) -> anyhow::Result<Self> {
        Self::from_config_with_key(config, config.api_key(), logger)
    }

    fn from_config_with_key(
        config: &Config,
        api_key: Option<String>,
        logger: Arc<dyn Logger>,
    ) -> anyhow::Result<Self> {
        let api_key = api_key.ok_or_else(|| {
            anyhow!(
                "No Breezometer API key configured.\n\
                 Hint: run `breezometer configure` or set {}.",
                crate::config::API_KEY_ENV
            )
        })?;

        let mut builder = Self::builder(api_key)
            .base_url(config.base_url())
            .timeout(config.timeout())
            .retry_policy(config.retry_policy())
            .logger(logger);
        for (name, value) in &config.headers {
            builder = builder.header(name, value);
        }
        builder.build()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Current air quality at `lat`/`lon`.
    ///
    /// Accepts `lat`, `lon`, `lang`, `features` and `metadata`.
    pub async fn current_conditions(
        &self,
        params: &Value,
    ) -> Result<Option<CurrentConditions>, BreezometerError> {
        self.call(Endpoint::CurrentConditions, params).await
    }

    /// Hourly air quality in the past, for one instant (`datetime`), a range
    /// (`start_datetime`/`end_datetime`) or the last `hours` hours.
    pub async fn historical_hourly(
        &self,
        params: &Value,
    ) -> Result<Option<HistoricalConditions>, BreezometerError> {
        self.call(Endpoint::HistoricalHourly, params).await
    }

    /// Hourly air quality forecast; same time window fields as
    /// [`historical_hourly`](Self::historical_hourly), bounded to the future.
    pub async fn forecast_hourly(
        &self,
        params: &Value,
    ) -> Result<Option<HourlyForecast>, BreezometerError> {
        self.call(Endpoint::ForecastHourly, params).await
    }

    /// Daily pollen forecast for the next `days` (1 to 3) days.
    pub async fn daily_pollen_forecast(
        &self,
        params: &Value,
    ) -> Result<Option<PollenForecast>, BreezometerError> {
        self.call(Endpoint::DailyPollenForecast, params).await
    }

    /// Active fires within `radius` of `lat`/`lon`.
    pub async fn current_fire_conditions(
        &self,
        params: &Value,
    ) -> Result<Option<FireConditions>, BreezometerError> {
        self.call(Endpoint::CurrentFireConditions, params).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        params: &Value,
    ) -> Result<Option<Report<T>>, BreezometerError> {
        let request = validate(endpoint, params, Utc::now()).inspect_err(|e| {
            self.logger.debug(
                &json!({ "endpoint": endpoint.as_str(), "reason": e.to_string() }),
                "Rejected Breezometer request",
            );
        })?;

        let mut query = normalize(&request);
        query.push(ACCESS_KEY_FIELD, &*self.api_key);

        retry::execute(
            self.transport.as_ref(),
            endpoint,
            &query,
            &self.retry,
            self.logger.as_ref(),
        )
        .await
    }
}

pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    headers: HashMap<String, String>,
    logger: Arc<dyn Logger>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            headers: HashMap::new(),
            logger: Arc::new(NoopLogger),
            transport: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-request timeout; there is no overall budget across retries.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the HTTP transport. Base URL, timeout and headers are then ignored.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> anyhow::Result<BreezometerClient> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!("Breezometer API key must not be empty"));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(&self.base_url, self.timeout, &self.headers)
                    .context("Failed to build HTTP client for Breezometer")?,
            ),
        };

        Ok(BreezometerClient {
            api_key: Arc::from(self.api_key),
            transport,
            retry: self.retry,
            logger: self.logger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{AttemptFailure, Violation},
        logger::{LogLevel, tests::RecordingLogger},
        model::OneOrMany,
        transport::tests::ScriptedTransport,
    };
    use chrono::{DateTime, Datelike, TimeDelta, Timelike};

    fn client_with(transport: Arc<ScriptedTransport>) -> BreezometerClient {
        BreezometerClient::builder("test-key")
            .transport(transport)
            .build()
            .unwrap()
    }

    fn conditions_body() -> Value {
        json!({
            "metadata": null,
            "data": {
                "datetime": "2024-05-01T12:00:00Z",
                "data_available": true,
                "indexes": { "baqi": { "display_name": "BreezoMeter AQI", "aqi": 71 } }
            },
            "error": null
        })
    }

    #[test]
    fn build_rejects_empty_key() {
        let err = BreezometerClient::builder("  ").build().unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn from_config_errors_when_missing_api_key() {
        let err =
            BreezometerClient::from_config_with_key(&Config::default(), None, Arc::new(NoopLogger))
                .unwrap_err();
        assert!(err.to_string().contains("No Breezometer API key configured"));
        assert!(err.to_string().contains(crate::config::API_KEY_ENV));
    }

    #[tokio::test]
    async fn network_failures_keep_the_key_out_of_logs_and_errors() {
        let logger = Arc::new(RecordingLogger::default());
        let client = BreezometerClient::builder("SUPERSECRETKEY")
            .base_url("http://127.0.0.1:1/")
            .timeout(Duration::from_secs(5))
            .max_attempts(1)
            .logger(logger.clone())
            .build()
            .unwrap();

        let err = client
            .current_conditions(&json!({ "lat": 1, "lon": 1 }))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BreezometerError::Exhausted {
                attempts: 1,
                last: AttemptFailure::Transport(_),
                ..
            }
        ));
        assert!(!err.to_string().contains("SUPERSECRETKEY"));
        assert_eq!(logger.count(LogLevel::Error), 1);
        for (_, context, message) in logger.events() {
            assert!(!context.to_string().contains("SUPERSECRETKEY"));
            assert!(!message.contains("SUPERSECRETKEY"));
        }
    }

    #[test]
    fn from_config_applies_retry_settings() {
        let mut cfg = Config::default();
        cfg.set_api_key("KEY".into());
        cfg.retry.max_attempts = Some(4);

        let client = BreezometerClient::from_config(&cfg, Arc::new(NoopLogger)).unwrap();
        assert_eq!(client.retry_policy().max_attempts, 4);
    }

    #[tokio::test]
    async fn current_conditions_sends_normalized_query_with_key() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(
            conditions_body(),
        )]));
        let client = client_with(transport.clone());

        let report = client
            .current_conditions(&json!({
                "lat": "43.067475",
                "lon": -89.392808,
                "lang": "",
                "features": ["breezometer_aqi", "local_aqi"],
                "metadata": true
            }))
            .await
            .unwrap()
            .expect("location is supported");

        assert_eq!(report.data.get("data_available"), Some(&json!(true)));
        let datetime = report.data.datetime.unwrap();
        assert_eq!((datetime.day(), datetime.hour()), (1, 12));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let (path, qs, _) = &calls[0];
        assert_eq!(path, "air-quality/v2/current-conditions");
        assert_eq!(qs.get("lat"), Some("43.067475"));
        assert_eq!(qs.get("features"), Some("breezometer_aqi,local_aqi"));
        assert_eq!(qs.get("metadata"), Some("true"));
        assert_eq!(qs.get("lang"), None);
        assert_eq!(qs.get("key"), Some("test-key"));
    }

    #[tokio::test]
    async fn invalid_coordinates_never_reach_the_network() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client_with(transport.clone());

        for params in [
            json!({ "lat": 91, "lon": 0 }),
            json!({ "lat": 0, "lon": -181 }),
            json!({ "lat": 0, "lon": 0, "key": "override" }),
        ] {
            let err = client.current_conditions(&params).await.unwrap_err();
            assert!(err.is_validation(), "{params}");
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn historical_instant_is_rounded_to_end_of_minute() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(
            conditions_body(),
        )]));
        let client = client_with(transport.clone());
        let at: DateTime<Utc> = "2024-05-01T12:00:00.400Z".parse().unwrap();

        let report = client
            .historical_hourly(&json!({ "lat": 1, "lon": 1, "dateTime": at.to_rfc3339() }))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(report.data, OneOrMany::One(_)));
        let (path, qs, _) = &transport.calls()[0];
        assert_eq!(path, "air-quality/v2/historical/hourly");
        assert_eq!(qs.get("datetime"), Some("2024-05-01T12:00:59"));
    }

    #[tokio::test]
    async fn historical_range_returns_a_list() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(json!({
            "data": [
                { "datetime": "2024-05-01T10:00:00Z", "data_available": true },
                { "datetime": "2024-05-01T11:00:00Z", "data_available": true }
            ]
        }))]));
        let client = client_with(transport.clone());

        let report = client
            .historical_hourly(&json!({
                "lat": 1, "lon": 1,
                "startDate": "2024-05-01T10:00:30Z",
                "endDate": "2024-05-01T11:00:30Z"
            }))
            .await
            .unwrap()
            .unwrap();

        let hours: Vec<_> = report
            .data
            .into_vec()
            .into_iter()
            .map(|s| s.datetime.map(|d| d.hour()))
            .collect();
        assert_eq!(hours, vec![Some(10), Some(11)]);
        let (_, qs, _) = &transport.calls()[0];
        assert_eq!(qs.get("start_datetime"), Some("2024-05-01T10:00:00"));
        assert_eq!(qs.get("end_datetime"), Some("2024-05-01T11:00:59"));
    }

    #[tokio::test]
    async fn forecast_parses_every_entry_datetime() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(json!({
            "data": [
                { "datetime": "2099-01-01T00:00:00Z", "data_available": true },
                { "datetime": "2099-01-01T01:00:00Z", "data_available": false }
            ]
        }))]));
        let client = client_with(transport.clone());

        let report = client
            .forecast_hourly(&json!({ "lat": 1, "lon": 1, "hours": 2 }))
            .await
            .unwrap()
            .unwrap();

        let hours: Vec<_> = report
            .data
            .iter()
            .map(|s| s.datetime.map(|d| d.hour()))
            .collect();
        assert_eq!(hours, vec![Some(0), Some(1)]);
        assert_eq!(transport.calls()[0].1.get("hours"), Some("2"));
    }

    #[tokio::test]
    async fn forecast_rejects_past_instant() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client_with(transport.clone());
        let yesterday = Utc::now() - TimeDelta::days(1);

        let err = client
            .forecast_hourly(&json!({ "lat": 1, "lon": 1, "datetime": yesterday.to_rfc3339() }))
            .await
            .unwrap_err();

        let BreezometerError::Validation(validation) = err else {
            panic!("expected a validation error");
        };
        assert!(matches!(
            validation.violation_for("datetime"),
            Some(Violation::TooEarly { .. })
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn pollen_unsupported_location_is_none() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(json!({
            "data": null,
            "error": { "code": "location_unsupported", "title": "Location Unsupported" }
        }))]));
        let logger = Arc::new(RecordingLogger::default());
        let client = BreezometerClient::builder("k")
            .transport(transport.clone())
            .logger(logger.clone())
            .build()
            .unwrap();

        let result = client
            .daily_pollen_forecast(&json!({ "lat": 1, "lon": 1, "days": 3 }))
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.calls()[0].0, "pollen/v2/forecast/daily");
        assert_eq!(logger.count(LogLevel::Info), 1);
    }

    #[tokio::test]
    async fn fire_conditions_pass_units_and_radius() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(json!({
            "data": { "fires": [] }
        }))]));
        let client = client_with(transport.clone());

        let report = client
            .current_fire_conditions(&json!({
                "lat": 1, "lon": 1, "units": "imperial", "radius": 40
            }))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.data.get("fires"), Some(&json!([])));
        let (path, qs, _) = &transport.calls()[0];
        assert_eq!(path, "fires/v1/current-conditions");
        assert_eq!(qs.get("units"), Some("imperial"));
        assert_eq!(qs.get("radius"), Some("40"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_last_status() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::status(503),
            ScriptedTransport::status(503),
            ScriptedTransport::status(504),
        ]));
        let client = BreezometerClient::builder("k")
            .transport(transport.clone())
            .max_attempts(3)
            .build()
            .unwrap();

        let err = client
            .current_conditions(&json!({ "lat": 1, "lon": 1 }))
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), 3);
        assert!(matches!(
            err,
            BreezometerError::Exhausted {
                attempts: 3,
                last: AttemptFailure::Status { status: 504, .. },
                ..
            }
        ));
    }
}
