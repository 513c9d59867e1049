//! Bounded retry with exponential backoff, and response classification.

use std::time::Duration;

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
    endpoint::Endpoint,
    error::{AttemptFailure, BreezometerError},
    logger::Logger,
    model::{ApiErrorBody, ErrorCode, Report},
    normalize::QueryParams,
    transport::{HttpReply, Transport, truncate_body},
    validate::ACCESS_KEY_FIELD,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Pause before attempt `attempt` (zero-based): `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// What a single reply means for the retry loop.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Success(Report<T>),
    Unsupported(ApiErrorBody),
    Application(ApiErrorBody),
    Transient(AttemptFailure),
}

pub(crate) fn classify<T: DeserializeOwned>(endpoint: Endpoint, reply: &HttpReply) -> Outcome<T> {
    if reply.status != 200 {
        return Outcome::Transient(AttemptFailure::Status {
            status: reply.status,
            body: truncate_body(&reply.body),
        });
    }

    let body: Value = match serde_json::from_str(&reply.body) {
        Ok(body) => body,
        Err(e) => return Outcome::Transient(AttemptFailure::Decode(e)),
    };

    if let Some(raw) = body.get("error").filter(|e| !e.is_null()) {
        let error = ApiErrorBody::deserialize(raw).unwrap_or_else(|_| ApiErrorBody {
            code: ErrorCode::Text("unrecognized".into()),
            title: None,
            detail: Some(raw.to_string()),
        });
        return if endpoint.schema().is_unsupported(&error.code) {
            Outcome::Unsupported(error)
        } else {
            Outcome::Application(error)
        };
    }

    match serde_json::from_value::<Report<T>>(body) {
        Ok(report) => Outcome::Success(report),
        Err(e) => Outcome::Transient(AttemptFailure::Decode(e)),
    }
}

/// Run `query` against `endpoint` until it succeeds, hits a terminal
/// classification or the policy runs out of attempts.
pub(crate) async fn execute<T: DeserializeOwned>(
    transport: &dyn Transport,
    endpoint: Endpoint,
    query: &QueryParams,
    policy: &RetryPolicy,
    logger: &dyn Logger,
) -> Result<Option<Report<T>>, BreezometerError> {
    let attempts = policy.attempts();
    let qs = redacted(query);

    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            logger.warn(
                &json!({ "attempt": attempt + 1, "maxAttempts": attempts, "delayMs": delay.as_millis() as u64 }),
                &format!("Retrying Breezometer {endpoint}"),
            );
            tokio::time::sleep(delay).await;
        }

        let failure = match transport.get(endpoint.path(), query).await {
            Ok(reply) => {
                match classify::<T>(endpoint, &reply) {
                    Outcome::Success(report) => return Ok(Some(report)),
                    Outcome::Unsupported(error) => {
                        logger.info(
                            &json!({ "error": error, "qs": qs }),
                            "Location not supported by Breezometer",
                        );
                        return Ok(None);
                    }
                    Outcome::Application(error) => {
                        logger.error(
                            &json!({ "body": reply.body, "qs": qs }),
                            "Application level error returned from Breezometer",
                        );
                        return Err(BreezometerError::Application { endpoint, error });
                    }
                    Outcome::Transient(failure) => {
                        let message = match &failure {
                            AttemptFailure::Status { .. } => {
                                format!("Did not receive a 200 status code from Breezometer {endpoint}")
                            }
                            _ => format!("Could not decode response from Breezometer {endpoint}"),
                        };
                        logger.error(
                            &json!({ "statusCode": reply.status, "body": truncate_body(&reply.body), "qs": qs }),
                            &message,
                        );
                        failure
                    }
                }
            }
            Err(e) => {
                logger.error(
                    &json!({ "error": e.to_string(), "attempt": attempt + 1, "qs": qs }),
                    &format!("Error calling Breezometer {endpoint}"),
                );
                AttemptFailure::Transport(e)
            }
        };

        attempt += 1;
        if attempt == attempts {
            return Err(BreezometerError::Exhausted {
                endpoint,
                attempts,
                last: failure,
            });
        }
    }
}

/// Query parameters as a JSON object for log context, without the access key.
fn redacted(query: &QueryParams) -> Value {
    let map = query
        .pairs()
        .iter()
        .filter(|(k, _)| k != ACCESS_KEY_FIELD)
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}
